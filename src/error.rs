//! Error handling for scriptpack.
//! Defines the error taxonomy shared by every pipeline stage.

use std::io;
use thiserror::Error;

/// Errors raised while assembling, checking or publishing script bundles.
///
/// Every stage maps its failures onto one variant so the pipeline can report
/// which stage and flavor went wrong.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// Represents errors that occur during configuration parsing or processing
    #[error("Configuration error: {0}.")]
    ConfigError(String),

    /// Represents an invalid include or exclude glob
    #[error("Pattern error: {0}.")]
    PatternError(#[from] globset::Error),

    /// Represents errors that occur while rendering a MiniJinja template
    #[error("Template rendering error: {0}.")]
    MinijinjaError(#[from] minijinja::Error),

    /// The template source tree is missing
    #[error("Template resolution error: source root '{root}' does not exist.")]
    ResolutionError { root: String },

    /// The parser generator could not be installed or failed on a template
    #[error("Generation error: {0}.")]
    GenerationError(String),

    /// A staging tree could not be composed
    #[error("Composition error for {flavor}: {reason}.")]
    CompositionError { flavor: String, reason: String },

    /// An archive could not be written
    #[error("Archive error for '{archive}': {reason}.")]
    ArchiveError { archive: String, reason: String },

    /// The static analyzer could not be run or produced unreadable output
    #[error("Lint error for {flavor}: {reason}.")]
    LintError { flavor: String, reason: String },

    /// The static analyzer reported findings
    #[error("Lint failure for {flavor}: {count} finding(s), see {report}.")]
    LintFailure { flavor: String, count: usize, report: String },

    /// Uploading the release failed
    #[error("Publish error: {0}.")]
    PublishError(String),

    /// The stage graph is malformed
    #[error("Pipeline error: {0}.")]
    PipelineError(String),

    /// One or more stages did not succeed
    #[error("{} stage(s) failed: {}.", failed.len(), failed.join(", "))]
    StageFailures { failed: Vec<String> },
}

/// Convenience type alias for Results with [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Behavior
/// Prints the error message to stderr and exits with status code 1
pub fn default_error_handler(err: Error) {
    eprintln!("{err}");
    std::process::exit(1);
}
