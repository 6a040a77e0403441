//! scriptpack assembles distributable Bash script bundles.
//! It generates argument parsers from templates, composes per-flavor staging
//! trees, packages them, lints them and publishes the archives as a release.

/// Packaging of staging trees into zip archives
pub mod archiver;

/// Release notes from the local git history
pub mod changelog;

/// Command-line interface module
pub mod cli;

/// Staging tree composition with placeholder substitution
pub mod composer;

/// Configuration handling (scriptpack.yml, scriptpack.yaml, scriptpack.json)
pub mod config;

pub mod constants;

/// Error types and handling
pub mod error;

pub mod flavor;

/// Parser generator installation and invocation
pub mod generator;

pub mod layout;

/// Static analysis of staged scripts
pub mod linter;

pub mod logger;

/// Stage graph and pipeline execution
pub mod pipeline;

/// Include/exclude globs and directory walks
pub mod patterns;

pub mod placeholder;

/// User input and interaction handling
pub mod prompt;

/// Release creation and asset upload
pub mod publisher;

/// Template rendering for configuration values and reports
pub mod renderer;

/// Entry and supporting template resolution
pub mod resolver;
