//! Command-line interface implementation for scriptpack.
//! Provides argument parsing and help text formatting using clap.

use crate::flavor::Flavor;
use crate::pipeline::Goal;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments structure for scriptpack.
#[derive(Parser, Debug)]
#[command(author, version, about = "scriptpack: assembles, lints and publishes Bash script bundles", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file (default: scriptpack.yml in the current directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Restrict the run to the given flavor; may be repeated
    #[arg(short, long = "flavor", global = true, value_enum, value_name = "FLAVOR")]
    pub flavors: Vec<Flavor>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate the command line argument parsers
    Generate,
    /// Copy source and generated scripts into the staging directories
    Compose,
    /// Package the staged scripts in zip archives
    Assemble,
    /// Run the static analyzer on the staged scripts
    Check,
    /// Assemble and check
    Build,
    /// Build and publish the archives as a release
    Publish {
        /// Access token, takes precedence over the configuration and environment
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,

        /// Publish without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// List the stages in execution order
    Tasks,
    /// Remove the build directory
    Clean,
}

impl Command {
    /// The pipeline goal behind this command, if it runs stages.
    pub fn goal(&self) -> Option<Goal> {
        match self {
            Command::Generate => Some(Goal::Generate),
            Command::Compose => Some(Goal::Compose),
            Command::Assemble => Some(Goal::Assemble),
            Command::Check => Some(Goal::Check),
            Command::Build => Some(Goal::Build),
            Command::Publish { .. } => Some(Goal::Publish),
            Command::Tasks | Command::Clean => None,
        }
    }
}

/// Parses command line arguments and returns the Args structure.
///
/// # Exits
/// * With status code 1 if no command is given
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if matches!(
                e.kind(),
                ErrorKind::MissingSubcommand
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
