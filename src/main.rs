//! scriptpack's application entry point.
//! Parses arguments, loads the configuration and runs the requested goal.

use scriptpack::{
    cli::{get_args, Args, Command},
    config::{find_config, load_config},
    constants::CONFIG_FILES,
    error::{default_error_handler, Result},
    logger::init_logger,
    pipeline::{clean, Goal, Pipeline, PublishOptions, StageGraph, StageStatus},
};

/// Main application entry point.
fn main() {
    let args = get_args();
    init_logger(args.verbose);

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

/// Main application logic execution.
///
/// # Flow
/// 1. Locates and loads the configuration
/// 2. Expands the command into its stage graph
/// 3. Runs the stages and prints a summary
/// 4. Fails if any stage failed
fn run(args: Args) -> Result<()> {
    let config_path = find_config(".", args.config.as_deref(), &CONFIG_FILES)?;
    let config = load_config(&config_path)?;

    let goal = match &args.command {
        Command::Clean => return clean(&config),
        Command::Tasks => {
            let flavors = config.selected_flavors(&args.flavors)?;
            for stage in StageGraph::for_goal(Goal::Publish, &flavors).order()? {
                println!("{:<18} {}", stage.to_string(), stage.description());
            }
            return Ok(());
        }
        command => command.goal().unwrap_or(Goal::Build),
    };

    let publish_options = match &args.command {
        Command::Publish { token, yes } => {
            PublishOptions { token: token.clone(), assume_yes: *yes }
        }
        _ => PublishOptions::default(),
    };

    let mut pipeline = Pipeline::new(&config)?.with_publish_options(publish_options);
    let report = pipeline.run(goal, &args.flavors)?;

    for (stage, status) in &report.outcomes {
        match status {
            StageStatus::Succeeded => println!("{stage}: ok"),
            StageStatus::Failed(reason) => println!("{stage}: FAILED ({reason})"),
            StageStatus::Skipped(cause) => println!("{stage}: skipped (needs {cause})"),
        }
    }
    report.into_result().map(|_| ())
}
