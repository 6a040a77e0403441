//! Stage graph and its execution.
//!
//! Every goal expands into a set of stages with declared predecessors. The
//! graph is sorted topologically and executed in that order; a stage whose
//! predecessor did not succeed is skipped, other flavors keep going.

use crate::archiver::create_archive;
use crate::changelog::changelog_for;
use crate::composer::{compose, ComposePlan};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flavor::Flavor;
use crate::generator::{generate_parsers, install_generator, Argbash, CodeGenerator};
use crate::layout::BuildLayout;
use crate::linter::{LintReport, Linter};
use crate::placeholder::PlaceholderMap;
use crate::prompt::{DialoguerPrompter, Prompter};
use crate::publisher::{new_release, publish, GithubHost, Release, ReleaseHost};
use crate::renderer::MiniJinjaRenderer;
use crate::resolver::{resolve_templates, TemplateQuery};
use log::{debug, error, info, warn};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// A unit of work in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    UnpackGenerator,
    Generate(Flavor),
    Compose(Flavor),
    Archive(Flavor),
    Lint(Flavor),
    Publish,
}

impl Stage {
    pub fn description(&self) -> String {
        match self {
            Stage::UnpackGenerator => "Unpacks the parser generator.".to_string(),
            Stage::Generate(flavor) => {
                format!("Generates the {flavor} command line argument parsers.")
            }
            Stage::Compose(flavor) => {
                format!("Copies the {flavor} source and generated scripts to the staging directory.")
            }
            Stage::Archive(flavor) => format!("Packages the {flavor} scripts in a zip archive."),
            Stage::Lint(flavor) => format!("Performs quality checks on the {flavor} scripts."),
            Stage::Publish => "Publishes the archives as a prerelease.".to_string(),
        }
    }

    /// Stages that must succeed before this one runs.
    pub fn predecessors(&self, flavors: &[Flavor]) -> Vec<Stage> {
        match *self {
            Stage::UnpackGenerator => vec![],
            Stage::Generate(_) => vec![Stage::UnpackGenerator],
            Stage::Compose(flavor) => vec![Stage::Generate(flavor)],
            Stage::Archive(flavor) | Stage::Lint(flavor) => vec![Stage::Compose(flavor)],
            Stage::Publish => flavors
                .iter()
                .flat_map(|flavor| [Stage::Archive(*flavor), Stage::Lint(*flavor)])
                .collect(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::UnpackGenerator => write!(f, "unpack-generator"),
            Stage::Generate(flavor) => write!(f, "generate:{flavor}"),
            Stage::Compose(flavor) => write!(f, "compose:{flavor}"),
            Stage::Archive(flavor) => write!(f, "archive:{flavor}"),
            Stage::Lint(flavor) => write!(f, "lint:{flavor}"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Generate,
    Compose,
    Assemble,
    Check,
    Build,
    Publish,
}

impl Goal {
    /// Terminal stages of the goal; predecessors are added by the graph.
    pub fn targets(&self, flavors: &[Flavor]) -> Vec<Stage> {
        let each = |stage: fn(Flavor) -> Stage| -> Vec<Stage> {
            flavors.iter().map(|f| stage(*f)).collect()
        };
        match self {
            Goal::Generate => each(Stage::Generate),
            Goal::Compose => each(Stage::Compose),
            Goal::Assemble => each(Stage::Archive),
            Goal::Check => each(Stage::Lint),
            Goal::Build => flavors
                .iter()
                .flat_map(|f| [Stage::Archive(*f), Stage::Lint(*f)])
                .collect(),
            Goal::Publish => vec![Stage::Publish],
        }
    }
}

/// Directed acyclic graph of stages; edges point from predecessor to successor.
#[derive(Debug, Default)]
pub struct StageGraph {
    graph: DiGraph<Stage, ()>,
    nodes: HashMap<Stage, NodeIndex>,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, stage: Stage) -> NodeIndex {
        if let Some(index) = self.nodes.get(&stage) {
            return *index;
        }
        let index = self.graph.add_node(stage);
        self.nodes.insert(stage, index);
        index
    }

    /// Declares `stage` and the edges from each of its `predecessors`.
    pub fn add_stage(&mut self, stage: Stage, predecessors: &[Stage]) {
        let successor = self.node(stage);
        for predecessor in predecessors {
            let predecessor = self.node(*predecessor);
            self.graph.update_edge(predecessor, successor, ());
        }
    }

    /// Builds the graph holding `goal`'s targets and everything they depend on.
    pub fn for_goal(goal: Goal, flavors: &[Flavor]) -> Self {
        let mut graph = Self::new();
        let mut expanded = HashSet::new();
        let mut pending = goal.targets(flavors);
        pending.reverse();
        while let Some(stage) = pending.pop() {
            if !expanded.insert(stage) {
                continue;
            }
            let predecessors = stage.predecessors(flavors);
            graph.add_stage(stage, &predecessors);
            pending.extend(predecessors.into_iter().rev());
        }
        graph
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.nodes.contains_key(&stage)
    }

    pub fn predecessors(&self, stage: Stage) -> Vec<Stage> {
        let Some(index) = self.nodes.get(&stage) else {
            return Vec::new();
        };
        let mut stages: Vec<Stage> = self
            .graph
            .neighbors_directed(*index, Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        stages.sort();
        stages
    }

    /// Stages in execution order.
    ///
    /// # Errors
    /// * `Error::PipelineError` if the graph has a cycle
    pub fn order(&self) -> Result<Vec<Stage>> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|index| self.graph[index]).collect())
            .map_err(|cycle| {
                Error::PipelineError(format!("cycle through stage '{}'", self.graph[cycle.node_id()]))
            })
    }
}

/// Final state of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed(String),
    /// Not run because the named predecessor did not succeed.
    Skipped(Stage),
}

/// Everything one pipeline run produced.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<(Stage, StageStatus)>,
    pub archives: Vec<PathBuf>,
    pub lint_reports: Vec<LintReport>,
    pub release: Option<Release>,
}

impl PipelineReport {
    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.outcomes.iter().find(|(s, _)| *s == stage).map(|(_, status)| status)
    }

    /// Stages that failed or were skipped.
    pub fn unsuccessful(&self) -> Vec<Stage> {
        self.outcomes
            .iter()
            .filter(|(_, status)| *status != StageStatus::Succeeded)
            .map(|(stage, _)| *stage)
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.unsuccessful().is_empty()
    }

    /// Converts a run with failed stages into `Error::StageFailures`.
    pub fn into_result(self) -> Result<Self> {
        let failed: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|(stage, status)| match status {
                StageStatus::Failed(_) => Some(stage.to_string()),
                _ => None,
            })
            .collect();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(Error::StageFailures { failed })
        }
    }
}

/// Options that only matter when publishing.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Takes precedence over the configured and environment tokens.
    pub token: Option<String>,
    pub assume_yes: bool,
}

/// Runs stages against one immutable configuration.
pub struct Pipeline<'a> {
    config: &'a Config,
    layout: BuildLayout,
    version: String,
    renderer: MiniJinjaRenderer,
    generator: Option<Box<dyn CodeGenerator>>,
    release_host: Option<Box<dyn ReleaseHost>>,
    prompter: Box<dyn Prompter>,
    publish_options: PublishOptions,
}

impl<'a> Pipeline<'a> {
    /// # Errors
    /// * `Error::ConfigError` if the version file cannot be read
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            layout: BuildLayout::new(config.build_dir()),
            version: config.read_version()?,
            renderer: MiniJinjaRenderer::new(),
            generator: None,
            release_host: None,
            prompter: Box::new(DialoguerPrompter),
            publish_options: PublishOptions::default(),
        })
    }

    /// Uses `generator` instead of installing the configured one.
    pub fn with_generator(mut self, generator: Box<dyn CodeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Publishes to `host` instead of the configured GitHub endpoint.
    pub fn with_release_host(mut self, host: Box<dyn ReleaseHost>) -> Self {
        self.release_host = Some(host);
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_publish_options(mut self, options: PublishOptions) -> Self {
        self.publish_options = options;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Runs every stage `goal` needs for `flavors` (all configured flavors when empty).
    pub fn run(&mut self, goal: Goal, flavors: &[Flavor]) -> Result<PipelineReport> {
        let flavors = self.config.selected_flavors(flavors)?;
        let graph = StageGraph::for_goal(goal, &flavors);
        let order = graph.order()?;
        info!("Running {} stage(s) for version {}", order.len(), self.version);

        let mut report = PipelineReport::default();
        for stage in order {
            let blocked = graph
                .predecessors(stage)
                .into_iter()
                .find(|p| report.status(*p) != Some(&StageStatus::Succeeded));
            if let Some(predecessor) = blocked {
                warn!("Skipping {stage}: {predecessor} did not succeed");
                self.discard_outputs(stage);
                report.outcomes.push((stage, StageStatus::Skipped(predecessor)));
                continue;
            }

            info!("> {stage}");
            let status = match self.execute(stage, &mut report) {
                Ok(()) => StageStatus::Succeeded,
                Err(e) => {
                    error!("{stage} failed: {e}");
                    self.discard_outputs(stage);
                    StageStatus::Failed(e.to_string())
                }
            };
            report.outcomes.push((stage, status));
        }
        Ok(report)
    }

    /// Removes outputs of earlier runs once a flavor's generate or compose
    /// stage failed or was skipped, so no stale tree outlives this run.
    fn discard_outputs(&self, stage: Stage) {
        let stale = match stage {
            Stage::Generate(flavor) => {
                vec![self.layout.generated_dir(flavor), self.layout.staging_dir(flavor)]
            }
            Stage::Compose(flavor) => vec![self.layout.staging_dir(flavor)],
            _ => return,
        };
        for dir in stale.into_iter().filter(|dir| dir.exists()) {
            debug!("Removing stale '{}'", dir.display());
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!("Cannot remove '{}': {e}", dir.display());
            }
        }
    }

    fn execute(&mut self, stage: Stage, report: &mut PipelineReport) -> Result<()> {
        match stage {
            Stage::UnpackGenerator => self.unpack_generator(),
            Stage::Generate(flavor) => self.generate(flavor),
            Stage::Compose(flavor) => self.compose(flavor),
            Stage::Archive(flavor) => {
                let archive = self.archive(flavor)?;
                report.archives.push(archive);
                Ok(())
            }
            Stage::Lint(flavor) => {
                let lint_report = self.lint(flavor)?;
                let result = if lint_report.passed() {
                    Ok(())
                } else {
                    Err(Error::LintFailure {
                        flavor: flavor.to_string(),
                        count: lint_report.count(),
                        report: self.layout.report_path(flavor, "html").display().to_string(),
                    })
                };
                report.lint_reports.push(lint_report);
                result
            }
            Stage::Publish => {
                let release = self.publish(&report.archives)?;
                report.release = Some(release);
                Ok(())
            }
        }
    }

    fn unpack_generator(&mut self) -> Result<()> {
        if self.generator.is_some() {
            info!("Using the provided parser generator");
            return Ok(());
        }
        let installation = install_generator(
            &self.config.generator,
            &self.layout,
            &self.renderer,
            &self.config.base_dir,
        )?;
        self.generator = Some(Box::new(Argbash::from(&installation)));
        Ok(())
    }

    fn generate(&self, flavor: Flavor) -> Result<()> {
        let generator = self.generator.as_deref().ok_or_else(|| {
            Error::GenerationError(format!("no parser generator available for {flavor}"))
        })?;
        let query = TemplateQuery::for_flavor(self.config, flavor)?;
        let set = resolve_templates(&self.config.source_root(), &query)?;
        let generated = generate_parsers(generator, &set, &self.layout.generated_dir(flavor))?;
        info!(
            "Generated {} parser(s) for {flavor} from {} supporting template(s)",
            generated.len(),
            set.supporting.len()
        );
        Ok(())
    }

    fn compose(&self, flavor: Flavor) -> Result<()> {
        let placeholders = PlaceholderMap::from_rules(
            &self.config.placeholders,
            &self.renderer,
            &self.version,
            flavor,
        )?;
        let plan =
            ComposePlan::for_flavor(self.config, &self.layout, flavor, &self.version, placeholders)?;
        let staging = compose(&plan)?;
        println!("Composed: '{}'", staging.display());
        Ok(())
    }

    fn archive(&self, flavor: Flavor) -> Result<PathBuf> {
        let archive_name = &self.config.flavor(flavor)?.archive_name;
        let archive = create_archive(
            &self.layout.staging_dir(flavor),
            archive_name,
            &self.layout.archive_path(archive_name),
            &self.config.project.data_dir,
        )?;
        println!("Packaged: '{}'", archive.display());
        Ok(archive)
    }

    fn lint(&self, flavor: Flavor) -> Result<LintReport> {
        let linter = Linter::from_config(self.config)?;
        linter.run(flavor, &self.layout.staging_dir(flavor), &self.layout.reports_dir(flavor))
    }

    fn publish(&self, archives: &[PathBuf]) -> Result<Release> {
        let release_config = self.config.release.as_ref().ok_or_else(|| {
            Error::ConfigError("publishing requires a 'release' section".to_string())
        })?;
        let token = self
            .publish_options
            .token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| release_config.resolve_token());

        let github;
        let host: &dyn ReleaseHost = match &self.release_host {
            Some(host) => host.as_ref(),
            None => {
                let token = token.ok_or_else(|| {
                    Error::PublishError(format!(
                        "no access token configured (use --token, set release.token or {})",
                        release_config.token_env
                    ))
                })?;
                github = GithubHost::new(release_config, token)?;
                &github
            }
        };

        let changelog = changelog_for(&self.config.base_dir, &release_config.tag);
        let request = new_release(release_config, &self.renderer, &self.version, &changelog)?;

        let confirmed = self.prompter.confirm(
            self.publish_options.assume_yes,
            format!(
                "Publish {} archive(s) to {}/{} as '{}'?",
                archives.len(),
                release_config.owner,
                release_config.repo,
                request.tag_name
            ),
        )?;
        if !confirmed {
            return Err(Error::PublishError("publishing cancelled".to_string()));
        }

        let release = publish(host, &request, release_config.overwrite, archives)?;
        println!("Published: '{}'", release.html_url);
        Ok(release)
    }
}

/// Removes the build directory.
pub fn clean(config: &Config) -> Result<()> {
    let build_dir = config.build_dir();
    if build_dir.exists() {
        fs::remove_dir_all(&build_dir)?;
        println!("Removed: '{}'", build_dir.display());
    }
    Ok(())
}
