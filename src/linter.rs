//! Static analysis of staged shell scripts and report rendering.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::flavor::Flavor;
use crate::patterns::{to_slash, walk_files, FileFilter};
use crate::renderer::{MiniJinjaRenderer, TemplateRenderer};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const TEXT_REPORT: &str = r#"{% for d in diagnostics -%}
{{ d.file }}:{{ d.line }}:{{ d.column }}: {{ d.level }}: {{ d.message }} [SC{{ d.code }}]
{% endfor -%}
{{ files | length }} file(s) checked, {{ diagnostics | length }} finding(s).
"#;

const XML_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<checkstyle version="4.3">
{%- for file in files %}
  <file name="{{ file.name | e }}">
  {%- for d in file.diagnostics %}
    <error line="{{ d.line }}" column="{{ d.column }}" severity="{{ d.severity }}" message="{{ d.message | e }}" source="ShellCheck.SC{{ d.code }}"/>
  {%- endfor %}
  </file>
{%- endfor %}
</checkstyle>
"#;

const HTML_REPORT: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>ShellCheck report: {{ flavor }}</title>
<style>
body { font-family: sans-serif; }
table { border-collapse: collapse; }
td, th { border: 1px solid #ccc; padding: 4px 8px; text-align: left; }
.error { color: #b00020; } .warning { color: #b36b00; }
</style>
</head>
<body>
<h1>ShellCheck report: {{ flavor }}</h1>
<p>{{ files | length }} file(s) checked, {{ diagnostics | length }} finding(s).</p>
{%- if diagnostics %}
<table>
<tr><th>File</th><th>Line</th><th>Column</th><th>Level</th><th>Code</th><th>Message</th></tr>
{%- for d in diagnostics %}
<tr class="{{ d.level | e }}"><td>{{ d.file | e }}</td><td>{{ d.line }}</td><td>{{ d.column }}</td><td>{{ d.level | e }}</td><td><a href="https://www.shellcheck.net/wiki/SC{{ d.code }}">SC{{ d.code }}</a></td><td>{{ d.message | e }}</td></tr>
{%- endfor %}
</table>
{%- endif %}
</body>
</html>
"#;

/// One finding reported by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub level: String,
    pub code: u32,
    pub message: String,
}

impl Diagnostic {
    /// Checkstyle severity for this finding.
    pub fn severity(&self) -> &str {
        match self.level.as_str() {
            "error" => "error",
            "warning" => "warning",
            _ => "info",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Json1Output {
    comments: Vec<Diagnostic>,
}

/// Result of linting one flavor's staging tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub flavor: Flavor,
    pub files: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub reports: Vec<PathBuf>,
}

impl LintReport {
    pub fn passed(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn count(&self) -> usize {
        self.diagnostics.len()
    }
}

/// The external analyzer and the files it is pointed at.
#[derive(Debug, Clone)]
pub struct Linter {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub severity: Option<String>,
    pub filter: FileFilter,
    pub data_dir: String,
}

impl Linter {
    pub fn from_config(config: &Config) -> Result<Self> {
        let lint = &config.lint;
        // Bare program names are looked up on PATH.
        let program = if lint.program.components().count() > 1 {
            config.resolve(&lint.program)
        } else {
            lint.program.clone()
        };
        Ok(Self {
            program,
            args: lint.args.clone(),
            severity: lint.severity.clone(),
            filter: FileFilter::new(&lint.include, &lint.exclude)?,
            data_dir: config.project.data_dir.clone(),
        })
    }

    /// Shell scripts of `staging_dir` the analyzer will check, relative and sorted.
    pub fn sources(&self, staging_dir: &Path) -> Result<Vec<String>> {
        Ok(walk_files(staging_dir, &self.filter, &self.data_dir)?
            .iter()
            .map(|path| to_slash(path))
            .collect())
    }

    fn analyze(&self, flavor: Flavor, staging_dir: &Path, files: &[String]) -> Result<Vec<Diagnostic>> {
        let lint_error = |reason: String| Error::LintError { flavor: flavor.to_string(), reason };

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(severity) = &self.severity {
            command.arg(format!("--severity={severity}"));
        }
        command.args(["-f", "json1"]).args(files).current_dir(staging_dir);
        debug!("Running {command:?}");

        let output = command
            .output()
            .map_err(|e| lint_error(format!("cannot run '{}': {e}", self.program.display())))?;
        match output.status.code() {
            Some(0) | Some(1) => {}
            _ => {
                return Err(lint_error(format!(
                    "'{}' failed with {}: {}",
                    self.program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )))
            }
        }
        let parsed: Json1Output = serde_json::from_slice(&output.stdout)
            .map_err(|e| lint_error(format!("unreadable analyzer output: {e}")))?;
        if output.status.code() == Some(1) && parsed.comments.is_empty() {
            warn!("Analyzer exited with findings but reported none for {flavor}");
        }
        Ok(parsed.comments)
    }

    /// Lints `staging_dir` and writes the text, XML and HTML reports into `reports_dir`.
    ///
    /// # Errors
    /// * `Error::LintError` if the analyzer cannot run or its output is unreadable.
    ///   Findings are not an error; see [`LintReport::passed`].
    pub fn run(&self, flavor: Flavor, staging_dir: &Path, reports_dir: &Path) -> Result<LintReport> {
        if !staging_dir.is_dir() {
            return Err(Error::LintError {
                flavor: flavor.to_string(),
                reason: format!("staging directory '{}' does not exist", staging_dir.display()),
            });
        }
        let files = self.sources(staging_dir)?;
        let diagnostics = if files.is_empty() {
            info!("No shell scripts to check for {flavor}");
            Vec::new()
        } else {
            self.analyze(flavor, staging_dir, &files)?
        };

        let mut report = LintReport { flavor, files, diagnostics, reports: Vec::new() };
        report.reports = write_reports(&report, reports_dir)?;
        info!(
            "Checked {} file(s) for {flavor}: {} finding(s)",
            report.files.len(),
            report.count()
        );
        Ok(report)
    }
}

fn report_context(report: &LintReport) -> serde_json::Value {
    let files: Vec<serde_json::Value> = report
        .files
        .iter()
        .map(|name| {
            let diagnostics: Vec<serde_json::Value> = report
                .diagnostics
                .iter()
                .filter(|d| &d.file == name)
                .map(|d| {
                    serde_json::json!({
                        "line": d.line,
                        "column": d.column,
                        "severity": d.severity(),
                        "message": d.message,
                        "code": d.code,
                    })
                })
                .collect();
            serde_json::json!({ "name": name, "diagnostics": diagnostics })
        })
        .collect();
    serde_json::json!({
        "flavor": report.flavor,
        "files": files,
        "diagnostics": report.diagnostics,
    })
}

/// Renders the three report formats of `report` into `reports_dir`.
pub fn write_reports(report: &LintReport, reports_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(reports_dir)?;
    let renderer = MiniJinjaRenderer::new();
    let context = report_context(report);
    [("txt", TEXT_REPORT), ("xml", XML_REPORT), ("html", HTML_REPORT)]
        .into_iter()
        .map(|(extension, template)| {
            let path = reports_dir.join(format!("{}.{extension}", crate::constants::REPORT_BASENAME));
            fs::write(&path, renderer.render(template, &context)?)?;
            Ok(path)
        })
        .collect()
}
