//! CLI output formatting for pipeline runs.
//!
//! Output is **stage-centric**: the primary line for every entry is the
//! stage name, with counts and paths as indented context. Groups carry their
//! 1-based position in the plan so a run reads the same as `plan` output.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! ==> production build (10 groups)
//!  1 clean, lint:js
//!     clean: removed 2 paths
//!     lint:js: 3 files clean
//!  2 compile:less, compile:sass
//!     compile:less: 0 stylesheets compiled
//!     compile:sass: 1 stylesheets compiled
//! ...
//! ==> Done: 24 stages in 0.84s
//! ```
//!
//! ## Plan
//!
//! ```text
//!  1 clean → dist
//!    lint:js → .
//!  2 compile:less → src/css
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::pipeline::{ALIASES, Pipeline, PipelineEvent, RunReport};
use crate::watch::Changes;
use std::path::Path;
use std::time::Duration;

/// Changed paths listed before the rest are summarized.
const MAX_LISTED_CHANGES: usize = 5;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based group position, right-aligned to two columns.
fn format_index(pos: usize) -> String {
    format!("{:>2}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

/// Path relative to `root` when it lives underneath, otherwise as given.
fn display_path(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
        Ok(relative) => relative.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

// ============================================================================
// Run progress
// ============================================================================

/// Format a single pipeline event as display lines.
pub fn format_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::Started { mode, groups } => {
            vec![format!("==> {} build ({} groups)", mode, groups)]
        }
        PipelineEvent::GroupStarted { index, stages } => {
            vec![format!("{} {}", format_index(index + 1), stages.join(", "))]
        }
        PipelineEvent::StageFinished(report) => {
            vec![format!("{}{}: {}", indent(1), report.stage, report.summary)]
        }
        PipelineEvent::Completed { stages, elapsed } => {
            vec![format!(
                "==> Done: {} stages in {}",
                stages,
                format_elapsed(*elapsed)
            )]
        }
        PipelineEvent::Aborted { stage, message } => {
            let mut lines = vec![format!("==> Aborted at {}", stage)];
            lines.extend(message.lines().map(|line| format!("{}{}", indent(1), line)));
            lines
        }
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// Per-stage table of a finished run, widest stage name first column.
pub fn format_run_report(report: &RunReport) -> Vec<String> {
    let width = report
        .stages
        .iter()
        .map(|s| s.stage.len())
        .max()
        .unwrap_or(0);
    let mut lines = vec![format!(
        "{} build: {} stages in {}",
        report.mode,
        report.stages.len(),
        format_elapsed(report.elapsed)
    )];
    for stage in &report.stages {
        lines.push(format!(
            "{}{:<width$}  {:>4}  {}",
            indent(1),
            stage.stage,
            stage.files,
            stage.summary
        ));
    }
    lines
}

pub fn print_run_report(report: &RunReport) {
    for line in format_run_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Groups of a pipeline with each stage's output location.
///
/// Outputs under `root` are shown relative to it.
pub fn format_plan(pipeline: &Pipeline, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, group) in pipeline.groups().iter().enumerate() {
        for (position, stage) in group.iter().enumerate() {
            let prefix = if position == 0 {
                format_index(index + 1)
            } else {
                "  ".to_string()
            };
            lines.push(format!(
                "{} {} \u{2192} {}",
                prefix,
                stage.name,
                display_path(&stage.output, root)
            ));
        }
    }
    lines.push(String::new());
    lines.push("Aliases".to_string());
    for (alias, stages) in ALIASES {
        lines.push(format!("{}{} = {}", indent(1), alias, stages.join(", ")));
    }
    lines
}

pub fn print_plan(pipeline: &Pipeline, root: &Path) {
    for line in format_plan(pipeline, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Watch
// ============================================================================

/// Describe a batch of changes that triggered a run.
pub fn format_changes(changes: &Changes, root: &Path) -> Vec<String> {
    let paths = changes.paths();
    let mut lines = vec![format!("==> {} file(s) changed", paths.len())];
    for path in paths.iter().take(MAX_LISTED_CHANGES) {
        lines.push(format!("{}{}", indent(1), display_path(path, root)));
    }
    if paths.len() > MAX_LISTED_CHANGES {
        lines.push(format!(
            "{}... and {} more",
            indent(1),
            paths.len() - MAX_LISTED_CHANGES
        ));
    }
    lines
}

pub fn print_changes(changes: &Changes, root: &Path) {
    for line in format_changes(changes, root) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Layout, ProjectConfig};
    use crate::pipeline::Plan;
    use crate::stage::StageReport;
    use crate::stages;
    use crate::types::BuildMode;
    use std::path::PathBuf;

    fn report(stage: &'static str, files: usize, summary: &str) -> StageReport {
        StageReport {
            stage,
            files,
            summary: summary.to_string(),
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads_to_two_columns() {
        assert_eq!(format_index(1), " 1");
        assert_eq!(format_index(12), "12");
    }

    #[test]
    fn elapsed_has_two_decimals() {
        assert_eq!(format_elapsed(Duration::from_millis(1234)), "1.23s");
    }

    #[test]
    fn display_path_outside_root_is_unchanged() {
        assert_eq!(
            display_path(Path::new("/elsewhere/dist"), Path::new("/project")),
            "/elsewhere/dist"
        );
        assert_eq!(display_path(Path::new("/project"), Path::new("/project")), ".");
        assert_eq!(
            display_path(Path::new("/project/dist"), Path::new("/project")),
            "dist"
        );
    }

    // =========================================================================
    // Event tests
    // =========================================================================

    #[test]
    fn started_and_group_lines() {
        let started = PipelineEvent::Started {
            mode: BuildMode::Production,
            groups: 10,
        };
        assert_eq!(format_event(&started), vec!["==> production build (10 groups)"]);

        let group = PipelineEvent::GroupStarted {
            index: 0,
            stages: vec!["clean", "lint:js"],
        };
        assert_eq!(format_event(&group), vec![" 1 clean, lint:js"]);
    }

    #[test]
    fn stage_finished_is_indented() {
        let event = PipelineEvent::StageFinished(report("js:copy", 2, "2 files copied"));
        assert_eq!(format_event(&event), vec!["    js:copy: 2 files copied"]);
    }

    #[test]
    fn aborted_indents_every_message_line() {
        let event = PipelineEvent::Aborted {
            stage: "lint:js",
            message: "2 lint problem(s)\na.js:1:1 no-debugger\na.js:2:4 eqeqeq".to_string(),
        };
        assert_eq!(
            format_event(&event),
            vec![
                "==> Aborted at lint:js",
                "    2 lint problem(s)",
                "    a.js:1:1 no-debugger",
                "    a.js:2:4 eqeqeq",
            ]
        );
    }

    #[test]
    fn completed_line() {
        let event = PipelineEvent::Completed {
            stages: 24,
            elapsed: Duration::from_millis(500),
        };
        assert_eq!(format_event(&event), vec!["==> Done: 24 stages in 0.50s"]);
    }

    // =========================================================================
    // Report and plan tests
    // =========================================================================

    #[test]
    fn run_report_aligns_stage_names() {
        let run = RunReport {
            mode: BuildMode::Development,
            stages: vec![
                report("clean", 2, "removed 2 paths"),
                report("css:autoprefixer", 1, "1 stylesheets prefixed"),
            ],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(
            format_run_report(&run),
            vec![
                "development build: 2 stages in 1.00s",
                "    clean                2  removed 2 paths",
                "    css:autoprefixer     1  1 stylesheets prefixed",
            ]
        );
    }

    #[test]
    fn plan_lists_groups_outputs_and_aliases() {
        let root = PathBuf::from("/project");
        let config = ProjectConfig::default();
        let layout = Layout::resolve(&root, &config.directories);
        let catalog = stages::catalog(&layout, &config).unwrap();
        let pipeline = Pipeline::for_plan(Plan::Production, &catalog).unwrap();

        let lines = format_plan(&pipeline, &root);
        assert_eq!(lines[0], " 1 clean \u{2192} dist");
        assert_eq!(lines[1], "   lint:js \u{2192} .");
        assert!(lines.contains(&"10 html:minify \u{2192} dist".to_string()));
        assert!(lines.contains(&"Aliases".to_string()));
        assert!(lines.contains(&"    compile = compile:less, compile:sass".to_string()));
    }

    // =========================================================================
    // Watch tests
    // =========================================================================

    #[test]
    fn changes_are_listed_then_summarized() {
        let root = Path::new("/project");
        let changes = Changes {
            added: (0..7)
                .map(|i| root.join(format!("src/js/f{i}.js")))
                .collect(),
            modified: vec![],
            removed: vec![],
        };
        let lines = format_changes(&changes, root);
        assert_eq!(lines[0], "==> 7 file(s) changed");
        assert_eq!(lines[1], "    src/js/f0.js");
        assert_eq!(lines.len(), 1 + MAX_LISTED_CHANGES + 1);
        assert_eq!(lines.last().unwrap(), "    ... and 2 more");
    }
}
