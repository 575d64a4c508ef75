//! Pipeline orchestration.
//!
//! A [`Pipeline`] is an ordered list of stage groups. Groups run one after
//! another; the stages inside a group run concurrently on the rayon pool and
//! have no ordering among themselves. A group starts only once every stage of
//! the previous group has succeeded.
//!
//! ```text
//!  1  clean, lint:js
//!  2  compile:less, compile:sass
//!  3  copy:htaccess, copy:license, copy:misc, img:sprites
//!  4  js:copy, css:copy, html:copy, img:copy
//!  5  img:imagemin, css:autoprefixer
//!  6  font:rev, img:rev
//!  7  css:rewrite
//!  8  html:bundle
//!  9  js:rev, css:rev
//! 10  html:minify
//! 11  archive:dir             (archive plan only)
//! 12  archive:zip             (archive plan only)
//! ```
//!
//! ## Validation
//!
//! Before a planned run starts, every stage's required artifacts must be
//! produced by an earlier group, and no two stages of one group may produce
//! the same artifact. A plan that breaks either rule is rejected without
//! running anything. Ad-hoc runs (stages named on the command line) skip
//! validation: they operate on whatever an earlier run left on disk.
//!
//! ## Failure
//!
//! The first failing stage, in declaration order within its group, aborts
//! the run. Files already written stay where they are; nothing is rolled
//! back.
//!
//! ## Progress
//!
//! Runs report [`PipelineEvent`]s over an optional channel. The caller
//! decides how to display them (see [`crate::output`]).

use crate::config::{Layout, ProjectConfig};
use crate::fingerprint;
use crate::selector::SelectError;
use crate::stage::{Artifact, RunContext, Stage, StageError, StageReport};
use crate::stages;
use crate::types::BuildMode;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),
    #[error("Stage '{stage}' requires {artifact}, which no earlier group produces")]
    MissingInput {
        stage: &'static str,
        artifact: Artifact,
    },
    #[error("Stages '{first}' and '{second}' in the same group both produce {artifact}")]
    ConflictingOutputs {
        first: &'static str,
        second: &'static str,
        artifact: Artifact,
    },
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Groups of the development and production runs.
pub const BUILD_GROUPS: &[&[&str]] = &[
    &["clean", "lint:js"],
    &["compile:less", "compile:sass"],
    &["copy:htaccess", "copy:license", "copy:misc", "img:sprites"],
    &["js:copy", "css:copy", "html:copy", "img:copy"],
    &["img:imagemin", "css:autoprefixer"],
    &["font:rev", "img:rev"],
    &["css:rewrite"],
    &["html:bundle"],
    &["js:rev", "css:rev"],
    &["html:minify"],
];

/// Groups appended to the production run by the archive plan.
pub const ARCHIVE_GROUPS: &[&[&str]] = &[&["archive:dir"], &["archive:zip"]];

/// Shorthand names accepted wherever stage names are.
pub const ALIASES: &[(&str, &[&str])] = &[
    ("lint", &["lint:js"]),
    ("compile", &["compile:less", "compile:sass"]),
    ("copy", &["copy:htaccess", "copy:license", "copy:misc"]),
    ("compress", &["img:imagemin"]),
];

/// The full runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Development,
    Production,
    Archive,
}

impl Plan {
    pub fn mode(self) -> BuildMode {
        match self {
            Plan::Development => BuildMode::Development,
            Plan::Production | Plan::Archive => BuildMode::Production,
        }
    }

    pub fn groups(self) -> Vec<&'static [&'static str]> {
        let mut groups = BUILD_GROUPS.to_vec();
        if self == Plan::Archive {
            groups.extend_from_slice(ARCHIVE_GROUPS);
        }
        groups
    }
}

/// Replace aliases with the stages they stand for. Order is kept and
/// duplicates are dropped.
pub fn expand_aliases<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref();
        let targets = ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, stages)| stages.to_vec())
            .unwrap_or_else(|| vec![name]);
        for target in targets {
            if !expanded.iter().any(|n| n == target) {
                expanded.push(target.to_string());
            }
        }
    }
    expanded
}

/// Progress of a pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        mode: BuildMode,
        groups: usize,
    },
    GroupStarted {
        index: usize,
        stages: Vec<&'static str>,
    },
    StageFinished(StageReport),
    Completed {
        stages: usize,
        elapsed: Duration,
    },
    Aborted {
        stage: &'static str,
        message: String,
    },
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: BuildMode,
    pub stages: Vec<StageReport>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    groups: Vec<Vec<Stage>>,
    /// Remove the fingerprint manifests after a successful run.
    discard_manifests: bool,
}

impl Pipeline {
    /// Build and validate one of the full runs.
    pub fn for_plan(plan: Plan, catalog: &[Stage]) -> Result<Self, PipelineError> {
        let mut pipeline = Self::from_groups(&plan.groups(), catalog)?;
        pipeline.validate()?;
        pipeline.discard_manifests = true;
        Ok(pipeline)
    }

    /// Resolve stage names against the catalog. Not validated.
    pub fn from_groups<S: AsRef<str>>(
        groups: &[&[S]],
        catalog: &[Stage],
    ) -> Result<Self, PipelineError> {
        let by_name: BTreeMap<&str, &Stage> = catalog.iter().map(|s| (s.name, s)).collect();
        let groups = groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|name| {
                        by_name
                            .get(name.as_ref())
                            .map(|stage| (*stage).clone())
                            .ok_or_else(|| PipelineError::UnknownStage(name.as_ref().to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            groups,
            discard_manifests: false,
        })
    }

    /// One group per name, in order, after alias expansion. Not validated.
    pub fn adhoc<S: AsRef<str>>(names: &[S], catalog: &[Stage]) -> Result<Self, PipelineError> {
        let expanded = expand_aliases(names);
        let groups: Vec<&[String]> = expanded.iter().map(std::slice::from_ref).collect();
        Self::from_groups(&groups, catalog)
    }

    pub fn groups(&self) -> &[Vec<Stage>] {
        &self.groups
    }

    /// Check the ordering invariants. See the [module docs](self).
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut available: BTreeSet<Artifact> = BTreeSet::new();
        for group in &self.groups {
            let mut produced: BTreeMap<Artifact, &'static str> = BTreeMap::new();
            for stage in group {
                if let Some(&artifact) = stage.requires.iter().find(|a| !available.contains(*a)) {
                    return Err(PipelineError::MissingInput {
                        stage: stage.name,
                        artifact,
                    });
                }
                for &artifact in &stage.produces {
                    if let Some(&first) = produced.get(&artifact) {
                        return Err(PipelineError::ConflictingOutputs {
                            first,
                            second: stage.name,
                            artifact,
                        });
                    }
                    produced.insert(artifact, stage.name);
                }
            }
            available.extend(produced.into_keys());
        }
        Ok(())
    }

    pub fn run(
        &self,
        ctx: &RunContext,
        events: Option<Sender<PipelineEvent>>,
    ) -> Result<RunReport, PipelineError> {
        let send = |event: PipelineEvent| {
            if let Some(tx) = &events {
                tx.send(event).ok();
            }
        };
        let start = Instant::now();
        tracing::info!(mode = %ctx.mode, groups = self.groups.len(), "pipeline starting");
        send(PipelineEvent::Started {
            mode: ctx.mode,
            groups: self.groups.len(),
        });

        let mut reports = Vec::new();
        for (index, group) in self.groups.iter().enumerate() {
            send(PipelineEvent::GroupStarted {
                index,
                stages: group.iter().map(|s| s.name).collect(),
            });
            let results: Vec<Result<StageReport, StageError>> =
                group.par_iter().map(|stage| stage.run(ctx)).collect();

            let mut failure = None;
            for (stage, result) in group.iter().zip(results) {
                match result {
                    Ok(report) => {
                        send(PipelineEvent::StageFinished(report.clone()));
                        reports.push(report);
                    }
                    Err(source) if failure.is_none() => failure = Some((stage.name, source)),
                    Err(other) => {
                        tracing::warn!(stage = stage.name, error = %other, "additional failure");
                    }
                }
            }
            if let Some((stage, source)) = failure {
                tracing::error!(stage, error = %source, "pipeline aborted");
                send(PipelineEvent::Aborted {
                    stage,
                    message: source.to_string(),
                });
                return Err(PipelineError::Stage { stage, source });
            }
        }

        if self.discard_manifests {
            fingerprint::discard_manifests(&ctx.layout.manifests_dir())?;
        }
        let elapsed = start.elapsed();
        send(PipelineEvent::Completed {
            stages: reports.len(),
            elapsed,
        });
        Ok(RunReport {
            mode: ctx.mode,
            stages: reports,
            elapsed,
        })
    }
}

/// Catalog for a project, wrapped for pipeline errors.
pub fn project_catalog(
    layout: &Layout,
    config: &ProjectConfig,
) -> Result<Vec<Stage>, PipelineError> {
    Ok(stages::catalog(layout, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Transform;
    use crate::test_helpers::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn catalog_at(root: &Path) -> Vec<Stage> {
        let config = ProjectConfig::default();
        let layout = Layout::resolve(root, &config.directories);
        project_catalog(&layout, &config).unwrap()
    }

    fn names(pipeline: &Pipeline) -> Vec<Vec<&'static str>> {
        pipeline
            .groups()
            .iter()
            .map(|g| g.iter().map(|s| s.name).collect())
            .collect()
    }

    fn noop(name: &'static str, requires: Vec<Artifact>, produces: Vec<Artifact>) -> Stage {
        Stage {
            name,
            inputs: vec![],
            output: PathBuf::new(),
            transform: Transform::Clean { targets: vec![] },
            requires,
            produces,
        }
    }

    #[test]
    fn all_plans_validate() {
        let catalog = catalog_at(Path::new("/p"));
        for plan in [Plan::Development, Plan::Production, Plan::Archive] {
            Pipeline::for_plan(plan, &catalog).unwrap();
        }
    }

    #[test]
    fn archive_plan_appends_archive_groups() {
        let catalog = catalog_at(Path::new("/p"));
        let pipeline = Pipeline::for_plan(Plan::Archive, &catalog).unwrap();
        let groups = names(&pipeline);
        assert_eq!(groups.len(), 12);
        assert_eq!(groups[10], vec!["archive:dir"]);
        assert_eq!(groups[11], vec!["archive:zip"]);
        assert_eq!(Plan::Archive.mode(), BuildMode::Production);
        assert_eq!(Plan::Development.groups(), Plan::Production.groups());
    }

    #[test]
    fn reordered_groups_fail_validation() {
        let catalog = catalog_at(Path::new("/p"));
        let mut groups = BUILD_GROUPS.to_vec();
        groups.swap(6, 7); // html:bundle before css:rewrite
        let pipeline = Pipeline::from_groups(&groups, &catalog).unwrap();
        match pipeline.validate() {
            Err(PipelineError::MissingInput { stage, artifact }) => {
                assert_eq!(stage, "html:bundle");
                assert_eq!(artifact, Artifact::RewrittenStyles);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn same_group_dependencies_fail_validation() {
        let catalog = catalog_at(Path::new("/p"));
        let groups: &[&[&str]] = &[&["clean", "js:copy"]];
        let pipeline = Pipeline::from_groups(groups, &catalog).unwrap();
        assert!(matches!(
            pipeline.validate(),
            Err(PipelineError::MissingInput { stage: "js:copy", .. })
        ));
    }

    #[test]
    fn archive_before_dist_copies_fails_validation() {
        let catalog = catalog_at(Path::new("/p"));
        let mut groups = Plan::Archive.groups();
        for group in groups.iter_mut().take(BUILD_GROUPS.len()) {
            if group.contains(&"copy:license") {
                *group = &["copy:misc", "img:sprites"][..];
            }
        }
        groups.push(&["copy:htaccess", "copy:license"]);
        let pipeline = Pipeline::from_groups(&groups, &catalog).unwrap();
        match pipeline.validate() {
            Err(PipelineError::MissingInput { stage, artifact }) => {
                assert_eq!(stage, "archive:zip");
                assert_eq!(artifact, Artifact::ServerConfig);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn conflicting_outputs_fail_validation() {
        let catalog = vec![
            noop("a", vec![], vec![Artifact::License]),
            noop("b", vec![], vec![Artifact::License]),
        ];
        let groups: &[&[&str]] = &[&["a", "b"]];
        let pipeline = Pipeline::from_groups(groups, &catalog).unwrap();
        assert!(matches!(
            pipeline.validate(),
            Err(PipelineError::ConflictingOutputs {
                first: "a",
                second: "b",
                ..
            })
        ));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let catalog = catalog_at(Path::new("/p"));
        assert!(matches!(
            Pipeline::adhoc(&["css:nope"], &catalog),
            Err(PipelineError::UnknownStage(name)) if name == "css:nope"
        ));
    }

    #[test]
    fn aliases_expand_in_order() {
        assert_eq!(
            expand_aliases(&["compile", "copy", "compile:sass", "img:copy"]),
            vec![
                "compile:less",
                "compile:sass",
                "copy:htaccess",
                "copy:license",
                "copy:misc",
                "img:copy"
            ]
        );
        let catalog = catalog_at(Path::new("/p"));
        let pipeline = Pipeline::adhoc(&["lint"], &catalog).unwrap();
        assert_eq!(names(&pipeline), vec![vec!["lint:js"]]);
    }

    #[test]
    fn run_reports_events_and_stops_at_first_failure() {
        let tmp = TempDir::new().unwrap();
        let config = ProjectConfig::default();
        let layout = Layout::resolve(tmp.path(), &config.directories);
        let ctx = RunContext {
            layout,
            config,
            mode: BuildMode::Development,
            use_cache: false,
        };

        let src = tmp.path().join("src/css/sass");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("main.scss"), ".a {").unwrap();

        let catalog = project_catalog(&ctx.layout, &ctx.config).unwrap();
        let groups: &[&[&str]] = &[&["clean"], &["compile:sass"], &["html:copy"]];
        let pipeline = Pipeline::from_groups(groups, &catalog).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let err = pipeline.run(&ctx, Some(tx)).unwrap_err();
        assert!(matches!(err, PipelineError::Stage { stage: "compile:sass", .. }));

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events.first(), Some(PipelineEvent::Started { groups: 3, .. })));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Aborted { stage: "compile:sass", .. })
        ));
        let finished: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageFinished(r) => Some(r.stage),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec!["clean"]);
    }

    #[test]
    fn development_run_on_fixture_project() {
        let project = setup_project();
        let (layout, config) = load_project(project.path());
        let catalog = project_catalog(&layout, &config).unwrap();
        let pipeline = Pipeline::for_plan(Plan::Development, &catalog).unwrap();
        let ctx = RunContext {
            layout: layout.clone(),
            config,
            mode: BuildMode::Development,
            use_cache: true,
        };

        let report = pipeline.run(&ctx, None).unwrap();
        assert_eq!(report.mode, BuildMode::Development);
        assert_eq!(report.stages.len(), 21);

        let main_js = find_fingerprinted(&layout.dist.join("js"), "main", "js");
        let html = std::fs::read_to_string(layout.dist.join("index.html")).unwrap();
        // No bundling or minification outside production.
        assert!(html.contains("<!-- build:js js/app.js -->"));
        assert!(html.contains(&format!("js/{}", file_name(&main_js))));
        assert!(!layout.dist.join("js/app.js").exists());
        assert!(!layout.manifests_dir().exists());

        let sprite_css = find_fingerprinted(&layout.dist.join("css"), "sprite", "css");
        let sprite_png = find_fingerprinted(&layout.dist.join("img"), "sprite", "png");
        let css = std::fs::read_to_string(sprite_css).unwrap();
        assert!(css.contains(&format!("../img/{}", file_name(&sprite_png))));
    }
}
