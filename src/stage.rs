//! Stage descriptors and the stage runner.
//!
//! A [`Stage`] is pure data: a name, the files it reads, where it writes, the
//! [`Transform`] it applies, and the [`Artifact`]s it requires and produces.
//! The artifacts are only used to check plan ordering before anything runs
//! (see [`Pipeline::validate`](crate::pipeline::Pipeline::validate)).
//!
//! [`Stage::run`] dispatches on the transform. Every stage either returns a
//! [`StageReport`] or a [`StageError`]; nothing is retried or swallowed.

use crate::archive::{self, ArchiveError};
use crate::config::{Layout, ProjectConfig};
use crate::fingerprint;
use crate::rewrite;
use crate::selector::{SelectError, SelectedFile, Selector};
use crate::stages::compile::StylesheetLanguage;
use crate::stages::copy::Replacement;
use crate::stages::lint::Diagnostic;
use crate::stages::{self, bundle, compile, compress, copy, lint, minify, prefix, sprite};
use crate::types::{AssetClass, BuildMode};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error("Image error in {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("{} lint problem(s)\n{}", .0.len(), lint::render_diagnostics(.0))]
    Lint(Vec<Diagnostic>),
    #[error("Failed to compile {path}: {message}")]
    Compile { path: PathBuf, message: String },
    #[error("Could not run '{program}': {source}")]
    Tool {
        program: String,
        source: std::io::Error,
    },
    #[error("{page} references missing file '{reference}': {source}")]
    MissingReference {
        page: PathBuf,
        reference: String,
        source: std::io::Error,
    },
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// A unit of pipeline state a stage can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Artifact {
    /// Output and archive roots wiped.
    CleanOutput,
    /// LESS compiled next to the source stylesheets.
    CompiledLess,
    /// SCSS compiled next to the source stylesheets.
    CompiledSass,
    /// Sprite image and stylesheet written into the source tree.
    SpriteSheet,
    ServerConfig,
    License,
    /// Everything under the source root not handled by a dedicated copy.
    MiscFiles,
    Copied(AssetClass),
    CopiedMarkup,
    CompressedImages,
    PrefixedStyles,
    Manifest(AssetClass),
    RewrittenStyles,
    BundledMarkup,
    FinalMarkup,
    ArchiveDir,
    Archive,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::CleanOutput => write!(f, "clean output"),
            Artifact::CompiledLess => write!(f, "compiled LESS"),
            Artifact::CompiledSass => write!(f, "compiled SCSS"),
            Artifact::SpriteSheet => write!(f, "sprite sheet"),
            Artifact::ServerConfig => write!(f, "server config"),
            Artifact::License => write!(f, "license"),
            Artifact::MiscFiles => write!(f, "misc files"),
            Artifact::Copied(class) => write!(f, "copied {class}"),
            Artifact::CopiedMarkup => write!(f, "copied markup"),
            Artifact::CompressedImages => write!(f, "compressed images"),
            Artifact::PrefixedStyles => write!(f, "prefixed styles"),
            Artifact::Manifest(class) => write!(f, "{class} manifest"),
            Artifact::RewrittenStyles => write!(f, "rewritten styles"),
            Artifact::BundledMarkup => write!(f, "bundled markup"),
            Artifact::FinalMarkup => write!(f, "final markup"),
            Artifact::ArchiveDir => write!(f, "archive directory"),
            Artifact::Archive => write!(f, "archive"),
        }
    }
}

/// What a stage does to its input files.
#[derive(Debug, Clone)]
pub enum Transform {
    /// Delete directories (inputs unused).
    Clean { targets: Vec<PathBuf> },
    Lint,
    Compile(StylesheetLanguage),
    Copy { replacements: Vec<Replacement> },
    /// Composite the inputs into `output/<image_name>` plus a stylesheet.
    Sprite { css_dir: PathBuf },
    Compress,
    Autoprefix,
    Fingerprint(AssetClass),
    /// Rewrite references using the manifests of these classes.
    Rewrite { manifests: Vec<AssetClass> },
    Bundle,
    /// Rewrite with every manifest, then minify in production.
    FinalizeMarkup,
    CreateDir,
    Archive { file: PathBuf },
}

/// One named step of the pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: &'static str,
    pub inputs: Vec<Selector>,
    pub output: PathBuf,
    pub transform: Transform,
    pub requires: Vec<Artifact>,
    pub produces: Vec<Artifact>,
}

/// Everything a stage may read besides its own descriptor.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub layout: Layout,
    pub config: ProjectConfig,
    pub mode: BuildMode,
    /// Consult the image compression cache.
    pub use_cache: bool,
}

/// Outcome of a successful stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    /// Files read or written, depending on the stage.
    pub files: usize,
    pub summary: String,
}

impl Stage {
    /// All files matched by the stage's selectors, in selector order.
    pub fn select_inputs(&self) -> Result<Vec<SelectedFile>, StageError> {
        let mut files = Vec::new();
        for selector in &self.inputs {
            files.extend(selector.select()?);
        }
        Ok(files)
    }

    pub fn run(&self, ctx: &RunContext) -> Result<StageReport, StageError> {
        let _span = tracing::info_span!("stage", name = self.name).entered();
        tracing::debug!(mode = %ctx.mode, output = %self.output.display(), "starting");

        let (files, summary) = match &self.transform {
            Transform::Clean { targets } => {
                let removed = stages::remove_paths(targets)?;
                (removed, format!("removed {removed} paths"))
            }
            Transform::Lint => {
                let inputs = self.select_inputs()?;
                let linter = lint::RuleLinter::new(ctx.config.lint.clone())?;
                let diagnostics = lint::lint_files(&linter, &inputs)?;
                if !diagnostics.is_empty() {
                    return Err(StageError::Lint(diagnostics));
                }
                (inputs.len(), format!("{} files clean", inputs.len()))
            }
            Transform::Compile(language) => {
                let inputs = self.select_inputs()?;
                let compiler = compile::compiler_for(*language, &ctx.config.stylesheets);
                let count = compile::compile_stylesheets(compiler.as_ref(), &inputs, &self.output)?;
                (count, format!("{count} stylesheets compiled"))
            }
            Transform::Copy { replacements } => {
                let inputs = self.select_inputs()?;
                let count = copy::copy_files(&inputs, &self.output, replacements)?;
                (count, format!("{count} files copied"))
            }
            Transform::Sprite { css_dir } => {
                let inputs = self.select_inputs()?;
                match sprite::build_sprite(&inputs, &self.output, css_dir, &ctx.config.sprites)? {
                    Some(sheet) => (
                        sheet.tiles.len(),
                        format!(
                            "{} images \u{2192} {} ({}x{})",
                            sheet.tiles.len(),
                            ctx.config.sprites.image_name,
                            sheet.width,
                            sheet.height
                        ),
                    ),
                    None => (0, "no sprite images".to_string()),
                }
            }
            Transform::Compress => {
                let inputs = self.select_inputs()?;
                let params = compress::CompressParams::from_config(&ctx.config.images);
                let stats = compress::compress_images(
                    &inputs,
                    &ctx.layout.cache_dir(),
                    ctx.use_cache,
                    &params,
                )?;
                (inputs.len(), stats.to_string())
            }
            Transform::Autoprefix => {
                let inputs = self.select_inputs()?;
                let rules = prefix::PrefixRules::from_config(&ctx.config.autoprefixer);
                let changed =
                    stages::rewrite_in_place(&inputs, |css| prefix::prefix_css(css, &rules))?;
                (changed, format!("{changed} stylesheets prefixed"))
            }
            Transform::Fingerprint(class) => {
                let inputs = self.select_inputs()?;
                let manifest = fingerprint::fingerprint_files(
                    &inputs,
                    class.dir_name(),
                    ctx.config.fingerprint.hash_length,
                )?;
                fingerprint::save_manifest(&ctx.layout.manifests_dir(), *class, &manifest)?;
                (manifest.len(), format!("{} files fingerprinted", manifest.len()))
            }
            Transform::Rewrite { manifests } => {
                let inputs = self.select_inputs()?;
                let manifest = fingerprint::load_manifests(&ctx.layout.manifests_dir(), manifests)?;
                let changed = stages::rewrite_in_place(&inputs, |text| {
                    rewrite::rewrite_references(text, &manifest)
                })?;
                (changed, format!("{changed} files rewritten"))
            }
            Transform::Bundle => {
                if !ctx.mode.is_production() {
                    (0, format!("skipped ({})", ctx.mode))
                } else {
                    let inputs = self.select_inputs()?;
                    let written = bundle::bundle_files(&inputs, &ctx.layout.dist)?;
                    (written, format!("{written} bundles written"))
                }
            }
            Transform::FinalizeMarkup => {
                let inputs = self.select_inputs()?;
                let manifest =
                    fingerprint::load_manifests(&ctx.layout.manifests_dir(), &AssetClass::ALL)?;
                let production = ctx.mode.is_production();
                let changed = stages::rewrite_in_place(&inputs, |html| {
                    let rewritten = rewrite::rewrite_references(html, &manifest);
                    if production {
                        minify::minify_markup(&rewritten)
                    } else {
                        rewritten
                    }
                })?;
                let action = if production { "rewritten and minified" } else { "rewritten" };
                (changed, format!("{changed} files {action}"))
            }
            Transform::CreateDir => {
                archive::create_archive_dir(&self.output)?;
                (0, format!("created {}", self.output.display()))
            }
            Transform::Archive { file } => {
                let count = archive::write_archive(&ctx.layout.dist, file)?;
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (count, format!("{count} files \u{2192} {name}"))
            }
        };

        tracing::debug!(files, %summary, "finished");
        Ok(StageReport {
            stage: self.name,
            files,
            summary,
        })
    }
}
