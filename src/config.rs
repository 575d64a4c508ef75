//! Project configuration module.
//!
//! Handles loading, validating, and merging the project's `h5bp.toml`. The
//! file is layered on top of stock defaults: a project only specifies the
//! values it wants to change.
//!
//! ## Config File Location
//!
//! `h5bp.toml` lives in the project root, next to the source and output
//! directories it describes:
//!
//! ```text
//! project/
//! ├── h5bp.toml              # Project metadata and stage settings
//! ├── LICENSE.txt            # Copied into dist/
//! ├── src/                   # Source tree
//! ├── test/                  # Linted alongside src/js
//! ├── dist/                  # Output tree (generated)
//! └── archive/               # Zipped builds (generated)
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! name = "html5-boilerplate"   # Used to name the archive
//! version = "0.1.0"            # Used to name the archive
//!
//! [directories]
//! source = "src"
//! dist = "dist"
//! test = "test"
//! archive = "archive"
//! temp = ".h5bp-temp"          # Transient manifests and compression cache
//!
//! [copy]
//! license = "LICENSE.txt"
//! htaccess = "node_modules/apache-server-configs/dist/.htaccess"
//!
//! [lint]
//! trailing_whitespace = true
//! no_debugger = true
//! eqeqeq = true
//! # max_line_length = 120
//!
//! [stylesheets]
//! less_command = "lessc"
//!
//! [sprites]
//! image_name = "sprite.png"
//! style_name = "sprite.css"
//! image_path = "../img/sprite.png"
//! class_prefix = "icon-"
//! padding = 0
//!
//! [images]
//! optimize_png = true
//! # jpeg_quality = 85
//!
//! [autoprefixer]
//! webkit = ["transform", "transition", ...]
//! moz = ["user-select", ...]
//! ms = ["transform", ...]
//!
//! [fingerprint]
//! hash_length = 10
//!
//! [watch]
//! interval_ms = 500
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the project config, looked up in the project root.
pub const CONFIG_FILENAME: &str = "h5bp.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// Project configuration loaded from `h5bp.toml`.
///
/// Carries the package metadata (name, version, directory layout) and the
/// per-stage settings. Read once at startup, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project name, used for the archive file name.
    pub name: String,
    /// Project version, used for the archive file name.
    pub version: String,
    /// Directory layout, relative to the project root.
    pub directories: DirectoriesConfig,
    /// Extra files copied into the output root.
    pub copy: CopyConfig,
    /// Script lint rules.
    pub lint: LintConfig,
    /// Stylesheet compiler settings.
    pub stylesheets: StylesheetsConfig,
    /// Sprite sheet generation.
    pub sprites: SpritesConfig,
    /// Image compression.
    pub images: ImagesConfig,
    /// Vendor prefixes added to stylesheet declarations.
    pub autoprefixer: AutoprefixerConfig,
    /// Content-hash file naming.
    pub fingerprint: FingerprintConfig,
    /// Polling watcher settings.
    pub watch: WatchConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "html5-boilerplate".to_string(),
            version: "0.1.0".to_string(),
            directories: DirectoriesConfig::default(),
            copy: CopyConfig::default(),
            lint: LintConfig::default(),
            stylesheets: StylesheetsConfig::default(),
            sprites: SpritesConfig::default(),
            images: ImagesConfig::default(),
            autoprefixer: AutoprefixerConfig::default(),
            fingerprint: FingerprintConfig::default(),
            watch: WatchConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation("name must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(ConfigError::Validation("version must not be empty".into()));
        }
        let dirs = &self.directories;
        for (key, value) in [
            ("source", &dirs.source),
            ("dist", &dirs.dist),
            ("test", &dirs.test),
            ("archive", &dirs.archive),
            ("temp", &dirs.temp),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "directories.{key} must not be empty"
                )));
            }
        }
        if dirs.source == dirs.dist {
            return Err(ConfigError::Validation(
                "directories.source and directories.dist must differ".into(),
            ));
        }
        if !(4..=64).contains(&self.fingerprint.hash_length) {
            return Err(ConfigError::Validation(
                "fingerprint.hash_length must be 4-64".into(),
            ));
        }
        if let Some(q) = self.images.jpeg_quality
            && !(1..=100).contains(&q)
        {
            return Err(ConfigError::Validation(
                "images.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.watch.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// File name of the archive: `<name>_v<version>.zip`.
    pub fn archive_file_name(&self) -> String {
        format!("{}_v{}.zip", self.name, self.version)
    }
}

/// Directory layout, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoriesConfig {
    pub source: String,
    pub dist: String,
    pub test: String,
    pub archive: String,
    /// Scratch space for manifests and the compression cache.
    pub temp: String,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            source: "src".to_string(),
            dist: "dist".to_string(),
            test: "test".to_string(),
            archive: "archive".to_string(),
            temp: ".h5bp-temp".to_string(),
        }
    }
}

/// Files outside the source tree that end up in the output root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopyConfig {
    /// License file copied verbatim.
    pub license: String,
    /// Apache server config; `# ErrorDocument` lines are uncommented on copy.
    pub htaccess: String,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            license: "LICENSE.txt".to_string(),
            htaccess: "node_modules/apache-server-configs/dist/.htaccess".to_string(),
        }
    }
}

/// Script lint rules. Every enabled rule that fires fails the lint stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintConfig {
    pub trailing_whitespace: bool,
    pub no_debugger: bool,
    /// Require `===`/`!==` over `==`/`!=`.
    pub eqeqeq: bool,
    pub max_line_length: Option<usize>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            trailing_whitespace: true,
            no_debugger: true,
            eqeqeq: true,
            max_line_length: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesheetsConfig {
    /// Program invoked as `<less_command> <file>`; compiled CSS on stdout.
    pub less_command: String,
}

impl Default for StylesheetsConfig {
    fn default() -> Self {
        Self {
            less_command: "lessc".to_string(),
        }
    }
}

/// Sprite sheet generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpritesConfig {
    /// Sprite image file name, written to `<source>/img`.
    pub image_name: String,
    /// Sprite stylesheet file name, written to `<source>/css`.
    pub style_name: String,
    /// URL of the sprite image as seen from the stylesheet.
    pub image_path: String,
    /// Prefix for generated class names (`.icon-home`).
    pub class_prefix: String,
    /// Transparent pixels between tiles.
    pub padding: u32,
}

impl Default for SpritesConfig {
    fn default() -> Self {
        Self {
            image_name: "sprite.png".to_string(),
            style_name: "sprite.css".to_string(),
            image_path: "../img/sprite.png".to_string(),
            class_prefix: "icon-".to_string(),
            padding: 0,
        }
    }
}

/// Image compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Re-encode PNGs at maximum compression (lossless).
    pub optimize_png: bool,
    /// Re-encode JPEGs at this quality. Absent = leave JPEGs untouched.
    pub jpeg_quality: Option<u8>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            optimize_png: true,
            jpeg_quality: None,
        }
    }
}

/// Properties that receive vendor-prefixed copies, per vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoprefixerConfig {
    pub webkit: Vec<String>,
    pub moz: Vec<String>,
    pub ms: Vec<String>,
}

impl Default for AutoprefixerConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            webkit: list(&[
                "animation",
                "appearance",
                "backface-visibility",
                "hyphens",
                "text-size-adjust",
                "transform",
                "transform-origin",
                "transition",
                "user-select",
            ]),
            moz: list(&["appearance", "hyphens", "user-select"]),
            ms: list(&[
                "hyphens",
                "text-size-adjust",
                "transform",
                "transform-origin",
                "user-select",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FingerprintConfig {
    /// Number of hex digest characters embedded in file names.
    pub hash_length: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self { hash_length: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Delay between filesystem polls.
    pub interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of worker threads for stages and image compression.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Resolved directory layout
// =============================================================================

/// Absolute directory layout of a project, resolved against its root.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub source: PathBuf,
    pub dist: PathBuf,
    pub test: PathBuf,
    pub archive: PathBuf,
    pub temp: PathBuf,
}

impl Layout {
    pub fn resolve(root: &Path, dirs: &DirectoriesConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            source: root.join(&dirs.source),
            dist: root.join(&dirs.dist),
            test: root.join(&dirs.test),
            archive: root.join(&dirs.archive),
            temp: root.join(&dirs.temp),
        }
    }

    /// Where fingerprint manifests live during a run.
    pub fn manifests_dir(&self) -> PathBuf {
        self.temp.join("manifests")
    }

    /// Where compressed image blobs are cached between runs.
    pub fn cache_dir(&self) -> PathBuf {
        self.temp.join("imagemin-cache")
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ProjectConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ProjectConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ProjectConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `h5bp.toml` from the project root.
pub fn load_config(root: &Path) -> Result<ProjectConfig, ConfigError> {
    resolve_config(load_raw_config(&root.join(CONFIG_FILENAME))?)
}

/// Load a config from an explicit path, which must exist.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    match load_raw_config(path)? {
        Some(value) => resolve_config(Some(value)),
        None => Err(ConfigError::NotFound(path.to_path_buf())),
    }
}

/// Returns a fully-commented stock `h5bp.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# h5bp-build configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# Project metadata. The archive is named <name>_v<version>.zip
name = "html5-boilerplate"
version = "0.1.0"

# ---------------------------------------------------------------------------
# Directory layout (relative to the project root)
# ---------------------------------------------------------------------------
[directories]
source = "src"
dist = "dist"
test = "test"
archive = "archive"
# Transient fingerprint manifests and the image compression cache.
temp = ".h5bp-temp"

# ---------------------------------------------------------------------------
# Extra files copied into the output root
# ---------------------------------------------------------------------------
[copy]
license = "LICENSE.txt"
# "# ErrorDocument" lines are uncommented while copying.
htaccess = "node_modules/apache-server-configs/dist/.htaccess"

# ---------------------------------------------------------------------------
# Script lint (src/js/*.js and test/*.js). Any finding fails the build.
# ---------------------------------------------------------------------------
[lint]
trailing_whitespace = true
no_debugger = true
# Require === and !== instead of == and !=
eqeqeq = true
# max_line_length = 120

# ---------------------------------------------------------------------------
# Stylesheet compilers. SCSS is compiled in-process; LESS shells out.
# ---------------------------------------------------------------------------
[stylesheets]
less_command = "lessc"

# ---------------------------------------------------------------------------
# Sprite sheet from src/img/sprite-img/*.png
# ---------------------------------------------------------------------------
[sprites]
image_name = "sprite.png"
style_name = "sprite.css"
image_path = "../img/sprite.png"
class_prefix = "icon-"
padding = 0

# ---------------------------------------------------------------------------
# Image compression (dist/img)
# ---------------------------------------------------------------------------
[images]
optimize_png = true
# Re-encode JPEGs at this quality. Omit to leave JPEGs untouched.
# jpeg_quality = 85

# ---------------------------------------------------------------------------
# Vendor prefixes: properties that get a prefixed copy, per vendor.
# ---------------------------------------------------------------------------
[autoprefixer]
webkit = ["animation", "appearance", "backface-visibility", "hyphens", "text-size-adjust", "transform", "transform-origin", "transition", "user-select"]
moz = ["appearance", "hyphens", "user-select"]
ms = ["hyphens", "text-size-adjust", "transform", "transform-origin", "user-select"]

# ---------------------------------------------------------------------------
# Fingerprinting: name.ext -> name-<hash>.ext
# ---------------------------------------------------------------------------
[fingerprint]
hash_length = 10

# ---------------------------------------------------------------------------
# Watch mode
# ---------------------------------------------------------------------------
[watch]
interval_ms = 500

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
