//! Shared types used by the stages and the orchestrator.

use std::fmt;

/// Development or production build.
///
/// Chosen once per pipeline run and handed to every stage through the
/// [`RunContext`](crate::stage::RunContext). Stages that bundle or minify
/// only do so in production; everything else behaves identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    pub fn is_production(self) -> bool {
        self == BuildMode::Production
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Development => write!(f, "development"),
            BuildMode::Production => write!(f, "production"),
        }
    }
}

/// Asset classes that get fingerprinted, each living in its own directory
/// under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetClass {
    Scripts,
    Styles,
    Fonts,
    Images,
}

impl AssetClass {
    pub const ALL: [AssetClass; 4] = [
        AssetClass::Scripts,
        AssetClass::Styles,
        AssetClass::Fonts,
        AssetClass::Images,
    ];

    /// Directory name under both the source and the output root.
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetClass::Scripts => "js",
            AssetClass::Styles => "css",
            AssetClass::Fonts => "fonts",
            AssetClass::Images => "img",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetClass::Scripts => "scripts",
            AssetClass::Styles => "styles",
            AssetClass::Fonts => "fonts",
            AssetClass::Images => "images",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_mode_display() {
        assert_eq!(BuildMode::Development.to_string(), "development");
        assert_eq!(BuildMode::Production.to_string(), "production");
        assert!(BuildMode::Production.is_production());
        assert!(!BuildMode::Development.is_production());
    }

    #[test]
    fn asset_class_dirs_are_distinct() {
        let dirs: std::collections::HashSet<_> =
            AssetClass::ALL.iter().map(|c| c.dir_name()).collect();
        assert_eq!(dirs.len(), 4);
    }
}
