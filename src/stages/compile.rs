//! Stylesheet compilation.
//!
//! SCSS is compiled in-process with [grass](https://docs.rs/grass). LESS has
//! no Rust compiler, so it goes through the configured external command
//! (`lessc` by default), which must print the CSS on stdout.
//!
//! Each top-level source `<name>.scss` / `<name>.less` becomes
//! `<output>/<name>.css`. Partials (`_name.scss`) are excluded by the stage's
//! selector and only reached through imports.

use crate::config::StylesheetsConfig;
use crate::selector::SelectedFile;
use crate::stage::StageError;
use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylesheetLanguage {
    Less,
    Scss,
}

pub trait StylesheetCompiler: Sync {
    /// Compile one file and return the CSS.
    fn compile(&self, path: &Path) -> Result<String, StageError>;
}

pub struct ScssCompiler;

impl StylesheetCompiler for ScssCompiler {
    fn compile(&self, path: &Path) -> Result<String, StageError> {
        grass::from_path(path, &grass::Options::default()).map_err(|e| StageError::Compile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Runs `<program> <file>` and takes stdout as the compiled CSS.
pub struct CommandCompiler {
    pub program: String,
}

impl StylesheetCompiler for CommandCompiler {
    fn compile(&self, path: &Path) -> Result<String, StageError> {
        let output = Command::new(&self.program)
            .arg(path)
            .output()
            .map_err(|source| StageError::Tool {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Compile {
                path: path.to_path_buf(),
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub fn compiler_for(
    language: StylesheetLanguage,
    config: &StylesheetsConfig,
) -> Box<dyn StylesheetCompiler> {
    match language {
        StylesheetLanguage::Scss => Box::new(ScssCompiler),
        StylesheetLanguage::Less => Box::new(CommandCompiler {
            program: config.less_command.clone(),
        }),
    }
}

/// Compile every file in parallel, then write the results. Nothing is
/// written if any file fails to compile.
pub fn compile_stylesheets(
    compiler: &dyn StylesheetCompiler,
    files: &[SelectedFile],
    output: &Path,
) -> Result<usize, StageError> {
    if files.is_empty() {
        return Ok(0);
    }
    let compiled: Vec<Result<String, StageError>> = files
        .par_iter()
        .map(|file| compiler.compile(&file.path))
        .collect();
    let compiled = compiled.into_iter().collect::<Result<Vec<_>, _>>()?;

    fs::create_dir_all(output)?;
    for (file, css) in files.iter().zip(compiled) {
        let dest = output.join(Path::new(&file.relative).with_extension("css"));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, css)?;
        tracing::debug!(from = %file.relative, to = %dest.display(), "compiled");
    }
    Ok(files.len())
}

/// Whether an error means the external compiler is not installed.
pub fn is_missing_tool(err: &StageError) -> bool {
    matches!(err, StageError::Tool { source, .. } if source.kind() == ErrorKind::NotFound)
}
