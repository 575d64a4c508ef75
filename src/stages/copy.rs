//! Plain and text-substituting file copies.

use crate::selector::SelectedFile;
use crate::stage::StageError;
use std::fs;
use std::path::Path;

/// Literal text substitution applied while copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

impl Replacement {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Copy each file to `output/<relative>`, creating directories as needed.
///
/// With no replacements the bytes are copied as-is. Otherwise the file is read
/// as text, every replacement is applied in order, and the source permissions
/// are carried over to the written copy.
pub fn copy_files(
    files: &[SelectedFile],
    output: &Path,
    replacements: &[Replacement],
) -> Result<usize, StageError> {
    for file in files {
        let dest = output.join(&file.relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if replacements.is_empty() {
            fs::copy(&file.path, &dest)?;
        } else {
            let text = replacements
                .iter()
                .fold(fs::read_to_string(&file.path)?, |text, r| {
                    text.replace(&r.from, &r.to)
                });
            fs::write(&dest, text)?;
            fs::set_permissions(&dest, fs::metadata(&file.path)?.permissions())?;
        }
        tracing::trace!(file = %file.relative, "copied");
    }
    Ok(files.len())
}
