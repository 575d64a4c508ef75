//! Shared test utilities for the h5bp-build test suite.
//!
//! Provides a materialized fixture project plus lookups over the output
//! tree that work with fingerprinted file names.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let project = setup_project();
//! let (layout, config) = load_project(project.path());
//! // ... run a pipeline ...
//! let css = find_fingerprinted(&layout.dist.join("css"), "main", "css");
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::{self, Layout, ProjectConfig};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/project/` to a temp directory, add the generated images,
/// and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();

    let img = tmp.path().join("src/img");
    write_png(&img.join("logo.png"), 4, 4, [200, 30, 30, 255]);
    write_png(&img.join("sprite-img/a.png"), 8, 8, [0, 0, 255, 255]);
    write_png(&img.join("sprite-img/b.png"), 4, 6, [0, 255, 0, 255]);
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write a solid-color RGBA PNG, creating parent directories.
pub fn write_png(path: &Path, width: u32, height: u32, rgba: [u8; 4]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
        .save(path)
        .unwrap();
}

/// Config and layout for a project root.
pub fn load_project(root: &Path) -> (Layout, ProjectConfig) {
    let config = config::load_config(root).unwrap();
    let layout = Layout::resolve(root, &config.directories);
    (layout, config)
}

// =========================================================================
// Output lookups (panic with a clear message on miss)
// =========================================================================

/// All files under `dir`, relative and `/`-separated, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(dir)
                .ok()
                .map(crate::selector::relative_string)
        })
        .collect();
    files.sort();
    files
}

/// Find `<stem>-<digest>.<ext>` directly inside `dir`. Panics unless there
/// is exactly one.
pub fn find_fingerprinted(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let prefix = format!("{stem}-");
    let suffix = format!(".{ext}");
    let matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|rest| rest.strip_suffix(&suffix))
                .is_some_and(|digest| {
                    !digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit())
                })
        })
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "expected one fingerprinted {stem}.{ext} in {}, found {:?}. Available: {:?}",
        dir.display(),
        matches,
        list_files(dir)
    );
    matches.into_iter().next().unwrap()
}

/// File name of `path` as a string.
pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
