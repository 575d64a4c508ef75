//! Content fingerprinting and rev manifests.
//!
//! Each asset class directory in the output tree is fingerprinted in place:
//! `img/logo.png` becomes `img/logo-<digest>.png`, where the digest is the
//! leading `hash_length` hex characters of the file's SHA-256. The original
//! file is removed.
//!
//! The mapping is recorded as a rev manifest. Keys and values are relative to
//! the output root (`"img/logo.png" → "img/logo-0123456789.png"`), so the
//! per-class manifests can be merged without ambiguity. Manifests live in
//! `<temp>/manifests/<class>.json` and never land in the output tree.

use crate::cache;
use crate::selector::SelectedFile;
use crate::stage::StageError;
use crate::types::AssetClass;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Original output-relative path → fingerprinted output-relative path.
pub type RevManifest = BTreeMap<String, String>;

/// Leading `len` hex characters of the SHA-256 of `bytes`.
pub fn digest(bytes: &[u8], len: usize) -> String {
    let mut hex = cache::hash_bytes(bytes);
    hex.truncate(len);
    hex
}

/// Insert `-<digest>` before the final extension of the last path component.
///
/// ```text
/// css/main.css      → css/main-<d>.css
/// js/jquery.min.js  → js/jquery.min-<d>.js
/// fonts/LICENSE     → fonts/LICENSE-<d>
/// ```
pub fn fingerprinted_name(relative: &str, digest: &str) -> String {
    let (dir, file) = match relative.rfind('/') {
        Some(i) => relative.split_at(i + 1),
        None => ("", relative),
    };
    match file.rfind('.') {
        Some(dot) if dot > 0 => format!("{dir}{}-{digest}{}", &file[..dot], &file[dot..]),
        _ => format!("{dir}{file}-{digest}"),
    }
}

/// Fingerprint `files` in place and return the manifest.
///
/// `prefix` is the class directory name; it is prepended to each selector
/// relative path to form the output-relative manifest keys.
pub fn fingerprint_files(
    files: &[SelectedFile],
    prefix: &str,
    hash_length: usize,
) -> Result<RevManifest, StageError> {
    let mut manifest = RevManifest::new();
    for file in files {
        let bytes = fs::read(&file.path)?;
        let renamed = fingerprinted_name(&file.relative, &digest(&bytes, hash_length));
        let target = sibling_path(&file.path, &renamed);
        if target != file.path {
            fs::rename(&file.path, &target)?;
        }
        tracing::trace!(from = %file.relative, to = %renamed, "fingerprinted");
        manifest.insert(join(prefix, &file.relative), join(prefix, &renamed));
    }
    Ok(manifest)
}

fn join(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Path of the renamed file: same directory as `original`, new file name.
fn sibling_path(original: &Path, renamed_relative: &str) -> PathBuf {
    let name = renamed_relative.rsplit('/').next().unwrap_or(renamed_relative);
    original.with_file_name(name)
}

pub fn manifest_path(dir: &Path, class: AssetClass) -> PathBuf {
    dir.join(format!("{class}.json"))
}

pub fn save_manifest(
    dir: &Path,
    class: AssetClass,
    manifest: &RevManifest,
) -> Result<(), StageError> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(manifest_path(dir, class), json)?;
    Ok(())
}

/// Merge the manifests of `classes`. A class whose manifest has not been
/// written yet contributes nothing.
pub fn load_manifests(dir: &Path, classes: &[AssetClass]) -> Result<RevManifest, StageError> {
    let mut merged = RevManifest::new();
    for &class in classes {
        let path = manifest_path(dir, class);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%class, "no manifest yet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: RevManifest = serde_json::from_str(&content)?;
        merged.extend(manifest);
    }
    Ok(merged)
}

/// Remove the manifest directory once a run no longer needs it.
pub fn discard_manifests(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;
    use tempfile::TempDir;

    #[test]
    fn names_insert_digest_before_extension() {
        assert_eq!(fingerprinted_name("main.css", "abc"), "main-abc.css");
        assert_eq!(
            fingerprinted_name("vendor/jquery.min.js", "abc"),
            "vendor/jquery.min-abc.js"
        );
        assert_eq!(fingerprinted_name("LICENSE", "abc"), "LICENSE-abc");
        assert_eq!(fingerprinted_name(".hidden", "abc"), ".hidden-abc");
    }

    #[test]
    fn digest_is_content_addressed() {
        let a = digest(b"body { color: red }", 10);
        assert_eq!(a.len(), 10);
        assert_eq!(a, digest(b"body { color: red }", 10));
        assert_ne!(a, digest(b"body { color: red}", 10));
    }

    #[test]
    fn fingerprint_renames_and_records() {
        let tmp = TempDir::new().unwrap();
        let js = tmp.path().join("js");
        fs::create_dir_all(js.join("vendor")).unwrap();
        fs::write(js.join("main.js"), "console.log(1);").unwrap();
        fs::write(js.join("vendor/lib.js"), "var x;").unwrap();

        let files = Selector::new(&js, &["**/*"]).unwrap().select().unwrap();
        let manifest = fingerprint_files(&files, "js", 8).unwrap();

        let main_digest = digest(b"console.log(1);", 8);
        let expected = format!("js/main-{main_digest}.js");
        assert_eq!(manifest["js/main.js"], expected);
        assert!(manifest.contains_key("js/vendor/lib.js"));
        assert!(!js.join("main.js").exists());
        assert!(tmp.path().join(&expected).exists());
        assert!(
            tmp.path()
                .join(&manifest["js/vendor/lib.js"])
                .exists()
        );
    }

    #[test]
    fn identical_content_gets_identical_digest_in_different_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "same").unwrap();
        fs::write(tmp.path().join("b.txt"), "same").unwrap();
        let files = Selector::new(tmp.path(), &["*"]).unwrap().select().unwrap();
        let manifest = fingerprint_files(&files, "", 10).unwrap();
        let d = digest(b"same", 10);
        assert_eq!(manifest["a.txt"], format!("a-{d}.txt"));
        assert_eq!(manifest["b.txt"], format!("b-{d}.txt"));
    }

    #[test]
    fn manifests_round_trip_and_merge() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("manifests");

        let mut fonts = RevManifest::new();
        fonts.insert("fonts/a.woff".into(), "fonts/a-1.woff".into());
        let mut images = RevManifest::new();
        images.insert("img/b.png".into(), "img/b-2.png".into());
        save_manifest(&dir, AssetClass::Fonts, &fonts).unwrap();
        save_manifest(&dir, AssetClass::Images, &images).unwrap();

        let merged =
            load_manifests(&dir, &[AssetClass::Fonts, AssetClass::Images, AssetClass::Styles])
                .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["img/b.png"], "img/b-2.png");

        discard_manifests(&dir).unwrap();
        assert!(!dir.exists());
        discard_manifests(&dir).unwrap();
    }

    #[test]
    fn corrupt_manifest_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(manifest_path(tmp.path(), AssetClass::Scripts), "{").unwrap();
        assert!(matches!(
            load_manifests(tmp.path(), &[AssetClass::Scripts]),
            Err(StageError::Json(_))
        ));
    }
}
