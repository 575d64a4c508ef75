//! Zip archive of the output tree.
//!
//! Every file under the output root is stored, hidden files included, at its
//! root-relative path and in sorted order. Entries carry the permission bits
//! of the file on disk so executables and restricted files survive the trip.

use crate::selector::{SelectError, Selector};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use thiserror::Error;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Select(#[from] SelectError),
}

/// Create the archive directory with mode 0755.
pub fn create_archive_dir(dir: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> io::Result<u32> {
    Ok(0o644)
}

/// Zip everything under `dist` into `target`. Returns the number of entries.
///
/// If `target` itself lives under `dist` it is skipped.
pub fn write_archive(dist: &Path, target: &Path) -> Result<usize, ArchiveError> {
    let entries: Vec<_> = Selector::new(dist, &["**/*"])?
        .with_dot()
        .select()?
        .into_iter()
        .filter(|entry| entry.path != target)
        .collect();

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(File::create(target)?);
    for entry in &entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(file_mode(&entry.path)?);
        zip.start_file(entry.relative.as_str(), options)?;
        let mut source = File::open(&entry.path)?;
        io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?;

    tracing::debug!(
        archive = %target.display(),
        entries = entries.len(),
        "archive written"
    );
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn dist_tree(root: &Path) -> std::path::PathBuf {
        let dist = root.join("dist");
        fs::create_dir_all(dist.join("css")).unwrap();
        fs::write(dist.join("index.html"), "<p>hi</p>").unwrap();
        fs::write(dist.join(".htaccess"), "ErrorDocument 404 /404.html").unwrap();
        fs::write(dist.join("css/main-abc.css"), "body{}").unwrap();
        fs::write(dist.join("LICENSE"), "MIT").unwrap();
        dist
    }

    fn names(archive: &mut ZipArchive<File>) -> Vec<String> {
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn archives_every_file_including_hidden() {
        let tmp = TempDir::new().unwrap();
        let dist = dist_tree(tmp.path());
        let target = tmp.path().join("archive/site_v1.0.0.zip");

        assert_eq!(write_archive(&dist, &target).unwrap(), 4);

        let mut archive = ZipArchive::new(File::open(&target).unwrap()).unwrap();
        assert_eq!(
            names(&mut archive),
            vec![".htaccess", "LICENSE", "css/main-abc.css", "index.html"]
        );
        let mut content = String::new();
        archive
            .by_name("css/main-abc.css")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "body{}");
    }

    #[cfg(unix)]
    #[test]
    fn entries_keep_permission_bits() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let dist = dist_tree(tmp.path());
        fs::set_permissions(dist.join("index.html"), fs::Permissions::from_mode(0o600)).unwrap();
        fs::set_permissions(dist.join("LICENSE"), fs::Permissions::from_mode(0o755)).unwrap();
        let target = tmp.path().join("out.zip");
        write_archive(&dist, &target).unwrap();

        let mut archive = ZipArchive::new(File::open(&target).unwrap()).unwrap();
        let mode = |archive: &mut ZipArchive<File>, name: &str| {
            archive.by_name(name).unwrap().unix_mode().unwrap() & 0o777
        };
        assert_eq!(mode(&mut archive, "index.html"), 0o600);
        assert_eq!(mode(&mut archive, "LICENSE"), 0o755);
    }

    #[test]
    fn archive_inside_dist_is_not_included() {
        let tmp = TempDir::new().unwrap();
        let dist = dist_tree(tmp.path());
        let target = dist.join("self.zip");
        write_archive(&dist, &target).unwrap();
        write_archive(&dist, &target).unwrap();
        let mut archive = ZipArchive::new(File::open(&target).unwrap()).unwrap();
        assert!(!names(&mut archive).contains(&"self.zip".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn archive_dir_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("archive");
        create_archive_dir(&dir).unwrap();
        create_archive_dir(&dir).unwrap();
        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }
}
