//! Image compression cache for incremental builds.
//!
//! Re-encoding PNGs at maximum compression is the slowest step of a build,
//! and the output tree is wiped by `clean` at the start of every run, so the
//! compressed bytes cannot simply be left in place. This module keeps them in
//! the temp directory instead, keyed by content.
//!
//! # Design
//!
//! Entries are keyed by what goes into the compressor, never by where the
//! image lives. Renaming or moving an image keeps its entry; changed bytes or
//! changed compression settings produce a new key.
//!
//! - **`source_hash`**: SHA-256 of the uncompressed image as copied into the
//!   output tree.
//! - **`params_hash`**: SHA-256 of the compression parameters (PNG
//!   optimization on/off, JPEG quality).
//!
//! A lookup only hits when both hashes match an entry and that entry's blob
//! is still on disk.
//!
//! ## Storage
//!
//! Blobs and the JSON manifest live in `<temp>/imagemin-cache/`. `clean`
//! leaves the cache alone; `--no-cache` starts from an empty manifest.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

/// Name of the cache manifest file within the cache directory.
const MANIFEST_FILENAME: &str = "cache-manifest.json";

/// Manifests written with another format version are ignored.
const MANIFEST_VERSION: u32 = 1;

/// A single cached blob.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// Blob name → the hashes it was compressed from. Persisted as JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// `"{source_hash}:{params_hash}"` → blob name, rebuilt on load.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

impl CacheManifest {
    /// Manifest with no entries; `--no-cache` runs start here.
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Read the manifest from `cache_dir`. Missing, unreadable or
    /// outdated manifests yield an empty one.
    pub fn load(cache_dir: &Path) -> Self {
        let path = cache_dir.join(MANIFEST_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("discarding unreadable cache manifest: {e}");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    /// Save to the cache directory, creating it if needed.
    pub fn save(&self, cache_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(cache_dir)?;
        let path = cache_dir.join(MANIFEST_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Look up a cached blob by content hashes.
    ///
    /// Returns `Some(blob_name)` if an entry with matching hashes exists
    /// **and** the blob is still on disk.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        cache_dir: &Path,
    ) -> Option<String> {
        let content_key = format!("{}:{}", source_hash, params_hash);
        let blob = self.content_index.get(&content_key)?;
        if cache_dir.join(blob).exists() {
            Some(blob.clone())
        } else {
            None
        }
    }

    /// Record a cache entry for a blob.
    ///
    /// If the same content was previously stored under another blob name,
    /// the old entry is dropped.
    pub fn insert(&mut self, blob: String, source_hash: String, params_hash: String) {
        let content_key = format!("{}:{}", source_hash, params_hash);

        if let Some(old_blob) = self.content_index.get(&content_key)
            && *old_blob != blob
        {
            self.entries.remove(old_blob.as_str());
        }

        self.content_index.insert(content_key, blob.clone());
        self.entries.insert(
            blob,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }
}

fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(blob, entry)| {
            let content_key = format!("{}:{}", entry.source_hash, entry.params_hash);
            (content_key, blob.clone())
        })
        .collect()
}

/// Blob file name for a cache key. Keeps the extension so blobs stay
/// recognisable when browsing the cache directory.
pub fn blob_name(source_hash: &str, params_hash: &str, extension: &str) -> String {
    let params = &params_hash[..params_hash.len().min(16)];
    if extension.is_empty() {
        format!("{source_hash}-{params}")
    } else {
        format!("{source_hash}-{params}.{extension}")
    }
}

/// SHA-256 of a byte slice, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 hash of the compression parameters.
///
/// If any of these change, previously cached blobs are invalid.
pub fn hash_compress_params(optimize_png: bool, jpeg_quality: Option<u8>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"imagemin\0");
    hasher.update([u8::from(optimize_png)]);
    match jpeg_quality {
        Some(q) => {
            hasher.update(b"\x01");
            hasher.update([q]);
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for one compression stage.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} compressed ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} compressed", self.misses)
        }
    }
}
