//! Local cache of pulled binaries.
//!
//! Slots mirror registry identity so a tag is looked up without any network
//! request:
//!
//! ```text
//! ~/.cache/bincast/
//! └── <registry>/
//!     └── <repository>/
//!         └── <tag>/
//!             ├── <os>-<arch>      # binary, mode 0755
//!             └── metadata.json    # where it came from
//! ```
//!
//! The cache only grows; slots are overwritten by later pulls of the same
//! tag and never evicted.

use chrono::{DateTime, Utc};
use oci_distribution::Reference;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::{Error, Result};
use crate::platform::Platform;

/// File name of the metadata record in each slot.
pub const METADATA_FILE: &str = "metadata.json";

/// Identity of a cache slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Registry host, as referenced.
    pub registry: String,
    /// Repository path.
    pub repository: String,
    /// Tag (or digest for digest references).
    pub tag: String,
    /// Platform of the binary.
    pub platform: Platform,
}

impl CacheKey {
    /// Create a key.
    #[must_use]
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
            platform,
        }
    }

    /// Key for a parsed reference.
    #[must_use]
    pub fn for_reference(reference: &Reference, platform: Platform) -> Self {
        let tag = reference
            .tag()
            .or_else(|| reference.digest())
            .unwrap_or("latest");
        Self::new(reference.registry(), reference.repository(), tag, platform)
    }
}

/// Metadata written next to every cached binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Escaped registry.
    pub registry: String,
    /// Escaped repository.
    pub repository: String,
    /// Tag.
    pub tag: String,
    /// Operating system.
    pub os: String,
    /// Architecture.
    pub architecture: String,
    /// Manifest digest the binary was pulled from.
    pub digest: String,
    /// Binary size in bytes.
    pub size: u64,
    /// When the binary was cached.
    pub cached_at: DateTime<Utc>,
}

/// A cached binary found by [`BinaryCache::list`].
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The slot's metadata record.
    pub metadata: CacheMetadata,
    /// Path of the binary.
    pub binary_path: PathBuf,
    /// Size of the binary on disk.
    pub binary_size: u64,
}

impl CacheEntry {
    /// Platform of the cached binary.
    #[must_use]
    pub fn platform(&self) -> Platform {
        Platform::new(&self.metadata.os, &self.metadata.architecture)
    }

    /// `registry/repository:tag` as recorded (escaped segments).
    #[must_use]
    pub fn reference(&self) -> String {
        format!(
            "{}/{}:{}",
            self.metadata.registry, self.metadata.repository, self.metadata.tag
        )
    }
}

/// Cache of pulled binaries keyed by registry, repository, tag and platform.
///
/// Default location: `~/.cache/bincast/`
#[derive(Debug, Clone)]
pub struct BinaryCache {
    root: PathBuf,
}

impl Default for BinaryCache {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("bincast");
        Self::new(cache_dir)
    }
}

impl BinaryCache {
    /// Create a cache at the specified root directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every platform of one tag.
    #[must_use]
    pub fn slot_dir(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(escape_segment(&key.registry))
            .join(escape_segment(&key.repository))
            .join(escape_segment(&key.tag))
    }

    /// Path of the cached binary.
    #[must_use]
    pub fn binary_path(&self, key: &CacheKey) -> PathBuf {
        self.slot_dir(key).join(key.platform.slot_name())
    }

    /// Path of the slot's metadata record.
    #[must_use]
    pub fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.slot_dir(key).join(METADATA_FILE)
    }

    /// Cached binary for `key`, if present. Metadata is not required.
    #[must_use]
    pub fn probe(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.binary_path(key);
        if path.is_file() {
            trace!(?path, "Cache hit");
            Some(path)
        } else {
            trace!(?path, "Cache miss");
            None
        }
    }

    /// Store binary bytes for `key` and record where they came from.
    ///
    /// The binary is written to a temporary file in the slot and renamed into
    /// place, so a concurrent reader never sees a partial file. A failure to
    /// write the binary is an [`Error::Cache`]; a failure to write metadata is
    /// logged and otherwise ignored.
    pub fn store(&self, key: &CacheKey, data: &[u8], digest: &str) -> Result<PathBuf> {
        let dest = self.binary_path(key);
        self.write_binary(key, data, &dest)
            .map_err(|e| Error::Cache(format!("{}: {e}", dest.display())))?;
        debug!(?dest, size = data.len(), "Stored binary in cache");

        if let Err(e) = self.write_metadata(key, digest, data.len() as u64) {
            warn!(error = %e, "Failed to save cache metadata");
        }
        Ok(dest)
    }

    /// Store a copy of an already written binary.
    pub fn store_file(&self, key: &CacheKey, source: &Path, digest: &str) -> Result<PathBuf> {
        let data = std::fs::read(source)?;
        self.store(key, &data, digest)
    }

    fn write_binary(&self, key: &CacheKey, data: &[u8], dest: &Path) -> std::io::Result<()> {
        let dir = self.slot_dir(key);
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        make_executable(tmp.path())?;

        tmp.persist(dest).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_metadata(&self, key: &CacheKey, digest: &str, size: u64) -> Result<()> {
        let metadata = CacheMetadata {
            registry: escape_segment(&key.registry),
            repository: escape_segment(&key.repository),
            tag: key.tag.clone(),
            os: key.platform.os.clone(),
            architecture: key.platform.arch.clone(),
            digest: digest.to_string(),
            size,
            cached_at: Utc::now(),
        };
        let path = self.metadata_path(key);
        std::fs::write(&path, serde_json::to_vec_pretty(&metadata)?)?;
        trace!(?path, "Wrote cache metadata");
        Ok(())
    }

    /// Every cached binary that has both a metadata record and a binary.
    ///
    /// Unreadable metadata and metadata whose binary is gone are skipped.
    /// Entries are sorted by reference, then platform.
    pub fn list(&self) -> Result<Vec<CacheEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || entry.file_name() != METADATA_FILE {
                continue;
            }
            if let Some(found) = read_entry(entry.path()) {
                entries.push(found);
            }
        }

        entries.sort_by(|a, b| {
            (&a.metadata.registry, &a.metadata.repository, &a.metadata.tag)
                .cmp(&(&b.metadata.registry, &b.metadata.repository, &b.metadata.tag))
                .then_with(|| a.platform().cmp(&b.platform()))
        });
        Ok(entries)
    }
}

fn read_entry(metadata_path: &Path) -> Option<CacheEntry> {
    let metadata: CacheMetadata = match std::fs::read(metadata_path)
        .map_err(|e| e.to_string())
        .and_then(|data| serde_json::from_slice(&data).map_err(|e| e.to_string()))
    {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!(path = ?metadata_path, error = %e, "Skipping unreadable cache metadata");
            return None;
        }
    };

    let binary_path = metadata_path
        .parent()?
        .join(format!("{}-{}", metadata.os, metadata.architecture));
    match std::fs::metadata(&binary_path) {
        Ok(stat) => Some(CacheEntry {
            metadata,
            binary_size: stat.len(),
            binary_path,
        }),
        Err(_) => {
            debug!(path = ?metadata_path, "Binary missing for cache metadata");
            None
        }
    }
}

/// Make a registry or repository name safe as a single path segment.
#[must_use]
pub fn escape_segment(segment: &str) -> String {
    segment.replace([':', '/', '\\'], "_")
}

#[cfg(unix)]
pub(crate) fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
pub(crate) fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
