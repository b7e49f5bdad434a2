//! Multi-platform packaging: one binary per platform, one manifest per
//! binary, one index over all of them.
//!
//! Platforms are published one after another and only the index is tagged,
//! so a push that fails half way leaves the tag where it was.

use oci_distribution::Reference;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{RegistryClient, copy_graph, with_cancel};
use crate::manifest::{
    Descriptor, EMPTY_CONFIG, Index, Manifest, OCI_CONFIG_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE,
    OCI_MANIFEST_MEDIA_TYPE,
};
use crate::media_type::media_type_for;
use crate::platform::Platform;
use crate::store::MemoryStore;
use crate::{Error, Result};

/// A binary bound to the platform it is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformBinary {
    /// Target platform.
    pub platform: Platform,
    /// Path of the binary on disk.
    pub path: PathBuf,
}

/// Parse an `os/arch=path` binding and check the file is readable.
///
/// Everything after the first `=` is the path, so paths may contain `=`.
pub fn parse_binding(binding: &str) -> Result<PlatformBinary> {
    let Some((platform, path)) = binding.split_once('=') else {
        return Err(Error::invalid_binding(binding, "expected os/arch=path"));
    };

    let platform =
        Platform::parse(platform).map_err(|e| Error::invalid_binding(binding, e.to_string()))?;
    if path.is_empty() {
        return Err(Error::invalid_binding(binding, "path is empty"));
    }

    let path = PathBuf::from(path);
    check_readable(&path).map_err(|e| Error::invalid_binding(binding, e))?;
    Ok(PlatformBinary { platform, path })
}

/// Parse every binding, rejecting an empty list and repeated platforms.
pub fn parse_bindings<S: AsRef<str>>(bindings: &[S]) -> Result<Vec<PlatformBinary>> {
    let binaries = bindings
        .iter()
        .map(|b| parse_binding(b.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    check_unique(&binaries)?;
    Ok(binaries)
}

fn check_readable(path: &Path) -> std::result::Result<(), String> {
    let metadata = std::fs::metadata(path).map_err(|e| format!("{}: {e}", path.display()))?;
    if !metadata.is_file() {
        return Err(format!("{} is not a file", path.display()));
    }
    std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(())
}

fn check_unique(binaries: &[PlatformBinary]) -> Result<()> {
    if binaries.is_empty() {
        return Err(Error::MissingBinding);
    }
    let mut seen = HashSet::new();
    for binary in binaries {
        if !seen.insert(&binary.platform) {
            return Err(Error::DuplicatePlatform(binary.platform.to_string()));
        }
    }
    Ok(())
}

/// Observer for push progress. Every method defaults to doing nothing.
pub trait PushProgress: Send + Sync {
    /// Platform `index` (1-based) of `total` is about to be pushed.
    fn platform_started(&self, _index: usize, _total: usize, _platform: &Platform) {}

    /// Platform `index` of `total` was published.
    fn platform_finished(&self, _index: usize, _total: usize, _platform: &Platform) {}

    /// Platform `index` of `total` failed; the push stops here.
    fn platform_failed(&self, _index: usize, _total: usize, _platform: &Platform, _error: &Error) {
    }

    /// The index was pushed and tagged.
    fn index_pushed(&self, _descriptor: &Descriptor) {}
}

impl PushProgress for () {}

/// Outcome of a successful push.
#[derive(Debug, Clone)]
pub struct PushReport {
    /// The tagged index.
    pub index: Descriptor,
    /// Platform manifests, in push order.
    pub manifests: Vec<Descriptor>,
}

impl PushReport {
    /// Number of binaries published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Whether nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

/// Build the blob, config and manifest for one binary and stage them.
///
/// Returns the manifest descriptor, carrying its platform.
pub fn stage_binary(store: &MemoryStore, platform: &Platform, data: &[u8]) -> Result<Descriptor> {
    let blob = Descriptor::from_bytes(media_type_for(&platform.os, &platform.arch), data)
        .with_title(platform.slot_name());
    let config = Descriptor::from_bytes(OCI_CONFIG_MEDIA_TYPE, EMPTY_CONFIG);

    let manifest_bytes = Manifest::for_binary(config.clone(), blob.clone()).to_bytes()?;
    let manifest = Descriptor::from_bytes(OCI_MANIFEST_MEDIA_TYPE, &manifest_bytes);

    store.stage(&blob, data)?;
    store.stage(&config, EMPTY_CONFIG)?;
    store.stage(&manifest, &manifest_bytes)?;

    Ok(manifest.with_platform(platform.clone()))
}

async fn push_binary(
    store: &MemoryStore,
    client: &dyn RegistryClient,
    reference: &Reference,
    binary: &PlatformBinary,
    cancel: &CancellationToken,
) -> Result<Descriptor> {
    let data = tokio::fs::read(&binary.path).await?;
    debug!(platform = %binary.platform, path = ?binary.path, size = data.len(), "Packaging binary");

    let manifest = stage_binary(store, &binary.platform, &data)?;
    copy_graph(store, client, reference, &manifest, cancel).await?;
    Ok(manifest)
}

/// Publish `binaries` under `reference` as a multi-platform index.
pub async fn push(
    client: &dyn RegistryClient,
    reference: &Reference,
    binaries: &[PlatformBinary],
    progress: &dyn PushProgress,
    cancel: &CancellationToken,
) -> Result<PushReport> {
    check_unique(binaries)?;

    let store = MemoryStore::new();
    let total = binaries.len();
    let mut manifests = Vec::with_capacity(total);

    for (i, binary) in binaries.iter().enumerate() {
        let platform = &binary.platform;
        progress.platform_started(i + 1, total, platform);

        match push_binary(&store, client, reference, binary, cancel).await {
            Ok(manifest) => {
                info!(%platform, digest = %manifest.digest, "Pushed platform manifest");
                progress.platform_finished(i + 1, total, platform);
                manifests.push(manifest);
            }
            Err(e) => {
                progress.platform_failed(i + 1, total, platform, &e);
                return Err(Error::push_failed(platform, e));
            }
        }
    }

    let index_bytes = Index::new(manifests.clone()).to_bytes()?;
    let index = Descriptor::from_bytes(OCI_INDEX_MEDIA_TYPE, &index_bytes);
    store.stage(&index, &index_bytes)?;
    copy_graph(&store, client, reference, &index, cancel).await?;

    let tag = reference.tag().unwrap_or("latest");
    with_cancel(cancel, client.tag(reference, &index, tag)).await?;
    info!(reference = %reference.whole(), digest = %index.digest, platforms = total, "Tagged index");
    progress.index_pushed(&index);

    Ok(PushReport { index, manifests })
}
