//! Library entry points for pull, run, list, push and cached.
//!
//! Each operation takes its configuration explicitly; nothing here reads
//! global state. The CLI builds an [`Options`] once per invocation and derives
//! the per-operation options from it.

use oci_distribution::Reference;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{BinaryCache, CacheEntry, CacheKey, make_executable};
use crate::client::RegistryClient;
use crate::credentials::{Credential, resolve_credentials};
use crate::exec::{ExecMode, execute};
use crate::package::{PlatformBinary, PushProgress, PushReport};
use crate::platform::{Platform, current_platform};
use crate::registry::{OciRegistry, parse_reference};
use crate::resolve::{Listing, fetch_binary, list_platforms, select_manifest};
use crate::{Error, Result};

/// Settings shared by every operation.
#[derive(Debug, Default)]
pub struct Options {
    /// Registry for references that do not name one.
    pub registry: Option<String>,
    /// Explicit registry username.
    pub username: Option<String>,
    /// Explicit registry password.
    pub password: Option<SecretString>,
    /// Talk plain HTTP to the registry.
    pub insecure: bool,
    /// Cache root, overriding the user cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Docker credential file, overriding the default location.
    pub docker_config: Option<PathBuf>,
}

impl Options {
    /// Parse `reference`, applying the default registry.
    pub fn parse_reference(&self, reference: &str) -> Result<Reference> {
        parse_reference(reference, self.registry.as_deref())
    }

    /// Credentials for `registry`, explicit first, then the credential file.
    #[must_use]
    pub fn credentials(&self, registry: &str) -> Option<Credential> {
        resolve_credentials(
            registry,
            self.username.as_deref(),
            self.password.as_ref(),
            self.docker_config.as_deref(),
        )
    }

    /// Registry client for the registry `reference` lives on.
    #[must_use]
    pub fn connect(&self, reference: &Reference) -> OciRegistry {
        let credential = self.credentials(reference.registry());
        debug!(
            registry = reference.registry(),
            authenticated = credential.is_some(),
            insecure = self.insecure,
            "Connecting to registry"
        );
        OciRegistry::new(self.insecure, credential.as_ref())
    }

    /// The binary cache.
    #[must_use]
    pub fn cache(&self) -> BinaryCache {
        self.cache_dir
            .clone()
            .map_or_else(BinaryCache::default, BinaryCache::new)
    }
}

/// Options for [`pull`].
#[derive(Debug, Clone)]
pub struct PullOptions {
    /// Platform to pull; the host when unset.
    pub platform: Option<Platform>,
    /// Where to write the binary.
    pub output: Option<PathBuf>,
    /// Also store the binary in the cache.
    pub use_cache: bool,
    /// The cache to use.
    pub cache: BinaryCache,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            platform: None,
            output: None,
            use_cache: true,
            cache: BinaryCache::default(),
        }
    }
}

/// Options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Platform to run; the host when unset.
    pub platform: Option<Platform>,
    /// Ignore an existing cached binary and download again.
    pub no_cache: bool,
    /// How to start the binary.
    pub mode: ExecMode,
    /// The cache to use.
    pub cache: BinaryCache,
}

/// A binary made available locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryInfo {
    /// Where the binary is.
    pub path: PathBuf,
    /// Digest of the manifest it came from.
    pub digest: String,
    /// Size in bytes.
    pub size: u64,
    /// Its platform.
    pub platform: Platform,
    /// Whether it was served from the cache.
    pub cached: bool,
}

/// Download the binary for a platform.
///
/// With an output path the binary is written there and the cache slot is
/// refreshed from it (failures there are only logged). Without one the cache
/// slot is the destination, so caching cannot be disabled.
pub async fn pull(
    client: &dyn RegistryClient,
    reference: &Reference,
    options: &PullOptions,
    cancel: &CancellationToken,
) -> Result<BinaryInfo> {
    if options.output.is_none() && !options.use_cache {
        return Err(Error::OutputRequired);
    }
    let platform = options.platform.clone().unwrap_or_else(current_platform);
    info!(reference = %reference.whole(), %platform, "Pulling binary");

    let manifest = select_manifest(client, reference, &platform, cancel).await?;
    let data = fetch_binary(client, reference, &manifest, cancel).await?;
    let key = CacheKey::for_reference(reference, platform.clone());

    let path = match &options.output {
        Some(output) => {
            write_output(output, &data).await?;
            if options.use_cache {
                if let Err(e) = options.cache.store_file(&key, output, &manifest.digest) {
                    warn!(error = %e, "Failed to refresh cache");
                }
            }
            output.clone()
        }
        None => options.cache.store(&key, &data, &manifest.digest)?,
    };

    info!(?path, digest = %manifest.digest, size = data.len(), "Pulled binary");
    Ok(BinaryInfo {
        path,
        digest: manifest.digest,
        size: data.len() as u64,
        platform,
        cached: false,
    })
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    make_executable(path)?;
    Ok(())
}

/// Make the binary for a platform available, downloading it on a cache miss.
///
/// A cache hit does not touch the registry at all.
pub async fn fetch_or_cached(
    client: &dyn RegistryClient,
    reference: &Reference,
    platform: Platform,
    cache: &BinaryCache,
    no_cache: bool,
    cancel: &CancellationToken,
) -> Result<BinaryInfo> {
    let key = CacheKey::for_reference(reference, platform.clone());

    if !no_cache {
        if let Some(path) = cache.probe(&key) {
            debug!(?path, "Using cached binary");
            let size = std::fs::metadata(&path)?.len();
            return Ok(BinaryInfo {
                path,
                digest: String::new(),
                size,
                platform,
                cached: true,
            });
        }
    }

    info!(reference = %reference.whole(), %platform, "Pulling binary into cache");
    let manifest = select_manifest(client, reference, &platform, cancel).await?;
    let data = fetch_binary(client, reference, &manifest, cancel).await?;
    let path = cache.store(&key, &data, &manifest.digest)?;
    Ok(BinaryInfo {
        path,
        digest: manifest.digest,
        size: data.len() as u64,
        platform,
        cached: false,
    })
}

/// Run the binary for a platform, from the cache when possible.
pub async fn run(
    client: &dyn RegistryClient,
    reference: &Reference,
    args: &[String],
    options: &RunOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let platform = options.platform.clone().unwrap_or_else(current_platform);
    let binary = fetch_or_cached(
        client,
        reference,
        platform,
        &options.cache,
        options.no_cache,
        cancel,
    )
    .await?;
    execute(&binary.path, args, options.mode).await
}

/// Describe what `reference` points at.
pub async fn list(
    client: &dyn RegistryClient,
    reference: &Reference,
    cancel: &CancellationToken,
) -> Result<Listing> {
    info!(reference = %reference.whole(), "Listing platforms");
    list_platforms(client, reference, cancel).await
}

/// Publish one binary per platform under `reference`.
pub async fn push(
    client: &dyn RegistryClient,
    reference: &Reference,
    binaries: &[PlatformBinary],
    progress: &dyn PushProgress,
    cancel: &CancellationToken,
) -> Result<PushReport> {
    info!(reference = %reference.whole(), binaries = binaries.len(), "Pushing binaries");
    crate::package::push(client, reference, binaries, progress, cancel).await
}

/// Every binary in the cache.
pub fn cached(cache: &BinaryCache) -> Result<Vec<CacheEntry>> {
    cache.list()
}
