//! Platform selection for pull and run, plus artifact listing.

use oci_distribution::Reference;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{RegistryClient, with_cancel};
use crate::manifest::{Descriptor, Index, Manifest};
use crate::platform::Platform;
use crate::{Error, Result};

/// Find the manifest to use for `platform`.
///
/// An index is scanned for the first entry whose platform matches exactly. A
/// lone manifest is returned as is: it is assumed to fit whatever platform
/// was asked for.
pub async fn select_manifest(
    client: &dyn RegistryClient,
    reference: &Reference,
    platform: &Platform,
    cancel: &CancellationToken,
) -> Result<Descriptor> {
    let root = with_cancel(cancel, client.resolve(reference)).await?;

    if root.is_index() {
        let data = with_cancel(cancel, client.fetch(reference, &root)).await?;
        let index = Index::from_slice(&data)?;
        debug!(entries = index.manifests.len(), %platform, "Scanning index");
        return index
            .find(platform)
            .cloned()
            .ok_or_else(|| Error::platform_not_available(reference.whole(), platform));
    }

    if root.is_manifest() {
        debug!(digest = %root.digest, "Reference is a single manifest");
        return Ok(root);
    }

    Err(Error::UnsupportedMediaType(root.media_type))
}

/// Fetch a manifest's first layer and verify it against the layer digest.
pub async fn fetch_binary(
    client: &dyn RegistryClient,
    reference: &Reference,
    manifest: &Descriptor,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let data = with_cancel(cancel, client.fetch(reference, manifest)).await?;
    let parsed = Manifest::from_slice(&data)?;
    let layer = parsed
        .layers
        .first()
        .ok_or_else(|| Error::EmptyManifest(manifest.digest.clone()))?;

    info!(digest = %layer.digest, size = layer.size, "Downloading binary");
    let binary = with_cancel(cancel, client.fetch(reference, layer)).await?;
    layer.verify(&binary)?;
    Ok(binary)
}

/// One platform entry of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEntry {
    /// Platform of the manifest.
    pub platform: Platform,
    /// Manifest digest.
    pub digest: String,
    /// Manifest size in bytes.
    pub size: u64,
}

/// One layer of a single manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerEntry {
    /// Layer digest.
    pub digest: String,
    /// Layer size in bytes.
    pub size: u64,
    /// Layer media type.
    pub media_type: String,
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// A multi-platform index.
    Index(Vec<PlatformEntry>),
    /// A single manifest.
    Manifest {
        /// Platform, when the descriptor carries one.
        platform: Option<Platform>,
        /// Manifest layers in order.
        layers: Vec<LayerEntry>,
    },
    /// Anything else, by media type.
    Unknown(String),
}

/// Describe the platforms available under `reference`.
///
/// Index entries without a platform are left out.
pub async fn list_platforms(
    client: &dyn RegistryClient,
    reference: &Reference,
    cancel: &CancellationToken,
) -> Result<Listing> {
    let root = with_cancel(cancel, client.resolve(reference)).await?;

    if root.is_index() {
        let data = with_cancel(cancel, client.fetch(reference, &root)).await?;
        let entries = Index::from_slice(&data)?
            .manifests
            .into_iter()
            .filter_map(|m| {
                Some(PlatformEntry {
                    platform: m.platform?,
                    digest: m.digest,
                    size: m.size,
                })
            })
            .collect();
        return Ok(Listing::Index(entries));
    }

    if root.is_manifest() {
        let data = with_cancel(cancel, client.fetch(reference, &root)).await?;
        let layers = Manifest::from_slice(&data)?
            .layers
            .into_iter()
            .map(|l| LayerEntry {
                digest: l.digest,
                size: l.size,
                media_type: l.media_type,
            })
            .collect();
        return Ok(Listing::Manifest {
            platform: root.platform,
            layers,
        });
    }

    Ok(Listing::Unknown(root.media_type))
}
