//! Registry client abstraction.
//!
//! Everything that talks to a registry goes through [`RegistryClient`], so the
//! packaging engine and resolver work the same against a real registry
//! ([`crate::OciRegistry`]) and an in-process one ([`crate::MemoryRegistry`]).

use async_trait::async_trait;
use oci_distribution::Reference;
use std::collections::HashSet;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::manifest::{Descriptor, Index, Manifest};
use crate::{Error, Result};

/// Primitive registry operations, scoped by the repository of `reference`.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve a tag or digest reference to the descriptor of its root manifest or index.
    async fn resolve(&self, reference: &Reference) -> Result<Descriptor>;

    /// Fetch the bytes a descriptor refers to.
    async fn fetch(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>>;

    /// Whether the content a descriptor refers to is already present.
    async fn exists(&self, reference: &Reference, descriptor: &Descriptor) -> Result<bool>;

    /// Upload content. Manifests and indexes are stored by digest, untagged.
    async fn push(&self, reference: &Reference, descriptor: &Descriptor, data: &[u8])
    -> Result<()>;

    /// Point `tag` at an already pushed manifest or index.
    async fn tag(&self, reference: &Reference, descriptor: &Descriptor, tag: &str) -> Result<()>;
}

/// Local content addressed by descriptor, used as the source of [`copy_graph`].
pub trait ContentStore: Send + Sync {
    /// Bytes for a descriptor.
    fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>>;
}

/// Run a registry call unless `cancel` fires first.
pub async fn with_cancel<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = operation => result,
    }
}

/// Descriptors directly referenced by a manifest or index.
pub fn successors(descriptor: &Descriptor, data: &[u8]) -> Result<Vec<Descriptor>> {
    if descriptor.is_index() {
        return Ok(Index::from_slice(data)?.manifests);
    }
    if descriptor.is_manifest() {
        let manifest = Manifest::from_slice(data)?;
        let mut nodes = Vec::with_capacity(manifest.layers.len() + 1);
        nodes.push(manifest.config);
        nodes.extend(manifest.layers);
        return Ok(nodes);
    }
    Ok(Vec::new())
}

/// Push every node reachable from `root` that the registry does not have yet.
///
/// Children are pushed before their parents so a manifest never lands ahead of
/// its blobs. A subtree whose root already exists is skipped entirely, and
/// "already exists" responses count as success.
pub async fn copy_graph(
    source: &dyn ContentStore,
    client: &dyn RegistryClient,
    reference: &Reference,
    root: &Descriptor,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut stack = vec![(root.clone(), false)];
    let mut done: HashSet<String> = HashSet::new();

    while let Some((node, expanded)) = stack.pop() {
        if done.contains(&node.digest) {
            continue;
        }

        if expanded {
            let data = source.fetch(&node)?;
            match with_cancel(cancel, client.push(reference, &node, &data)).await {
                Ok(()) => trace!(digest = %node.digest, "Pushed"),
                Err(e) if e.is_already_exists() => trace!(digest = %node.digest, "Already pushed"),
                Err(e) => return Err(e),
            }
            done.insert(node.digest.clone());
            continue;
        }

        if with_cancel(cancel, client.exists(reference, &node)).await? {
            trace!(digest = %node.digest, "Already present, skipping subtree");
            done.insert(node.digest.clone());
            continue;
        }

        let data = source.fetch(&node)?;
        let children = successors(&node, &data)?;
        stack.push((node, true));
        for child in children.into_iter().rev() {
            stack.push((child, false));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{EMPTY_CONFIG, OCI_CONFIG_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};

    #[test]
    fn test_successors_of_manifest() {
        let config = Descriptor::from_bytes(OCI_CONFIG_MEDIA_TYPE, EMPTY_CONFIG);
        let layer = Descriptor::from_bytes("application/vnd.bincast.elf.v1", b"TEST");
        let data = Manifest::for_binary(config.clone(), layer.clone())
            .to_bytes()
            .unwrap();
        let desc = Descriptor::from_bytes(OCI_MANIFEST_MEDIA_TYPE, &data);

        assert_eq!(successors(&desc, &data).unwrap(), vec![config, layer]);
    }

    #[test]
    fn test_successors_of_blob_is_empty() {
        let blob = Descriptor::from_bytes("application/vnd.bincast.elf.v1", b"TEST");
        assert!(successors(&blob, b"TEST").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_with_cancel_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = with_cancel(&cancel, async { Ok(1) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_with_cancel_passes_result_through() {
        let cancel = CancellationToken::new();
        let result = with_cancel(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(result, 7);
    }
}
