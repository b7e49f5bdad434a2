//! In-memory content stores.
//!
//! [`MemoryStore`] stages a push graph before it is copied to a registry.
//! [`MemoryRegistry`] is a complete in-process registry for tests.

use async_trait::async_trait;
use oci_distribution::Reference;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::trace;

use crate::client::{ContentStore, RegistryClient};
use crate::manifest::Descriptor;
use crate::{Error, Result};

/// Digest-addressed staging area for content about to be pushed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    content: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add content. Fails with [`Error::AlreadyExists`] when the digest is present.
    pub fn push(&self, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        descriptor.verify(data)?;
        let mut content = self
            .content
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if content.contains_key(&descriptor.digest) {
            return Err(Error::AlreadyExists(descriptor.digest.clone()));
        }
        content.insert(descriptor.digest.clone(), data.to_vec());
        Ok(())
    }

    /// Add content, treating an existing digest as success.
    pub fn stage(&self, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        match self.push(descriptor, data) {
            Err(e) if e.is_already_exists() => Ok(()),
            other => other,
        }
    }

    /// Whether the digest is present.
    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(digest)
    }
}

impl ContentStore for MemoryStore {
    fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&descriptor.digest)
            .cloned()
            .ok_or_else(|| Error::NotFound(descriptor.digest.clone()))
    }
}

#[derive(Debug, Default)]
struct Repository {
    content: HashMap<String, (Descriptor, Vec<u8>)>,
    tags: HashMap<String, Descriptor>,
}

/// A registry that lives entirely in memory.
///
/// Every read (`resolve`, `fetch`, `exists`) is counted so callers can assert
/// that a code path never touched the registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    repositories: RwLock<HashMap<String, Repository>>,
    reads: AtomicUsize,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read operations served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Whether the repository of `reference` holds content with `digest`.
    #[must_use]
    pub fn contains(&self, reference: &Reference, digest: &str) -> bool {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&repository_key(reference))
            .is_some_and(|repo| repo.content.contains_key(digest))
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

fn repository_key(reference: &Reference) -> String {
    format!("{}/{}", reference.registry(), reference.repository())
}

fn plain(descriptor: &Descriptor) -> Descriptor {
    Descriptor {
        media_type: descriptor.media_type.clone(),
        digest: descriptor.digest.clone(),
        size: descriptor.size,
        annotations: None,
        platform: None,
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn resolve(&self, reference: &Reference) -> Result<Descriptor> {
        self.count_read();
        let repositories = self
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let repo = repositories
            .get(&repository_key(reference))
            .ok_or_else(|| Error::NotFound(reference.whole()))?;

        let found = match reference.digest() {
            Some(digest) => repo.content.get(digest).map(|(desc, _)| desc),
            None => repo.tags.get(reference.tag().unwrap_or("latest")),
        };
        found
            .cloned()
            .ok_or_else(|| Error::NotFound(reference.whole()))
    }

    async fn fetch(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.count_read();
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&repository_key(reference))
            .and_then(|repo| repo.content.get(&descriptor.digest))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| Error::NotFound(descriptor.digest.clone()))
    }

    async fn exists(&self, reference: &Reference, descriptor: &Descriptor) -> Result<bool> {
        self.count_read();
        Ok(self.contains(reference, &descriptor.digest))
    }

    async fn push(
        &self,
        reference: &Reference,
        descriptor: &Descriptor,
        data: &[u8],
    ) -> Result<()> {
        descriptor.verify(data)?;
        trace!(digest = %descriptor.digest, repository = reference.repository(), "Storing content");
        self.repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(repository_key(reference))
            .or_default()
            .content
            .insert(
                descriptor.digest.clone(),
                (plain(descriptor), data.to_vec()),
            );
        Ok(())
    }

    async fn tag(&self, reference: &Reference, descriptor: &Descriptor, tag: &str) -> Result<()> {
        let mut repositories = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let repo = repositories
            .get_mut(&repository_key(reference))
            .ok_or_else(|| Error::NotFound(descriptor.digest.clone()))?;
        let target = repo
            .content
            .get(&descriptor.digest)
            .map(|(desc, _)| desc.clone())
            .ok_or_else(|| Error::NotFound(descriptor.digest.clone()))?;
        repo.tags.insert(tag.to_string(), target);
        Ok(())
    }
}
