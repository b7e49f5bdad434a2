//! OCI registry client backed by `oci-distribution`.
//!
//! Manifests and indexes are always moved as raw bytes so their digests stay
//! exactly what the packaging engine computed.

use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};
use reqwest::header::HeaderValue;
use secrecy::ExposeSecret;
use tracing::{debug, info, trace};

use crate::client::RegistryClient;
use crate::credentials::Credential;
use crate::manifest::{Descriptor, OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE, detect_media_type};
use crate::{Error, Result};

/// Registry used for references that do not name one.
pub const DEFAULT_REGISTRY: &str = "docker.io";

const MANIFEST_MEDIA_TYPES: &[&str] = &[OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE];

/// OCI registry client for resolving, pulling and pushing artifacts.
pub struct OciRegistry {
    client: Client,
    auth: RegistryAuth,
}

impl OciRegistry {
    /// Create a client. `insecure` talks plain HTTP.
    #[must_use]
    pub fn new(insecure: bool, credential: Option<&Credential>) -> Self {
        let config = ClientConfig {
            protocol: if insecure {
                ClientProtocol::Http
            } else {
                ClientProtocol::Https
            },
            ..Default::default()
        };
        let auth = match credential {
            Some(c) => RegistryAuth::Basic(c.username.clone(), c.password.expose_secret().to_string()),
            None => RegistryAuth::Anonymous,
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }

    async fn authenticate(&self, reference: &Reference, operation: RegistryOperation) -> Result<()> {
        self.client
            .auth(reference, &self.auth, operation)
            .await
            .map_err(|e| Error::registry("authenticate", e))?;
        Ok(())
    }

    async fn pull_manifest_bytes(&self, reference: &Reference) -> Result<(Vec<u8>, String)> {
        self.client
            .pull_manifest_raw(reference, &self.auth, MANIFEST_MEDIA_TYPES)
            .await
            .map_err(|e| Error::registry(format!("fetch manifest {}", reference.whole()), e))
    }
}

#[async_trait]
impl RegistryClient for OciRegistry {
    async fn resolve(&self, reference: &Reference) -> Result<Descriptor> {
        info!(reference = %reference.whole(), "Resolving reference");
        let (data, digest) = self.pull_manifest_bytes(reference).await?;
        let media_type = detect_media_type(&data)?;
        debug!(%digest, %media_type, size = data.len(), "Resolved reference");

        Ok(Descriptor {
            media_type,
            digest,
            size: data.len() as u64,
            annotations: None,
            platform: None,
        })
    }

    async fn fetch(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        debug!(digest = %descriptor.digest, media_type = %descriptor.media_type, "Fetching");
        let data = if descriptor.is_manifest() || descriptor.is_index() {
            let (data, _) = self
                .pull_manifest_bytes(&by_digest(reference, &descriptor.digest))
                .await?;
            data
        } else {
            self.authenticate(reference, RegistryOperation::Pull).await?;
            let mut data = Vec::with_capacity(usize::try_from(descriptor.size).unwrap_or(0));
            self.client
                .pull_blob(reference, &oci_descriptor(descriptor), &mut data)
                .await
                .map_err(|e| Error::registry(format!("fetch blob {}", descriptor.digest), e))?;
            data
        };

        descriptor.verify(&data)?;
        trace!(digest = %descriptor.digest, "Fetched and verified");
        Ok(data)
    }

    async fn exists(&self, reference: &Reference, descriptor: &Descriptor) -> Result<bool> {
        // Blob uploads are idempotent, so only manifests are probed.
        if !(descriptor.is_manifest() || descriptor.is_index()) {
            return Ok(false);
        }
        Ok(self
            .client
            .fetch_manifest_digest(&by_digest(reference, &descriptor.digest), &self.auth)
            .await
            .is_ok())
    }

    async fn push(
        &self,
        reference: &Reference,
        descriptor: &Descriptor,
        data: &[u8],
    ) -> Result<()> {
        self.authenticate(reference, RegistryOperation::Push).await?;
        if descriptor.is_manifest() || descriptor.is_index() {
            self.push_manifest(&by_digest(reference, &descriptor.digest), descriptor, data)
                .await
        } else {
            debug!(digest = %descriptor.digest, size = descriptor.size, "Pushing blob");
            self.client
                .push_blob(reference, data, &descriptor.digest)
                .await
                .map_err(|e| Error::registry(format!("push blob {}", descriptor.digest), e))?;
            Ok(())
        }
    }

    async fn tag(&self, reference: &Reference, descriptor: &Descriptor, tag: &str) -> Result<()> {
        let data = self.fetch(reference, descriptor).await?;
        let target = Reference::with_tag(
            reference.registry().to_string(),
            reference.repository().to_string(),
            tag.to_string(),
        );
        self.authenticate(&target, RegistryOperation::Push).await?;
        info!(reference = %target.whole(), digest = %descriptor.digest, "Tagging");
        self.push_manifest(&target, descriptor, &data).await
    }
}

impl OciRegistry {
    async fn push_manifest(
        &self,
        target: &Reference,
        descriptor: &Descriptor,
        data: &[u8],
    ) -> Result<()> {
        let content_type = HeaderValue::from_str(&descriptor.media_type)
            .map_err(|e| Error::registry("push manifest", e))?;
        debug!(reference = %target.whole(), "Pushing manifest");
        self.client
            .push_manifest_raw(target, data.to_vec(), content_type)
            .await
            .map_err(|e| Error::registry(format!("push manifest {}", descriptor.digest), e))?;
        Ok(())
    }
}

fn by_digest(reference: &Reference, digest: &str) -> Reference {
    Reference::with_digest(
        reference.registry().to_string(),
        reference.repository().to_string(),
        digest.to_string(),
    )
}

fn oci_descriptor(descriptor: &Descriptor) -> OciDescriptor {
    OciDescriptor {
        media_type: descriptor.media_type.clone(),
        digest: descriptor.digest.clone(),
        size: i64::try_from(descriptor.size).unwrap_or(i64::MAX),
        ..Default::default()
    }
}

/// Parse an artifact reference.
///
/// A first path component without `.` or `:` (other than `localhost`) is a
/// repository path, not a host, so `default_registry` (or Docker Hub) is
/// prepended.
pub fn parse_reference(reference: &str, default_registry: Option<&str>) -> Result<Reference> {
    let first = reference.split('/').next().unwrap_or_default();
    let has_host = reference.contains('/')
        && (first.contains('.') || first.contains(':') || first == "localhost");

    let qualified = if has_host {
        reference.to_string()
    } else {
        let registry = default_registry
            .map(|r| r.trim_end_matches('/'))
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGISTRY);
        format!("{registry}/{reference}")
    };

    qualified
        .parse()
        .map_err(|e: oci_distribution::ParseError| Error::invalid_reference(reference, e.to_string()))
}
