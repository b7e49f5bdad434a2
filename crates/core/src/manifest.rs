//! OCI descriptors, image manifests and image indexes.
//!
//! Every descriptor is derived from the exact bytes it refers to: manifests
//! and indexes are serialized once with [`Manifest::to_bytes`] /
//! [`Index::to_bytes`] and those same bytes are hashed, pushed and tagged.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::platform::Platform;
use crate::{Error, Result};

/// OCI image manifest media type.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index media type.
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
/// OCI image config media type.
pub const OCI_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
/// Annotation holding a human readable title for a layer.
pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// Placeholder config shared by every manifest we produce.
pub const EMPTY_CONFIG: &[u8] = b"{}";

/// Compute the digest of a byte sequence in OCI format: `sha256:<hex>`.
#[must_use]
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{:x}", hasher.finalize())
}

/// A content reference: media type, digest and size of a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,
    /// Digest of the referenced bytes.
    pub digest: String,
    /// Size of the referenced bytes.
    pub size: u64,
    /// Arbitrary annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    /// Platform a manifest targets (index entries only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    /// Describe `data` under `media_type`.
    #[must_use]
    pub fn from_bytes(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: sha256_digest(data),
            size: data.len() as u64,
            annotations: None,
            platform: None,
        }
    }

    /// Attach a title annotation.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(TITLE_ANNOTATION.to_string(), title.into());
        self
    }

    /// Attach a platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Title annotation, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(TITLE_ANNOTATION))
            .map(String::as_str)
    }

    /// Whether the descriptor points at an image manifest.
    #[must_use]
    pub fn is_manifest(&self) -> bool {
        self.media_type == OCI_MANIFEST_MEDIA_TYPE
    }

    /// Whether the descriptor points at an image index.
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.media_type == OCI_INDEX_MEDIA_TYPE
    }

    /// Check that `data` is exactly what this descriptor refers to.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = sha256_digest(data);
        if actual != self.digest {
            return Err(Error::digest_mismatch(&self.digest, actual));
        }
        if data.len() as u64 != self.size {
            return Err(Error::digest_mismatch(
                format!("{} ({} bytes)", self.digest, self.size),
                format!("{actual} ({} bytes)", data.len()),
            ));
        }
        Ok(())
    }
}

/// An OCI image manifest: one config plus ordered layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always 2.
    pub schema_version: u32,
    /// Manifest media type (optional on foreign manifests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Config blob.
    pub config: Descriptor,
    /// Content layers. The first one is the binary.
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    /// Manifest wrapping a single binary layer.
    #[must_use]
    pub fn for_binary(config: Descriptor, binary: Descriptor) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
            config,
            layers: vec![binary],
        }
    }

    /// Parse a manifest.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Serialize the manifest. Descriptors must be computed over these bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An OCI image index: one manifest descriptor per platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Always 2.
    pub schema_version: u32,
    /// Index media type (optional on foreign indexes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Platform manifests.
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

impl Index {
    /// Index over the given platform manifests, in order.
    #[must_use]
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(OCI_INDEX_MEDIA_TYPE.to_string()),
            manifests,
        }
    }

    /// Parse an index.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Serialize the index. Descriptors must be computed over these bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// First manifest whose platform matches exactly.
    #[must_use]
    pub fn find(&self, platform: &Platform) -> Option<&Descriptor> {
        self.manifests
            .iter()
            .find(|m| m.platform.as_ref() == Some(platform))
    }
}

/// Media type of a manifest-like JSON document.
///
/// Uses the `mediaType` field when present and otherwise infers it from the
/// shape of the document, as registries do for schema 2 content.
pub fn detect_media_type(data: &[u8]) -> Result<String> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Probe {
        media_type: Option<String>,
        manifests: Option<serde_json::Value>,
        layers: Option<serde_json::Value>,
    }

    let probe: Probe = serde_json::from_slice(data)?;
    Ok(match probe {
        Probe {
            media_type: Some(media_type),
            ..
        } => media_type,
        Probe {
            manifests: Some(_), ..
        } => OCI_INDEX_MEDIA_TYPE.to_string(),
        Probe { layers: Some(_), .. } => OCI_MANIFEST_MEDIA_TYPE.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_digest_known_values() {
        assert_eq!(
            sha256_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_digest(b"hello"),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_empty_config_descriptor() {
        let config = Descriptor::from_bytes(OCI_CONFIG_MEDIA_TYPE, EMPTY_CONFIG);
        assert_eq!(config.size, 2);
        assert_eq!(
            config.digest,
            "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_descriptor_verify() {
        let desc = Descriptor::from_bytes("application/octet-stream", b"TEST");
        assert!(desc.verify(b"TEST").is_ok());
        assert!(matches!(
            desc.verify(b"TEX2"),
            Err(Error::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_manifest_descriptor_matches_serialized_bytes() {
        let config = Descriptor::from_bytes(OCI_CONFIG_MEDIA_TYPE, EMPTY_CONFIG);
        let layer = Descriptor::from_bytes("application/vnd.bincast.elf.v1", b"TEST")
            .with_title("linux-amd64");
        let manifest = Manifest::for_binary(config, layer);
        let bytes = manifest.to_bytes().unwrap();

        let desc = Descriptor::from_bytes(OCI_MANIFEST_MEDIA_TYPE, &bytes);
        assert!(desc.verify(&bytes).is_ok());

        let parsed = Manifest::from_slice(&bytes).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.layers[0].title(), Some("linux-amd64"));
    }

    #[test]
    fn test_manifest_json_shape() {
        let config = Descriptor::from_bytes(OCI_CONFIG_MEDIA_TYPE, EMPTY_CONFIG);
        let layer = Descriptor::from_bytes("x", b"TEST").with_title("linux-amd64");
        let json: serde_json::Value =
            serde_json::from_slice(&Manifest::for_binary(config, layer).to_bytes().unwrap())
                .unwrap();

        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], OCI_MANIFEST_MEDIA_TYPE);
        assert_eq!(json["config"]["size"], 2);
        assert_eq!(
            json["layers"][0]["annotations"][TITLE_ANNOTATION],
            "linux-amd64"
        );
        assert!(json["layers"][0].get("platform").is_none());
    }

    #[test]
    fn test_index_find_first_match_wins() {
        let a = Descriptor::from_bytes(OCI_MANIFEST_MEDIA_TYPE, b"a")
            .with_platform(Platform::new("linux", "amd64"));
        let b = Descriptor::from_bytes(OCI_MANIFEST_MEDIA_TYPE, b"b")
            .with_platform(Platform::new("linux", "amd64"));
        let c = Descriptor::from_bytes(OCI_MANIFEST_MEDIA_TYPE, b"c")
            .with_platform(Platform::new("linux", "arm64"));
        let index = Index::new(vec![a.clone(), b, c.clone()]);

        assert_eq!(index.find(&Platform::new("linux", "amd64")), Some(&a));
        assert_eq!(index.find(&Platform::new("linux", "arm64")), Some(&c));
        assert_eq!(index.find(&Platform::new("darwin", "arm64")), None);
    }

    #[test]
    fn test_index_entries_carry_platform() {
        let m = Descriptor::from_bytes(OCI_MANIFEST_MEDIA_TYPE, b"m")
            .with_platform(Platform::new("darwin", "arm64"));
        let json: serde_json::Value =
            serde_json::from_slice(&Index::new(vec![m]).to_bytes().unwrap()).unwrap();

        assert_eq!(json["mediaType"], OCI_INDEX_MEDIA_TYPE);
        assert_eq!(json["manifests"][0]["platform"]["os"], "darwin");
        assert_eq!(json["manifests"][0]["platform"]["architecture"], "arm64");
    }

    #[test]
    fn test_detect_media_type() {
        assert_eq!(
            detect_media_type(br#"{"mediaType":"application/x-custom"}"#).unwrap(),
            "application/x-custom"
        );
        assert_eq!(
            detect_media_type(br#"{"schemaVersion":2,"manifests":[]}"#).unwrap(),
            OCI_INDEX_MEDIA_TYPE
        );
        assert_eq!(
            detect_media_type(br#"{"schemaVersion":2,"config":{},"layers":[]}"#).unwrap(),
            OCI_MANIFEST_MEDIA_TYPE
        );
        assert_eq!(detect_media_type(br#"{"schemaVersion":2}"#).unwrap(), "");
        assert!(detect_media_type(b"not json").is_err());
    }

    #[test]
    fn test_parse_foreign_manifest_without_media_type() {
        let data = br#"{
            "schemaVersion": 2,
            "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:aa", "size": 2},
            "layers": []
        }"#;
        let manifest = Manifest::from_slice(data).unwrap();
        assert!(manifest.media_type.is_none());
        assert!(manifest.layers.is_empty());
    }
}
