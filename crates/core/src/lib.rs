//! Multi-architecture binaries distributed through OCI registries.
//!
//! This crate provides functionality to:
//! - Package one binary per platform into an image index and publish it
//! - Resolve a tag to the binary for a given operating system and architecture
//! - Cache pulled binaries by registry, repository, tag and platform
//! - Execute a resolved binary, replacing the current process
//!
//! # Example
//!
//! ```ignore
//! use bincast_core::{Options, PullOptions, pull};
//! use tokio_util::sync::CancellationToken;
//!
//! let options = Options::default();
//! let reference = options.parse_reference("ghcr.io/acme/tool:v1")?;
//! let client = options.connect(&reference);
//!
//! let pull_options = PullOptions { cache: options.cache(), ..Default::default() };
//! let info = pull(&client, &reference, &pull_options, &CancellationToken::new()).await?;
//! println!("{}", info.path.display());
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod client;
pub mod credentials;
mod error;
pub mod exec;
pub mod manifest;
pub mod media_type;
pub mod ops;
pub mod package;
mod platform;
mod registry;
pub mod resolve;
mod store;

pub use cache::{BinaryCache, CacheEntry, CacheKey, CacheMetadata};
pub use client::{ContentStore, RegistryClient, copy_graph};
pub use credentials::{Credential, resolve_credentials};
pub use error::{Error, Result};
pub use exec::{ExecMode, execute};
pub use manifest::{Descriptor, Index, Manifest};
pub use media_type::media_type_for;
pub use ops::{
    BinaryInfo, Options, PullOptions, RunOptions, cached, fetch_or_cached, list, pull, push, run,
};
pub use package::{PlatformBinary, PushProgress, PushReport, parse_binding, parse_bindings};
pub use platform::{Platform, current_platform};
pub use registry::{DEFAULT_REGISTRY, OciRegistry, parse_reference};
pub use resolve::{LayerEntry, Listing, PlatformEntry};
pub use store::{MemoryRegistry, MemoryStore};

pub use oci_distribution::Reference;
