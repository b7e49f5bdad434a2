//! Registry credential resolution.
//!
//! Explicit credentials always win. Without them the Docker credential file
//! is consulted, trying the spellings a registry may have been logged in
//! under. Nothing in this module fails hard: any problem means "anonymous".

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const DOCKER_HUB_V1: &str = "https://index.docker.io/v1/";

/// Username and password for a registry.
pub struct Credential {
    /// Registry username.
    pub username: String,
    /// Registry password or token.
    pub password: SecretString,
}

impl Credential {
    /// Create a credential.
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Contents of a Docker `config.json`.
#[derive(Debug, Default, Deserialize)]
pub struct DockerConfig {
    /// Registry key to auth entry.
    #[serde(default)]
    pub auths: HashMap<String, DockerAuth>,
}

/// One `auths` entry.
#[derive(Debug, Default, Deserialize)]
pub struct DockerAuth {
    /// base64 of `user:pass`.
    #[serde(default)]
    pub auth: String,
}

impl DockerConfig {
    /// Load a config file, returning `None` when it is missing or malformed.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                trace!(?path, error = %e, "No credential file");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(config) => Some(config),
            Err(e) => {
                debug!(?path, error = %e, "Ignoring malformed credential file");
                None
            }
        }
    }

    /// Credential for `registry`, trying each candidate key in order.
    #[must_use]
    pub fn lookup(&self, registry: &str) -> Option<Credential> {
        candidate_keys(registry).iter().find_map(|key| {
            let entry = self.auths.get(key).filter(|a| !a.auth.is_empty())?;
            let credential = decode_auth(&entry.auth);
            if credential.is_none() {
                debug!(%key, "Skipping undecodable credential entry");
            }
            credential
        })
    }
}

/// Default location of the Docker credential file.
///
/// `$DOCKER_CONFIG/config.json` when set, otherwise `~/.docker/config.json`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
}

/// Resolve credentials for `registry`.
///
/// Both explicit values must be non-empty to be used. Otherwise the
/// credential file at `config_path` (or [`default_config_path`]) is probed.
#[must_use]
pub fn resolve_credentials(
    registry: &str,
    username: Option<&str>,
    password: Option<&SecretString>,
    config_path: Option<&Path>,
) -> Option<Credential> {
    if let (Some(user), Some(pass)) = (username, password) {
        if !user.is_empty() && !pass.expose_secret().is_empty() {
            trace!(%registry, "Using explicit credentials");
            return Some(Credential::new(
                user,
                SecretString::from(pass.expose_secret().to_string()),
            ));
        }
    }

    let path = config_path
        .map(Path::to_path_buf)
        .or_else(default_config_path)?;
    let credential = DockerConfig::load(&path)?.lookup(registry);
    if credential.is_some() {
        debug!(%registry, ?path, "Using credentials from credential file");
    }
    credential
}

/// Keys a registry may be stored under, most specific first.
#[must_use]
pub fn candidate_keys(registry: &str) -> Vec<String> {
    let mut keys = vec![
        registry.to_string(),
        normalize_registry(registry),
        format!("https://{registry}"),
        registry
            .strip_prefix("docker.io/")
            .unwrap_or(registry)
            .to_string(),
    ];

    if registry.contains("docker.io") {
        keys.extend([
            DOCKER_HUB_V1.to_string(),
            "index.docker.io".to_string(),
            "docker.io".to_string(),
        ]);
    }

    let mut seen = std::collections::HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));
    keys
}

fn normalize_registry(registry: &str) -> String {
    let host = registry
        .strip_prefix("https://")
        .or_else(|| registry.strip_prefix("http://"))
        .unwrap_or(registry);

    match host {
        "docker.io" | "index.docker.io" => DOCKER_HUB_V1.to_string(),
        other => other.to_string(),
    }
}

fn decode_auth(auth: &str) -> Option<Credential> {
    let decoded = STANDARD.decode(auth.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some(Credential::new(user, SecretString::from(pass.to_string())))
}
