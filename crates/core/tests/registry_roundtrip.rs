//! End-to-end tests of push, list, pull and run against an in-process registry.

use async_trait::async_trait;
use bincast_core::manifest::{EMPTY_CONFIG, OCI_CONFIG_MEDIA_TYPE};
use bincast_core::{
    BinaryCache, CacheKey, Descriptor, Error, ExecMode, Listing, MemoryRegistry, MemoryStore,
    Options, Platform, PlatformBinary, PullOptions, PushProgress, Reference, RegistryClient,
    Result, RunOptions, copy_graph, list, pull, push, run,
};
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn reference(s: &str) -> Reference {
    s.parse().unwrap()
}

fn binary(dir: &TempDir, name: &str, data: &[u8], os: &str, arch: &str) -> PlatformBinary {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    PlatformBinary {
        platform: Platform::new(os, arch),
        path,
    }
}

fn pull_options(cache: &TempDir, platform: Platform, output: Option<PathBuf>) -> PullOptions {
    PullOptions {
        platform: Some(platform),
        output,
        use_cache: true,
        cache: BinaryCache::new(cache.path().to_path_buf()),
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl PushProgress for Recorder {
    fn platform_started(&self, index: usize, total: usize, platform: &Platform) {
        self.0
            .lock()
            .unwrap()
            .push(format!("[{index}/{total}] {platform}"));
    }

    fn platform_finished(&self, _index: usize, _total: usize, platform: &Platform) {
        self.0.lock().unwrap().push(format!("done {platform}"));
    }

    fn platform_failed(&self, _index: usize, _total: usize, platform: &Platform, _error: &Error) {
        self.0.lock().unwrap().push(format!("failed {platform}"));
    }
}

#[tokio::test]
async fn test_push_list_pull_roundtrip() {
    let dir = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let registry = MemoryRegistry::new();
    let r = reference("localhost:5000/myrepo:v1");
    let cancel = CancellationToken::new();

    let binaries = vec![
        binary(&dir, "amd64", b"TEST", "linux", "amd64"),
        binary(&dir, "arm64", b"TEX2", "linux", "arm64"),
    ];
    let recorder = Recorder::default();
    let report = push(&registry, &r, &binaries, &recorder, &cancel)
        .await
        .unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec![
            "[1/2] linux/amd64",
            "done linux/amd64",
            "[2/2] linux/arm64",
            "done linux/arm64"
        ]
    );

    match list(&registry, &r, &cancel).await.unwrap() {
        Listing::Index(entries) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].platform, Platform::new("linux", "amd64"));
            assert_eq!(entries[1].platform, Platform::new("linux", "arm64"));
            assert_eq!(entries[0].digest, report.manifests[0].digest);
        }
        other => panic!("expected an index, got {other:?}"),
    }

    for (platform, expected) in [
        (Platform::new("linux", "amd64"), b"TEST"),
        (Platform::new("linux", "arm64"), b"TEX2"),
    ] {
        let info = pull(
            &registry,
            &r,
            &pull_options(&cache, platform.clone(), None),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&info.path).unwrap(), expected);
        assert_eq!(info.size, 4);
        assert_eq!(info.platform, platform);
        assert!(!info.cached);
    }
}

#[tokio::test]
async fn test_pull_missing_platform() {
    let dir = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let registry = MemoryRegistry::new();
    let r = reference("localhost:5000/myrepo:v1");
    let cancel = CancellationToken::new();

    let binaries = vec![binary(&dir, "amd64", b"TEST", "linux", "amd64")];
    push(&registry, &r, &binaries, &(), &cancel).await.unwrap();

    let err = pull(
        &registry,
        &r,
        &pull_options(&cache, Platform::new("darwin", "arm64"), None),
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::PlatformNotAvailable { platform, .. } if platform == "darwin/arm64"));
    assert!(bincast_core::cached(&BinaryCache::new(cache.path().to_path_buf()))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_single_manifest_served_for_any_platform() {
    let registry = MemoryRegistry::new();
    let cache = TempDir::new().unwrap();
    let r = reference("localhost:5000/single:v1");
    let cancel = CancellationToken::new();

    let store = MemoryStore::new();
    let manifest =
        bincast_core::package::stage_binary(&store, &Platform::new("linux", "amd64"), b"ONLY")
            .unwrap();
    copy_graph(&store, &registry, &r, &manifest, &cancel)
        .await
        .unwrap();
    registry.tag(&r, &manifest, "v1").await.unwrap();

    let info = pull(
        &registry,
        &r,
        &pull_options(&cache, Platform::new("windows", "arm64"), None),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(std::fs::read(info.path).unwrap(), b"ONLY");
    assert_eq!(info.digest, manifest.digest);

    match list(&registry, &r, &cancel).await.unwrap() {
        Listing::Manifest { layers, .. } => assert_eq!(layers.len(), 1),
        other => panic!("expected a manifest, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pull_with_output_refreshes_cache() {
    let dir = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let registry = MemoryRegistry::new();
    let r = reference("localhost:5000/myrepo:v1");
    let cancel = CancellationToken::new();

    let binaries = vec![binary(&dir, "amd64", b"TEST", "linux", "amd64")];
    let report = push(&registry, &r, &binaries, &(), &cancel).await.unwrap();

    let output = dir.path().join("out").join("tool");
    let platform = Platform::new("linux", "amd64");
    let info = pull(
        &registry,
        &r,
        &pull_options(&cache, platform.clone(), Some(output.clone())),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(info.path, output);
    assert_eq!(std::fs::read(&output).unwrap(), b"TEST");

    let entries = bincast_core::cached(&BinaryCache::new(cache.path().to_path_buf())).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metadata.tag, "v1");
    assert_eq!(entries[0].metadata.registry, "localhost_5000");
    assert_eq!(entries[0].metadata.digest, report.manifests[0].digest);
    assert_eq!(entries[0].platform(), platform);
}

#[tokio::test]
async fn test_repush_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let registry = MemoryRegistry::new();
    let r = reference("localhost:5000/myrepo:v1");
    let cancel = CancellationToken::new();

    let binaries = vec![
        binary(&dir, "amd64", b"TEST", "linux", "amd64"),
        binary(&dir, "arm64", b"TEX2", "linux", "arm64"),
    ];
    let first = push(&registry, &r, &binaries, &(), &cancel).await.unwrap();
    let second = push(&registry, &r, &binaries, &(), &cancel).await.unwrap();
    assert_eq!(first.index, second.index);
    assert_eq!(registry.resolve(&r).await.unwrap().digest, first.index.digest);
}

#[tokio::test]
async fn test_push_rejects_duplicate_platforms() {
    let dir = TempDir::new().unwrap();
    let registry = MemoryRegistry::new();
    let r = reference("localhost:5000/myrepo:v1");

    let binaries = vec![
        binary(&dir, "a", b"A", "linux", "amd64"),
        binary(&dir, "b", b"B", "linux", "amd64"),
    ];
    let err = push(&registry, &r, &binaries, &(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePlatform(_)));
    assert!(registry.resolve(&r).await.is_err());
}

/// Registry that refuses one blob digest.
struct FailingRegistry {
    inner: MemoryRegistry,
    refuse: String,
}

#[async_trait]
impl RegistryClient for FailingRegistry {
    async fn resolve(&self, reference: &Reference) -> Result<Descriptor> {
        self.inner.resolve(reference).await
    }

    async fn fetch(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.inner.fetch(reference, descriptor).await
    }

    async fn exists(&self, reference: &Reference, descriptor: &Descriptor) -> Result<bool> {
        self.inner.exists(reference, descriptor).await
    }

    async fn push(&self, reference: &Reference, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        if descriptor.digest == self.refuse {
            return Err(Error::registry("push blob", "denied: quota exceeded"));
        }
        self.inner.push(reference, descriptor, data).await
    }

    async fn tag(&self, reference: &Reference, descriptor: &Descriptor, tag: &str) -> Result<()> {
        self.inner.tag(reference, descriptor, tag).await
    }
}

#[tokio::test]
async fn test_partial_push_leaves_tag_untouched() {
    let dir = TempDir::new().unwrap();
    let r = reference("localhost:5000/myrepo:v1");
    let cancel = CancellationToken::new();
    let registry = FailingRegistry {
        inner: MemoryRegistry::new(),
        refuse: Descriptor::from_bytes("", b"THREE").digest,
    };

    let previous = push(
        &registry,
        &r,
        &[binary(&dir, "old", b"OLD", "linux", "amd64")],
        &(),
        &cancel,
    )
    .await
    .unwrap();

    let binaries = vec![
        binary(&dir, "one", b"ONE", "linux", "amd64"),
        binary(&dir, "two", b"TWO", "linux", "arm64"),
        binary(&dir, "three", b"THREE", "darwin", "arm64"),
    ];
    let recorder = Recorder::default();
    let err = push(&registry, &r, &binaries, &recorder, &cancel)
        .await
        .unwrap_err();
    assert!(
        err.to_string()
            .starts_with("Failed to push binary darwin/arm64"),
        "{err}"
    );
    assert_eq!(
        recorder.0.lock().unwrap().last().map(String::as_str),
        Some("failed darwin/arm64")
    );

    let tagged = registry.resolve(&r).await.unwrap();
    assert_eq!(tagged.digest, previous.index.digest);

    for data in [b"ONE".as_slice(), b"TWO".as_slice()] {
        let digest = Descriptor::from_bytes("", data).digest;
        assert!(registry.inner.contains(&r, &digest));
    }
    let refused = Descriptor::from_bytes("", b"THREE").digest;
    assert!(!registry.inner.contains(&r, &refused));
}

#[tokio::test]
async fn test_partial_push_without_prior_tag() {
    let dir = TempDir::new().unwrap();
    let r = reference("localhost:5000/fresh:v1");
    let registry = FailingRegistry {
        inner: MemoryRegistry::new(),
        refuse: Descriptor::from_bytes(OCI_CONFIG_MEDIA_TYPE, EMPTY_CONFIG).digest,
    };

    let binaries = vec![binary(&dir, "one", b"ONE", "linux", "amd64")];
    let err = push(&registry, &r, &binaries, &(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PushFailed { .. }));
    assert!(matches!(registry.resolve(&r).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_cancelled_push_publishes_nothing() {
    let dir = TempDir::new().unwrap();
    let registry = MemoryRegistry::new();
    let r = reference("localhost:5000/myrepo:v1");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let binaries = vec![binary(&dir, "amd64", b"TEST", "linux", "amd64")];
    let err = push(&registry, &r, &binaries, &(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PushFailed { cause, .. } if matches!(*cause, Error::Cancelled)));
    assert!(!registry.contains(&r, &Descriptor::from_bytes("", b"TEST").digest));
}

#[cfg(unix)]
mod run {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn run_options(cache: &TempDir, platform: Platform, no_cache: bool) -> RunOptions {
        RunOptions {
            platform: Some(platform),
            no_cache,
            mode: ExecMode::Spawn,
            cache: BinaryCache::new(cache.path().to_path_buf()),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_registry_calls() {
        let dir = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let registry = MemoryRegistry::new();
        let r = reference("localhost:5000/myrepo:v1");
        let platform = Platform::new("linux", "amd64");

        let marker = dir.path().join("ran");
        let tool = script(&dir, "tool", &format!("touch {}", marker.display()));
        let cache = BinaryCache::new(cache_dir.path().to_path_buf());
        cache
            .store_file(&CacheKey::for_reference(&r, platform.clone()), &tool, "sha256:seeded")
            .unwrap();

        run(
            &registry,
            &r,
            &[],
            &run_options(&cache_dir, platform, false),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(marker.exists());
        assert_eq!(registry.reads(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_pulls_then_hits() {
        let dir = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let registry = MemoryRegistry::new();
        let r = reference("localhost:5000/myrepo:v1");
        let cancel = CancellationToken::new();
        let platform = Platform::new("linux", "amd64");

        let out = dir.path().join("args");
        let tool = script(&dir, "tool", &format!("echo \"$@\" >> {}", out.display()));
        push(
            &registry,
            &r,
            &[PlatformBinary {
                platform: platform.clone(),
                path: tool,
            }],
            &(),
            &cancel,
        )
        .await
        .unwrap();

        let options = run_options(&cache_dir, platform.clone(), false);
        let args = vec!["hello".to_string(), "world".to_string()];
        run(&registry, &r, &args, &options, &cancel).await.unwrap();
        let reads = registry.reads();
        assert!(reads > 0);

        run(&registry, &r, &args, &options, &cancel).await.unwrap();
        assert_eq!(registry.reads(), reads);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "hello world\nhello world\n"
        );

        let bypass = run_options(&cache_dir, platform, true);
        run(&registry, &r, &args, &bypass, &cancel).await.unwrap();
        assert!(registry.reads() > reads);
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let registry = MemoryRegistry::new();
        let r = reference("localhost:5000/failing:v1");
        let platform = Platform::new("linux", "amd64");

        let tool = script(&dir, "tool", "exit 7");
        BinaryCache::new(cache_dir.path().to_path_buf())
            .store_file(&CacheKey::for_reference(&r, platform.clone()), &tool, "sha256:x")
            .unwrap();

        let err = run(
            &registry,
            &r,
            &[],
            &run_options(&cache_dir, platform, false),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NonZeroExit { code: 7 }));
    }
}

#[test]
fn test_options_prefer_explicit_credentials_over_file() {
    use base64::Engine;
    use secrecy::{ExposeSecret, SecretString};

    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    let auth = base64::engine::general_purpose::STANDARD.encode("file-user:file-pass");
    std::fs::write(
        &config,
        format!(r#"{{"auths":{{"localhost:5000":{{"auth":"{auth}"}}}}}}"#),
    )
    .unwrap();

    let explicit = Options {
        username: Some("cli-user".to_string()),
        password: Some(SecretString::from("cli-pass".to_string())),
        docker_config: Some(config.clone()),
        ..Default::default()
    };
    let credential = explicit.credentials("localhost:5000").unwrap();
    assert_eq!(credential.username, "cli-user");
    assert_eq!(credential.password.expose_secret(), "cli-pass");

    let ambient = Options {
        docker_config: Some(config),
        ..Default::default()
    };
    let credential = ambient.credentials("localhost:5000").unwrap();
    assert_eq!(credential.username, "file-user");
    assert_eq!(credential.password.expose_secret(), "file-pass");
}
