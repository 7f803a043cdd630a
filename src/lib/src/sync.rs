//! The sync pipeline: manifest fetch, concurrent per-entry download pairs,
//! verification, and the admitted set handed back to the host.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::*;
use serde::Deserialize;
use tokio::runtime::Runtime;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::Config;
use crate::error::*;
use crate::fetch::Fetcher;
use crate::hkp::{KeyClient, SrvResolver};
use crate::keystore::{sig_path_for, KeyStore};

/// Fire-and-forget progress notifications for the host to surface.
pub trait ProgressSink: Send + Sync {
    fn accept(&self, message: &str);
}

/// Discards every message.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn accept(&self, _message: &str) {}
}

/// One manifest entry. The signature file is cached as `<name>.sig`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModEntry {
    /// Cache file name, unique within a manifest.
    pub name: String,
    /// URL of the artifact itself.
    pub file: String,
    /// URL of the detached signature of the artifact.
    pub sig: String,
}

/// Where the manifest for a sync cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    /// Fetched (or conditionally revalidated) from the remote side.
    Remote,
    /// The remote fetch failed and the previously cached manifest was
    /// reopened instead. Admitted artifacts may be outdated.
    CachedFallback,
    /// No manifest could be obtained at all.
    Unavailable,
}

/// The terminal value of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Local paths of every admitted artifact.
    pub admitted: Vec<PathBuf>,
    pub manifest: ManifestSource,
}

impl SyncReport {
    /// Whether the host should warn that the cycle ran degraded. This is
    /// the signal to surface as a non-fatal warning, not a reason to block
    /// startup.
    pub fn incomplete(&self) -> bool {
        self.manifest != ManifestSource::Remote
    }

    fn failed() -> Self {
        Self {
            admitted: vec![],
            manifest: ManifestSource::Unavailable,
        }
    }
}

struct Shared {
    fetcher: Fetcher,
    keystore: KeyStore,
    mod_dir: PathBuf,
    prefer_local_cache: bool,
    progress: Box<dyn ProgressSink>,
}

/// Orchestrates one sync cycle on an owned runtime.
///
/// Construction launches the pipeline immediately; [`SyncService::wait`]
/// is the blocking join the host calls when it needs the admitted paths.
/// There is no cancellation: a partially downloaded cache is fine to
/// abandon but not to interrupt mid-write.
pub struct SyncService {
    runtime: Runtime,
    task: Mutex<Option<JoinHandle<SyncReport>>>,
    report: OnceLock<SyncReport>,
    shared: Arc<Shared>,
    key_ring_path: PathBuf,
}

impl SyncService {
    /// Build the trust store and launch the pipeline.
    ///
    /// Fails when the manifest URL is not configured, the local key ring
    /// cannot be loaded, or the cache directory cannot be created.
    pub fn start(
        config: &Config,
        base_dir: &Path,
        progress: Box<dyn ProgressSink>,
    ) -> Result<Self, SyncError> {
        Self::start_with_resolver(config, base_dir, progress, None)
    }

    /// Same as [`SyncService::start`], with a service discovery resolver
    /// for the key servers when the environment provides one.
    pub fn start_with_resolver(
        config: &Config,
        base_dir: &Path,
        progress: Box<dyn ProgressSink>,
        resolver: Option<Box<dyn SrvResolver>>,
    ) -> Result<Self, SyncError> {
        if config.mod_list.is_empty() {
            return Err(SyncError::Config("modList URL is not configured".to_string()));
        }
        let mut client = KeyClient::new(config.timeout());
        if let Some(resolver) = resolver {
            client = client.with_resolver(resolver);
        }
        let key_ring_path = base_dir.join(&config.key_ring_path);
        let keystore = KeyStore::load(
            &key_ring_path,
            &config.key_servers,
            &config.key_ids,
            &client,
        )?;
        keystore.debug_dump();

        let mod_dir = base_dir.join(&config.mod_dir);
        fs::create_dir_all(&mod_dir)?;

        let shared = Arc::new(Shared {
            fetcher: Fetcher::new(config.timeout()),
            keystore,
            mod_dir,
            prefer_local_cache: config.prefer_local_cache,
            progress,
        });

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("modsync-worker")
            .build()?;
        let task = runtime.spawn(run_pipeline(
            shared.clone(),
            config.mod_list.clone(),
            base_dir.join(&config.local_mod_list),
        ));

        Ok(Self {
            runtime,
            task: Mutex::new(Some(task)),
            report: OnceLock::new(),
            shared,
            key_ring_path,
        })
    }

    /// Block until the pipeline settles and return its report. Subsequent
    /// calls return the memoized report without blocking.
    pub fn wait(&self) -> SyncReport {
        if let Some(report) = self.report.get() {
            return report.clone();
        }
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let report = match handle {
            Some(handle) => self.runtime.block_on(handle).unwrap_or_else(|e| {
                error!("Sync worker failed: {}", e);
                SyncReport::failed()
            }),
            None => return self.report.get().cloned().unwrap_or_else(SyncReport::failed),
        };
        self.report.get_or_init(|| report).clone()
    }

    /// Re-check a single cached artifact against its signature companion.
    pub fn is_valid(&self, mod_file: &Path) -> bool {
        self.shared
            .progress
            .accept(&format!("modsync: verifying {}", display_name(mod_file)));
        self.shared.keystore.verify_file(mod_file)
    }

    /// Deterministic teardown: joins the pipeline if needed and persists
    /// the merged trust store next to the rest of the local state.
    pub fn shutdown(self) {
        let _ = self.wait();
        self.shared.keystore.save(&self.key_ring_path);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn run_pipeline(
    shared: Arc<Shared>,
    manifest_url: String,
    manifest_cache: PathBuf,
) -> SyncReport {
    shared.progress.accept("modsync: fetching mod list");
    let (manifest_file, manifest_source) = {
        let shared = shared.clone();
        let url = manifest_url.clone();
        let cache = manifest_cache.clone();
        // The cache preference never applies here so the manifest is
        // always as fresh as the network allows
        let fetched =
            tokio::task::spawn_blocking(move || shared.fetcher.fetch(&url, &cache, false)).await;
        match flatten(fetched) {
            Ok(file) => (file, ManifestSource::Remote),
            Err(e) => {
                warn!(
                    "Failed to download mod list, will try using locally cached mod list instead. Mods may be outdated. ({})",
                    e
                );
                match File::open(&manifest_cache) {
                    Ok(file) => (file, ManifestSource::CachedFallback),
                    Err(e) => {
                        error!("Failed to open locally cached mod list: {}", e);
                        return SyncReport::failed();
                    }
                }
            }
        }
    };

    let parsed = tokio::task::spawn_blocking(move || {
        serde_json::from_reader::<_, Vec<ModEntry>>(BufReader::new(manifest_file))
            .map_err(|e| SyncError::Manifest(e.to_string()))
    })
    .await;
    let entries = match flatten(parsed) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Error parsing mod list: {}", e);
            return SyncReport::failed();
        }
    };
    debug!("Mod list contains {} entries", entries.len());

    let mut tasks = JoinSet::new();
    for entry in entries {
        let shared = shared.clone();
        tasks.spawn(async move { process_entry(shared, entry).await });
    }
    let mut admitted = vec![];
    while let Some(settled) = tasks.join_next().await {
        match settled {
            Ok(Some(path)) => admitted.push(path),
            Ok(None) => {}
            Err(e) => error!("Entry worker failed: {}", e),
        }
    }
    admitted.sort();
    SyncReport {
        admitted,
        manifest: manifest_source,
    }
}

/// Download one entry's artifact and signature concurrently, then verify.
/// Returns the artifact path when the entry is admitted.
async fn process_entry(shared: Arc<Shared>, entry: ModEntry) -> Option<PathBuf> {
    if entry.name.is_empty()
        || entry.name == ".."
        || entry.name.contains('/')
        || entry.name.contains('\\')
    {
        warn!("Mod name {:?} is not a plain file name, entry skipped", entry.name);
        return None;
    }
    let mod_path = shared.mod_dir.join(&entry.name);
    let sig_path = sig_path_for(&mod_path);
    shared
        .progress
        .accept(&format!("modsync: considering {}", entry.name));

    let artifact = {
        let shared = shared.clone();
        let src = entry.file.clone();
        let dst = mod_path.clone();
        tokio::task::spawn_blocking(move || {
            shared.fetcher.fetch(&src, &dst, shared.prefer_local_cache)
        })
    };
    let signature = {
        let shared = shared.clone();
        let src = entry.sig.clone();
        let dst = sig_path.clone();
        tokio::task::spawn_blocking(move || {
            shared.fetcher.fetch(&src, &dst, shared.prefer_local_cache)
        })
    };
    // Both halves of the pair must resolve before verification
    let artifact = flatten(artifact.await);
    let signature = flatten(signature.await);
    for (result, src, dst) in [
        (&artifact, &entry.file, &mod_path),
        (&signature, &entry.sig, &sig_path),
    ] {
        if let Err(e) = result {
            warn!("Failed to download {}: {}", src, e);
            debug!("Details: src = {}, dst = {}", src, dst.display());
        }
    }
    if artifact.is_err() || signature.is_err() {
        return None;
    }

    let verified = {
        let shared = shared.clone();
        let mod_path = mod_path.clone();
        tokio::task::spawn_blocking(move || {
            shared
                .progress
                .accept(&format!("modsync: verifying {}", entry.name));
            shared.keystore.verify_file(&mod_path)
        })
    };
    match verified.await {
        Ok(true) => {
            debug!("Verification pass for {}", display_name(&mod_path));
            Some(mod_path)
        }
        Ok(false) => {
            warn!(
                "Verification fail for {}, will be excluded from loading",
                display_name(&mod_path)
            );
            // Drop the untrusted bytes so the next cycle downloads fresh
            // copies instead of keeping them around
            for path in [&mod_path, &sig_path] {
                if let Err(e) = fs::remove_file(path) {
                    debug!("Failed to delete {}: {}", path.display(), e);
                }
            }
            None
        }
        Err(e) => {
            error!("Verification worker failed: {}", e);
            None
        }
    }
}

fn flatten<T>(joined: Result<Result<T, SyncError>, tokio::task::JoinError>) -> Result<T, SyncError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(SyncError::Internal(format!("worker task failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_incomplete() {
        let report = SyncReport {
            admitted: vec![],
            manifest: ManifestSource::Remote,
        };
        assert!(!report.incomplete());
        let report = SyncReport {
            admitted: vec![],
            manifest: ManifestSource::CachedFallback,
        };
        assert!(report.incomplete());
        assert!(SyncReport::failed().incomplete());
    }

    #[test]
    fn test_manifest_entry_json_shape() {
        let entries: Vec<ModEntry> = serde_json::from_str(
            r#"[{"name":"a.jar","file":"http://x/a.jar","sig":"http://x/a.jar.sig"}]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.jar");
        assert_eq!(entries[0].sig, "http://x/a.jar.sig");
    }

    #[test]
    fn test_progress_sink_records_messages() {
        struct Recorder(std::sync::Mutex<Vec<String>>);
        impl ProgressSink for Recorder {
            fn accept(&self, message: &str) {
                self.0.lock().unwrap().push(message.to_string());
            }
        }
        let sink = Recorder(std::sync::Mutex::new(vec![]));
        sink.accept("one");
        sink.accept("two");
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_start_requires_manifest_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let result = SyncService::start(&config, dir.path(), Box::new(NullProgress));
        assert!(matches!(result.unwrap_err(), SyncError::Config(_)));
    }

    #[test]
    fn test_start_requires_key_ring() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            mod_list: "http://127.0.0.1:9/mods.json".to_string(),
            ..Config::default()
        };
        // No pub_key.asc in the base directory
        let result = SyncService::start(&config, dir.path(), Box::new(NullProgress));
        assert!(matches!(result.unwrap_err(), SyncError::KeyRing(_)));
    }
}
