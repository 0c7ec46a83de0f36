use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::backoff::{Backoff, Deadline};
use crate::error::{Result, SyncError};

/// Trait for the shared medium carrying experiment state
///
/// Every entry is a named, level-triggered value scoped to an experiment. Once
/// written, an entry stays visible to every reader until it is removed, so a
/// reader that arrives late still observes it.
/// Implementations can use a local or shared filesystem, memory, or a network
/// service.
///
/// An experiment exists from the first write of an unprefixed key until it is
/// cleared. Writing a prefixed key such as `clients/c1` into an experiment that
/// does not exist fails with `ExperimentNotFound` and leaves the medium as it
/// was, so a late writer cannot resurrect a torn down experiment.
#[async_trait::async_trait]
pub trait SignalBoard: Send + Sync {
    /// Read an entry, `None` if it was never written or has been removed
    async fn get(&self, experiment_id: &str, key: &str) -> Result<Option<String>>;

    /// Write an entry, replacing any previous value
    async fn set(&self, experiment_id: &str, key: &str, value: &str) -> Result<()>;

    /// Attempt to create an entry atomically
    /// Returns true if the entry was created, false if it already existed
    async fn try_create(&self, experiment_id: &str, key: &str, value: &str) -> Result<bool>;

    /// Remove an entry; removing a missing entry is not an error
    async fn remove(&self, experiment_id: &str, key: &str) -> Result<()>;

    /// List the names of the entries directly under a prefix
    async fn list(&self, experiment_id: &str, prefix: &str) -> Result<Vec<String>>;

    /// Remove every entry of an experiment
    async fn clear(&self, experiment_id: &str) -> Result<()>;

    /// Human-readable location of the medium, used in log messages
    fn describe(&self) -> String;

    /// Block until an entry exists or the timeout elapses
    ///
    /// Never returns `TimedOut` before `timeout` has passed, and overshoots it
    /// by at most one poll interval. A timeout too large to represent waits
    /// indefinitely.
    async fn wait(
        &self,
        experiment_id: &str,
        key: &str,
        timeout: Duration,
        mut backoff: Backoff,
    ) -> Result<String> {
        let deadline = Deadline::after(timeout);

        loop {
            if let Some(value) = self.get(experiment_id, key).await? {
                return Ok(value);
            }

            if deadline.expired() {
                return Err(SyncError::TimedOut {
                    experiment_id: experiment_id.to_string(),
                    waiting_for: key.to_string(),
                    elapsed: deadline.elapsed(),
                });
            }

            tokio::time::sleep(deadline.cap(backoff.next_delay())).await;
        }
    }
}

/// Local filesystem implementation of SignalBoard
///
/// Works across processes, and across hosts when the root sits on a shared
/// filesystem. Writes go to a temporary file first and are then moved into
/// place, so readers never see a half-written entry.
/// Directory structure:
///   {root}/experiments/{experiment_id}/experiment.json
///   {root}/experiments/{experiment_id}/clients/{client_id}.json
///   {root}/experiments/{experiment_id}/withdrawn/{client_id}.json
///   {root}/experiments/{experiment_id}/signals/{start,stop}.json
#[derive(Debug)]
pub struct LocalSignalBoard {
    root: PathBuf,
}

impl LocalSignalBoard {
    /// Open a board rooted at the given directory, creating it if missing
    ///
    /// Fails with `SignalMediumUnavailable` if the directory cannot be created
    /// or written to.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let board = Self { root: root.into() };
        let experiments_dir = board.experiments_dir();

        fs::create_dir_all(&experiments_dir)
            .await
            .map_err(|e| unavailable(&experiments_dir, e))?;

        // Check write access now rather than on the first registration
        let check_file = experiments_dir.join(format!(".write-check-{}", Uuid::new_v4()));
        fs::write(&check_file, b"")
            .await
            .map_err(|e| unavailable(&experiments_dir, e))?;
        if let Err(e) = fs::remove_file(&check_file).await {
            debug!("Failed to remove write check file {}: {}", check_file.display(), e);
        }

        debug!("Opened signal board at {}", board.root.display());
        Ok(board)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the directory holding all experiments
    fn experiments_dir(&self) -> PathBuf {
        self.root.join("experiments")
    }

    /// Get the directory of one experiment
    fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.experiments_dir().join(experiment_id)
    }

    /// Get the directory a key prefix maps to
    fn prefix_dir(&self, experiment_id: &str, prefix: &str) -> PathBuf {
        let mut path = self.experiment_dir(experiment_id);
        path.extend(prefix.split('/'));
        path
    }

    /// Get the file path of an entry
    fn entry_path(&self, experiment_id: &str, key: &str) -> PathBuf {
        let (prefix, name) = match key.rsplit_once('/') {
            Some((prefix, name)) => (self.prefix_dir(experiment_id, prefix), name),
            None => (self.experiment_dir(experiment_id), key),
        };
        prefix.join(format!("{}.json", name))
    }

    /// Create the directory an entry lives in
    ///
    /// Only the experiment directory itself may be created from scratch.
    /// Prefix directories are created one level at a time below it, so a
    /// missing experiment directory surfaces as `ExperimentNotFound`.
    async fn entry_dir(&self, experiment_id: &str, key: &str) -> Result<PathBuf> {
        let mut dir = self.experiment_dir(experiment_id);
        let Some((prefix, _)) = key.rsplit_once('/') else {
            create_dir(&dir).await.map_err(|e| unavailable(&dir, e))?;
            return Ok(dir);
        };

        for segment in prefix.split('/') {
            dir.push(segment);
            create_dir(&dir)
                .await
                .map_err(|e| write_failed(experiment_id, &dir, e))?;
        }
        Ok(dir)
    }

    /// Write the value to a temporary file in the entry's directory
    async fn write_temp(&self, experiment_id: &str, key: &str, value: &str) -> Result<PathBuf> {
        let parent = self.entry_dir(experiment_id, key).await?;

        let temp = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| write_failed(experiment_id, &temp, e))?;
        file.write_all(value.as_bytes())
            .await
            .map_err(|e| unavailable(&temp, e))?;
        file.sync_all().await.map_err(|e| unavailable(&temp, e))?;

        Ok(temp)
    }
}

/// Create a single directory, succeeding if it is already there
async fn create_dir(dir: &Path) -> std::io::Result<()> {
    match fs::create_dir(dir).await {
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        result => result,
    }
}

async fn discard_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp).await {
        debug!("Failed to remove temporary file {}: {}", temp.display(), e);
    }
}

#[async_trait::async_trait]
impl SignalBoard for LocalSignalBoard {
    async fn get(&self, experiment_id: &str, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(experiment_id, key);

        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    async fn set(&self, experiment_id: &str, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(experiment_id, key);
        let temp = self.write_temp(experiment_id, key, value).await?;

        // Rename replaces the target atomically
        if let Err(e) = fs::rename(&temp, &path).await {
            discard_temp(&temp).await;
            return Err(write_failed(experiment_id, &path, e));
        }

        Ok(())
    }

    async fn try_create(&self, experiment_id: &str, key: &str, value: &str) -> Result<bool> {
        let path = self.entry_path(experiment_id, key);
        let temp = self.write_temp(experiment_id, key, value).await?;

        // Linking fails if the target exists, which makes the creation atomic
        // while still publishing the complete contents in one step
        let linked = fs::hard_link(&temp, &path).await;
        discard_temp(&temp).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(write_failed(experiment_id, &path, e)),
        }
    }

    async fn remove(&self, experiment_id: &str, key: &str) -> Result<()> {
        let path = self.entry_path(experiment_id, key);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    async fn list(&self, experiment_id: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.prefix_dir(experiment_id, prefix);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unavailable(&dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| unavailable(&dir, e))? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            // Skip temporary files of in-flight writes
            if name.starts_with('.') {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".json") {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn clear(&self, experiment_id: &str) -> Result<()> {
        let dir = self.experiment_dir(experiment_id);

        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&dir, e)),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

fn unavailable(path: &Path, source: std::io::Error) -> SyncError {
    SyncError::SignalMediumUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

/// Map a failed write, where a vanished directory means the experiment was
/// torn down underneath the writer
fn write_failed(experiment_id: &str, path: &Path, source: std::io::Error) -> SyncError {
    if source.kind() == ErrorKind::NotFound {
        SyncError::ExperimentNotFound {
            experiment_id: experiment_id.to_string(),
        }
    } else {
        unavailable(path, source)
    }
}

/// Whether a key lives under a prefix and so needs its experiment to exist
fn is_prefixed(key: &str) -> bool {
    key.contains('/')
}

/// In-memory implementation of SignalBoard
///
/// Only shared between tasks of one process. Used to exercise coordination
/// logic without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemorySignalBoard {
    experiments: RwLock<HashMap<String, BTreeMap<String, String>>>,
    unavailable: AtomicBool,
}

impl MemorySignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the medium could not be reached
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::SignalMediumUnavailable {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(ErrorKind::NotConnected, "board marked unavailable"),
            });
        }
        Ok(())
    }

    /// Get the entries a write goes to, creating the experiment only for
    /// unprefixed keys
    fn entries_for_write<'a>(
        experiments: &'a mut HashMap<String, BTreeMap<String, String>>,
        experiment_id: &str,
        key: &str,
    ) -> Result<&'a mut BTreeMap<String, String>> {
        if is_prefixed(key) && !experiments.contains_key(experiment_id) {
            return Err(SyncError::ExperimentNotFound {
                experiment_id: experiment_id.to_string(),
            });
        }
        Ok(experiments.entry(experiment_id.to_string()).or_default())
    }
}

#[async_trait::async_trait]
impl SignalBoard for MemorySignalBoard {
    async fn get(&self, experiment_id: &str, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let experiments = self.experiments.read().await;
        Ok(experiments
            .get(experiment_id)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn set(&self, experiment_id: &str, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        let mut experiments = self.experiments.write().await;
        Self::entries_for_write(&mut experiments, experiment_id, key)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn try_create(&self, experiment_id: &str, key: &str, value: &str) -> Result<bool> {
        self.check_available()?;
        let mut experiments = self.experiments.write().await;
        let entries = Self::entries_for_write(&mut experiments, experiment_id, key)?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn remove(&self, experiment_id: &str, key: &str) -> Result<()> {
        self.check_available()?;
        let mut experiments = self.experiments.write().await;
        if let Some(entries) = experiments.get_mut(experiment_id) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list(&self, experiment_id: &str, prefix: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let experiments = self.experiments.read().await;
        let Some(entries) = experiments.get(experiment_id) else {
            return Ok(Vec::new());
        };

        let dir = format!("{}/", prefix);
        Ok(entries
            .keys()
            .filter_map(|key| key.strip_prefix(&dir))
            .filter(|name| !name.contains('/'))
            .map(str::to_string)
            .collect())
    }

    async fn clear(&self, experiment_id: &str) -> Result<()> {
        self.check_available()?;
        self.experiments.write().await.remove(experiment_id);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
