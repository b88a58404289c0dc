//! Persistence Layer (§4.7, §6.4): content-addressed job storage with write-through
//! checkpointing, atomic writes, retention expiry, and the restart resurrection scan.
//!
//! Grounded on `harness/feature_registry.rs`'s write-temp-then-rename `save()` and its
//! backup-on-write strategy, generalized from one JSON registry file to a per-job directory
//! tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::accumulator::FileChange;
use crate::job::Job;
use crate::state_machine::CHECKPOINT_SCHEMA_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error persisting job {job_id}: {source}")]
    Io { job_id: String, #[source] source: std::io::Error },
    #[error("serialization error persisting job {job_id}: {source}")]
    Serde { job_id: String, #[source] source: serde_json::Error },
}

/// What the restart scan decided to do with one previously-persisted, non-terminal job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResurrectionPolicy {
    /// Job had already reached a terminal state; resurrected read-only for status queries.
    ReadOnlyTerminal,
    /// Job was non-terminal at the time of a crash; marked TimedOut with a resumable flag, per
    /// the safe default (§4.7): never auto-re-run.
    MarkedTimedOutResumable,
}

/// Transport-agnostic persistence contract the Job Manager depends on. The filesystem
/// implementation below is the only one shipped, but the core stays testable against fakes.
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    async fn save_job(&self, job: &Job) -> Result<(), StorageError>;
    async fn save_file_snapshot(&self, job_id: &str, iteration: u32, files: &[FileChange]) -> Result<(), StorageError>;
    async fn load_job(&self, job_id: &str) -> Result<Option<Job>, StorageError>;
    async fn list_job_ids(&self) -> Result<Vec<String>, StorageError>;
    async fn delete_job(&self, job_id: &str) -> Result<(), StorageError>;
}

/// Filesystem layout: `<root>/<job_id>/job.json`, `<root>/<job_id>/history.jsonl`,
/// `<root>/<job_id>/files/<iteration>.json`.
pub struct FileSystemPersistence {
    root: PathBuf,
}

impl FileSystemPersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Write-temp-then-rename, mirroring `FeatureRegistry::save()`'s atomicity strategy. An
    /// optional `.backup` copy of the previous contents is kept before the rename.
    fn write_atomic(path: &Path, contents: &str, job_id: &str) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io { job_id: job_id.into(), source: e })?;
        }
        if path.exists() {
            let backup = path.with_extension("json.backup");
            let _ = std::fs::copy(path, backup);
        }
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents).map_err(|e| StorageError::Io { job_id: job_id.into(), source: e })?;
        std::fs::rename(&temp_path, path).map_err(|e| StorageError::Io { job_id: job_id.into(), source: e })
    }
}

#[async_trait]
impl PersistenceLayer for FileSystemPersistence {
    async fn save_job(&self, job: &Job) -> Result<(), StorageError> {
        let path = self.job_dir(&job.id).join("job.json");
        let contents = serde_json::to_string_pretty(job).map_err(|e| StorageError::Serde { job_id: job.id.clone(), source: e })?;
        Self::write_atomic(&path, &contents, &job.id)
    }

    async fn save_file_snapshot(&self, job_id: &str, iteration: u32, files: &[FileChange]) -> Result<(), StorageError> {
        let path = self.job_dir(job_id).join("files").join(format!("{iteration}.json"));
        let contents = serde_json::to_string_pretty(files).map_err(|e| StorageError::Serde { job_id: job_id.into(), source: e })?;
        Self::write_atomic(&path, &contents, job_id)
    }

    async fn load_job(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        let path = self.job_dir(job_id).join("job.json");
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| StorageError::Io { job_id: job_id.into(), source: e })?;
        let job = serde_json::from_str(&contents).map_err(|e| StorageError::Serde { job_id: job_id.into(), source: e })?;
        Ok(Some(job))
    }

    async fn list_job_ids(&self) -> Result<Vec<String>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let entries = std::fs::read_dir(&self.root).map_err(|e| StorageError::Io { job_id: String::new(), source: e })?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::Io { job_id: String::new(), source: e })?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), StorageError> {
        let dir = self.job_dir(job_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| StorageError::Io { job_id: job_id.into(), source: e })?;
        }
        Ok(())
    }
}

/// Default retention period (§4.7): terminal jobs older than this are deleted.
pub const DEFAULT_RETENTION: ChronoDuration = ChronoDuration::days(7);

/// The restart scan (§4.7): for every persisted job, resurrect terminal jobs read-only and
/// mark non-terminal jobs `TimedOut` (resumable) per the safe default — never auto-re-run.
pub async fn restart_scan(
    persistence: &dyn PersistenceLayer,
    now: DateTime<Utc>,
    retention: ChronoDuration,
) -> Result<HashMap<String, ResurrectionPolicy>, StorageError> {
    let mut decisions = HashMap::new();
    for job_id in persistence.list_job_ids().await? {
        let Some(job) = persistence.load_job(&job_id).await? else { continue };
        if job.is_terminal() {
            if let Some(completed_at) = job.completed_at {
                if now - completed_at > retention {
                    persistence.delete_job(&job_id).await?;
                    continue;
                }
            }
            decisions.insert(job_id, ResurrectionPolicy::ReadOnlyTerminal);
        } else {
            decisions.insert(job_id, ResurrectionPolicy::MarkedTimedOutResumable);
        }
    }
    Ok(decisions)
}
