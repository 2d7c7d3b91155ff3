//! Durable per-phase execution records.
//!
//! `.primer/state.json` holds one record per phase id:
//!
//! ```json
//! { "version": 1, "records": { "install": { "phase_id": "install", "status": "succeeded", ... } } }
//! ```
//!
//! Every mutation rewrites the whole document through a temp file and a rename,
//! so readers see either the old or the new state, never a partial write.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const STATE_VERSION: u32 = 1;

/// Recorded outcome of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NeverRun,
    Succeeded,
    Failed,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::NeverRun => write!(f, "never_run"),
            PhaseStatus::Succeeded => write!(f, "succeeded"),
            PhaseStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub phase_id: String,
    pub status: PhaseStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detail: String,
    /// Fingerprint of the phase definition that produced this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ExecutionRecord {
    pub fn new(phase_id: &str, status: PhaseStatus, detail: &str) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            status,
            timestamp: Utc::now(),
            detail: detail.to_string(),
            fingerprint: None,
        }
    }

    pub fn succeeded(phase_id: &str, detail: &str) -> Self {
        Self::new(phase_id, PhaseStatus::Succeeded, detail)
    }

    pub fn failed(phase_id: &str, detail: &str) -> Self {
        Self::new(phase_id, PhaseStatus::Failed, detail)
    }

    pub fn with_fingerprint(mut self, fingerprint: String) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    records: BTreeMap<String, ExecutionRecord>,
}

/// File-backed record of phase outcomes.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: BTreeMap<String, ExecutionRecord>,
}

impl StateStore {
    /// Load the state file. A missing file is an empty store; an unreadable
    /// one is logged and also treated as empty. Never writes.
    pub fn open(path: PathBuf) -> Self {
        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<StateDocument>(&content) {
                Ok(doc) => {
                    if doc.version > STATE_VERSION {
                        tracing::warn!(
                            path = %path.display(),
                            version = doc.version,
                            "State file has a newer version; reading known fields only"
                        );
                    }
                    doc.records
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "State file is corrupt; treating all phases as never run"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "State file is unreadable; treating all phases as never run"
                );
                BTreeMap::new()
            }
        };

        Self { path, records }
    }

    pub fn mark_success(&mut self, phase_id: &str, detail: &str) -> Result<()> {
        self.put(ExecutionRecord::succeeded(phase_id, detail))
    }

    pub fn mark_failure(&mut self, phase_id: &str, detail: &str) -> Result<()> {
        self.put(ExecutionRecord::failed(phase_id, detail))
    }

    /// Insert or replace the record for `record.phase_id` and persist.
    pub fn put(&mut self, record: ExecutionRecord) -> Result<()> {
        tracing::debug!(phase = %record.phase_id, status = %record.status, "Recording phase outcome");
        self.records.insert(record.phase_id.clone(), record);
        self.save()
    }

    pub fn has_succeeded(&self, phase_id: &str) -> bool {
        self.status(phase_id) == PhaseStatus::Succeeded
    }

    pub fn status(&self, phase_id: &str) -> PhaseStatus {
        self.records
            .get(phase_id)
            .map_or(PhaseStatus::NeverRun, |r| r.status)
    }

    pub fn record(&self, phase_id: &str) -> Option<&ExecutionRecord> {
        self.records.get(phase_id)
    }

    /// All records, ordered by phase id.
    pub fn records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.values()
    }

    /// Remove one record. Returns whether a record existed; the file is only
    /// rewritten when it did.
    pub fn clear(&mut self, phase_id: &str) -> Result<bool> {
        if self.records.remove(phase_id).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Remove every record and the state file itself.
    pub fn clear_all(&mut self) -> Result<()> {
        self.records.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove state file: {}", self.path.display())),
        }
    }

    fn save(&self) -> Result<()> {
        let doc = StateDocument {
            version: STATE_VERSION,
            records: self.records.clone(),
        };
        write_json_atomic(&self.path, &doc)
    }
}

/// Write JSON to `<path>.tmp`, fsync, then rename over `path`.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let bytes = serde_json::to_vec_pretty(value).context("Failed to serialize state")?;
    let mut file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace state file: {}", path.display()))?;
    Ok(())
}

/// Exclusive advisory lock on `.primer/state.lock`, released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
}

impl StateLock {
    /// Try to take the lock without blocking. `Ok(None)` means another
    /// process holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if is_contended(&e) => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to lock {}", path.display()));
            }
        }

        file.set_len(0).ok();
        writeln!(file, "{}", std::process::id()).ok();

        Ok(Some(Self { file }))
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
