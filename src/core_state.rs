//! Shared application state for the HTTP layer.
//!
//! One `CoreState` is built at startup and wrapped in `Arc`. Handlers open a
//! fresh SQLite connection per request; everything else here is cheap to share.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::blob_store::{BlobError, DocumentStore, FsBlobStore};
use crate::db::{self, DatabaseError};
use crate::pipeline::blueprint::{blueprint_for, spawn_recompute_worker, AnalyzeError, BlueprintCache, RecomputeHandle};
use crate::pipeline::extraction::PaperExtractor;
use crate::pipeline_config::PipelineConfig;

/// Maximum audit entries kept in memory; the oldest are dropped first.
const AUDIT_BUFFER_CAPACITY: usize = 100;

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
}

/// Async mutexes handed out per key (paper id, session id).
///
/// Entries nobody holds are pruned on the next acquisition.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`.
    pub async fn acquire(&self, key: &str) -> Result<tokio::sync::OwnedMutexGuard<()>, CoreError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| CoreError::LockPoisoned)?;
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub action: String,
    pub outcome: String,
}

/// Recent API access, bounded.
pub struct AuditLogger {
    buffer: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    pub fn log(&self, action: &str, outcome: &str) {
        tracing::info!(target: "paperloom::audit", action, outcome, "API access");
        if let Ok(mut buf) = self.buffer.lock() {
            if buf.len() >= AUDIT_BUFFER_CAPACITY {
                buf.pop_front();
            }
            buf.push_back(AuditEntry {
                timestamp: chrono::Utc::now(),
                action: action.to_string(),
                outcome: outcome.to_string(),
            });
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CoreState {
    db_path: PathBuf,
    pub blobs: Arc<dyn DocumentStore>,
    pub config: PipelineConfig,
    pub extractor: Arc<PaperExtractor>,
    pub blueprints: Arc<BlueprintCache>,
    /// Serializes ingestion per paper.
    pub paper_locks: KeyedLocks,
    /// Serializes mutations per practice session.
    pub session_locks: KeyedLocks,
    recompute: RecomputeHandle,
    audit: AuditLogger,
}

impl CoreState {
    /// Open storage under the given paths and start the blueprint recompute worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(db_path: &Path, blobs_dir: &Path, config: PipelineConfig) -> Result<Self, CoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(BlobError::from)?;
        }
        // Runs migrations once up front so request handlers never race on them.
        db::open_database(db_path)?;
        let blobs: Arc<dyn DocumentStore> = Arc::new(FsBlobStore::open(blobs_dir)?);
        let extractor = Arc::new(PaperExtractor::from_config(&config.extraction));
        Ok(Self::with_parts(db_path.to_path_buf(), blobs, extractor, config))
    }

    /// Assemble from pre-built parts. Tests use this to inject a mock OCR engine.
    pub fn with_parts(
        db_path: PathBuf,
        blobs: Arc<dyn DocumentStore>,
        extractor: Arc<PaperExtractor>,
        config: PipelineConfig,
    ) -> Self {
        let blueprints = Arc::new(BlueprintCache::new());
        let recompute = {
            let db_path = db_path.clone();
            let cache = Arc::clone(&blueprints);
            let bp_config = config.blueprint.clone();
            let (handle, _task) = spawn_recompute_worker(
                Duration::from_millis(config.blueprint.recompute_debounce_ms),
                move |exam, subject| {
                    let result = db::open_database(&db_path)
                        .map_err(AnalyzeError::from)
                        .and_then(|conn| blueprint_for(&conn, &cache, exam, subject, &bp_config));
                    match result {
                        Ok(bp) => tracing::debug!(
                            exam,
                            subject,
                            snapshot_id = bp.snapshot_id,
                            "Blueprint recomputed"
                        ),
                        Err(AnalyzeError::Database(e)) => {
                            tracing::error!(exam, subject, error = %e, "Blueprint recompute failed")
                        }
                        Err(e) => tracing::debug!(exam, subject, reason = %e, "No blueprint yet"),
                    }
                },
            );
            handle
        };

        Self {
            db_path,
            blobs,
            config,
            extractor,
            blueprints,
            paper_locks: KeyedLocks::new(),
            session_locks: KeyedLocks::new(),
            recompute,
            audit: AuditLogger::new(),
        }
    }

    /// Open a database connection. Most common operation in handlers.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Queue a debounced blueprint recompute after the bank changed.
    pub fn notify_bank_changed(&self, exam_name: &str, subject: &str) {
        self.recompute.notify(exam_name, subject);
    }

    pub fn log_access(&self, action: &str, outcome: &str) {
        self.audit.log(action, outcome);
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }
}
