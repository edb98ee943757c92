//! Moves one file into its resolved destination.
//!
//! States run `Pending -> Probing -> Moving -> Recorded`, or end early in
//! `Skipped` / `Failed`. Probing retries transient access errors on a fixed
//! backoff schedule; every sleep is cancellable.

use crate::indexer::IndexStore;
use crate::models::{DestinationPlan, FileRecord};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MoveState {
    Pending,
    Probing,
    Moving,
    Recorded,
    Skipped,
    Failed,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("file is locked: {0}")]
    Locked(String),
    #[error("file vanished")]
    Vanished,
    #[error("file is unreadable: {0}")]
    Unreadable(String),
    #[error("not a regular file")]
    NotAFile,
}

impl ProbeError {
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => ProbeError::Vanished,
            ErrorKind::PermissionDenied | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
                ProbeError::Locked(err.to_string())
            }
            _ => ProbeError::Unreadable(err.to_string()),
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Locked(_) | ProbeError::Unreadable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    Vanished,
    Locked,
    Cancelled,
    NotAFile,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Vanished => "file no longer exists",
            SkipReason::Locked => "file stayed locked",
            SkipReason::Cancelled => "cancelled",
            SkipReason::NotAFile => "not a regular file",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MoveOutcome {
    Recorded {
        source: PathBuf,
        destination: PathBuf,
        record: FileRecord,
        /// False when the move happened but the index write did not.
        indexed: bool,
    },
    Skipped {
        source: PathBuf,
        reason: SkipReason,
    },
    Failed {
        source: PathBuf,
        reason: String,
    },
}

impl MoveOutcome {
    pub fn state(&self) -> MoveState {
        match self {
            MoveOutcome::Recorded { .. } => MoveState::Recorded,
            MoveOutcome::Skipped { .. } => MoveState::Skipped,
            MoveOutcome::Failed { .. } => MoveState::Failed,
        }
    }

    pub fn source(&self) -> &Path {
        match self {
            MoveOutcome::Recorded { source, .. }
            | MoveOutcome::Skipped { source, .. }
            | MoveOutcome::Failed { source, .. } => source,
        }
    }
}

/// One async mutex per destination directory, so the exists-check and the
/// rename into a folder never interleave between workers.
///
/// Entries nobody holds or waits on are dropped on the next `lock`, so a long
/// watch session only tracks directories with moves in flight.
#[derive(Default)]
pub struct DirectoryLocks {
    inner: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl DirectoryLocks {
    pub async fn lock(&self, dir: &Path) -> tokio::sync::OwnedMutexGuard<()> {
        let slot = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.retain(|_, slot| Arc::strong_count(slot) > 1);
            map.entry(dir.to_path_buf()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of directories currently tracked.
    pub fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// First free name for `file_name` in `dir`. A taken name gets a
/// `_YYYYmmdd_HHMMSS` suffix before the extension, then `_1`, `_2`, ... if that
/// is taken as well.
pub fn unique_destination(dir: &Path, file_name: &str, now: DateTime<Local>) -> PathBuf {
    let plain = dir.join(file_name);
    if !plain.exists() {
        return plain;
    }
    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let ext = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = now.format("%Y%m%d_%H%M%S");
    let stamped = dir.join(format!("{stem}_{stamp}{ext}"));
    if !stamped.exists() {
        return stamped;
    }
    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{stamp}_{counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

pub struct MoveExecutor {
    backoff: Vec<Duration>,
    locks: DirectoryLocks,
    index: Option<IndexStore>,
}

impl MoveExecutor {
    pub fn new(backoff: Vec<Duration>, index: Option<IndexStore>) -> Self {
        Self {
            backoff,
            locks: DirectoryLocks::default(),
            index,
        }
    }

    pub fn index(&self) -> Option<&IndexStore> {
        self.index.as_ref()
    }

    async fn probe_once(path: &Path) -> Result<Metadata, ProbeError> {
        let meta = tokio::fs::metadata(path).await.map_err(ProbeError::from_io)?;
        if !meta.is_file() {
            return Err(ProbeError::NotAFile);
        }
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(ProbeError::from_io)?;
        let mut byte = [0u8; 1];
        file.read(&mut byte).await.map_err(ProbeError::from_io)?;
        Ok(meta)
    }

    /// Opens the file for a one-byte read, retrying transient errors on the
    /// backoff schedule. Returns the file's metadata once it is readable.
    pub async fn probe(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Metadata, SkipReason> {
        debug!(path = %path.display(), from = ?MoveState::Pending, to = ?MoveState::Probing, "move state");
        let mut delays = self.backoff.iter();
        loop {
            if cancel.is_cancelled() {
                return Err(SkipReason::Cancelled);
            }
            let err = match Self::probe_once(path).await {
                Ok(meta) => return Ok(meta),
                Err(err) => err,
            };
            match err {
                ProbeError::Vanished => return Err(SkipReason::Vanished),
                ProbeError::NotAFile => return Err(SkipReason::NotAFile),
                ref transient if transient.is_transient() => {
                    let Some(delay) = delays.next() else {
                        warn!(path = %path.display(), error = %err, "gave up waiting for file");
                        return Err(SkipReason::Locked);
                    };
                    debug!(path = %path.display(), error = %err, ?delay, "file busy, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SkipReason::Cancelled),
                        _ = tokio::time::sleep(*delay) => {}
                    }
                }
                _ => return Err(SkipReason::Locked),
            }
        }
    }

    /// Moves `source` according to `plan` and records it. `record.file_path`
    /// is overwritten with the final destination.
    pub async fn commit(
        &self,
        source: &Path,
        plan: &DestinationPlan,
        mut record: FileRecord,
    ) -> MoveOutcome {
        debug!(path = %source.display(), from = ?MoveState::Probing, to = ?MoveState::Moving, "move state");
        let destination = {
            let _guard = self.locks.lock(&plan.directory).await;
            if let Err(e) = tokio::fs::create_dir_all(&plan.directory).await {
                return self.fail(source, format!("cannot create {}: {e}", plan.directory.display()));
            }
            let planned = plan.target();
            if planned == source {
                planned
            } else {
                let destination = unique_destination(&plan.directory, &plan.file_name, Local::now());
                if let Err(e) = tokio::fs::rename(source, &destination).await {
                    if e.kind() == ErrorKind::NotFound && !source.exists() {
                        warn!(path = %source.display(), "file vanished before move");
                        return MoveOutcome::Skipped {
                            source: source.to_path_buf(),
                            reason: SkipReason::Vanished,
                        };
                    }
                    return self.fail(source, format!("move to {} failed: {e}", destination.display()));
                }
                destination
            }
        };

        record.file_path = destination.clone();
        let indexed = match &self.index {
            Some(index) => match index.upsert(&record).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(path = %destination.display(), error = %e, "file moved but index write failed");
                    false
                }
            },
            None => false,
        };
        info!(
            source = %source.display(),
            destination = %destination.display(),
            label = %record.label,
            confidence = record.confidence,
            "organized"
        );
        MoveOutcome::Recorded {
            source: source.to_path_buf(),
            destination,
            record,
            indexed,
        }
    }

    fn fail(&self, source: &Path, reason: String) -> MoveOutcome {
        warn!(path = %source.display(), %reason, "move failed");
        MoveOutcome::Failed {
            source: source.to_path_buf(),
            reason,
        }
    }
}
