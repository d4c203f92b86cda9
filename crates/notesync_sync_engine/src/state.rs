//! Sync engine: drains the sync queue through a transport.

use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notesync_core::{Note, NoteId, NoteRepository, StorageResult};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync has run yet.
    Idle,
    /// A sync run is delivering notes.
    Syncing,
    /// The last run delivered every pending note.
    Synced,
    /// The last run left at least one note undelivered.
    Failed,
    /// The last run was skipped because the device was offline.
    Offline,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

/// Cumulative statistics for one engine.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that reached the pending list.
    pub runs: u64,
    /// Notes delivered and acknowledged.
    pub delivered: u64,
    /// Delivery failures.
    pub failures: u64,
    /// End of the last run that had nothing left to deliver.
    pub last_sync: Option<DateTime<Utc>>,
    /// Last error seen.
    pub last_error: Option<String>,
}

/// A note that was not delivered during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// The note's id.
    pub id: NoteId,
    /// Why delivery failed.
    pub reason: String,
}

/// Counts for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pending notes processed.
    pub attempted: usize,
    /// Notes delivered and cleared from the queue.
    pub succeeded: usize,
    /// Notes left pending.
    pub failed: usize,
    /// One entry per failed note.
    pub failures: Vec<DeliveryFailure>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns whether every attempted note was delivered.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Result of [`SyncEngine::sync_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The device is offline; nothing was attempted.
    Offline,
    /// The queue was empty.
    NothingPending,
    /// Every pending note was attempted.
    Completed(SyncReport),
}

impl SyncOutcome {
    /// Notes delivered in this run.
    pub fn succeeded(&self) -> usize {
        match self {
            SyncOutcome::Completed(report) => report.succeeded,
            _ => 0,
        }
    }

    /// Notes that failed in this run.
    pub fn failed(&self) -> usize {
        match self {
            SyncOutcome::Completed(report) => report.failed,
            _ => 0,
        }
    }

    /// The report, if the run got that far.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Offline => write!(f, "cannot sync while offline"),
            SyncOutcome::NothingPending => write!(f, "no new data to sync"),
            SyncOutcome::Completed(report) => write!(
                f,
                "synchronization complete: {} succeeded, {} failed",
                report.succeeded, report.failed
            ),
        }
    }
}

/// Where the engine reads pending notes and records deliveries.
#[async_trait]
pub trait SyncSource: Send + Sync {
    /// Every note awaiting delivery.
    async fn pending(&self) -> StorageResult<Vec<Note>>;

    /// Clears the pending entry for `delivered` unless it changed since.
    async fn acknowledge(&self, delivered: &Note) -> StorageResult<bool>;
}

#[async_trait]
impl SyncSource for NoteRepository {
    async fn pending(&self) -> StorageResult<Vec<Note>> {
        NoteRepository::pending(self).await
    }

    async fn acknowledge(&self, delivered: &Note) -> StorageResult<bool> {
        NoteRepository::acknowledge(self, delivered).await
    }
}

/// Drains the sync queue, one note at a time.
///
/// A run is skipped while offline. Otherwise every pending note is
/// delivered in queue order; a note leaves the queue only after the
/// transport confirms it, and a failing note never stops the run. Runs do
/// not overlap: a second caller waits for the running one to finish.
pub struct SyncEngine<T: SyncTransport, S: SyncSource = NoteRepository> {
    transport: Arc<T>,
    source: S,
    connectivity: Connectivity,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    gate: Mutex<()>,
}

impl<T: SyncTransport, S: SyncSource> fmt::Debug for SyncEngine<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("online", &self.connectivity.is_online())
            .finish()
    }
}

impl<T: SyncTransport, S: SyncSource> SyncEngine<T, S> {
    /// Creates an engine.
    pub fn new(transport: T, source: S, connectivity: Connectivity) -> Self {
        Self::with_shared_transport(Arc::new(transport), source, connectivity)
    }

    /// Creates an engine around a transport the caller keeps a handle to.
    pub fn with_shared_transport(transport: Arc<T>, source: S, connectivity: Connectivity) -> Self {
        Self {
            transport,
            source,
            connectivity,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            gate: Mutex::new(()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The connectivity signal this engine checks.
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Delivers every pending note.
    ///
    /// Per-note failures are reported in the outcome, never as an error.
    ///
    /// # Errors
    ///
    /// Only if the pending list cannot be read.
    pub async fn sync_all(&self) -> SyncResult<SyncOutcome> {
        let _gate = self.gate.lock().await;

        if !self.connectivity.is_online() {
            tracing::info!("offline; sync skipped");
            self.set_state(SyncState::Offline);
            return Ok(SyncOutcome::Offline);
        }

        self.set_state(SyncState::Syncing);
        let pending = match self.source.pending().await {
            Ok(pending) => pending,
            Err(err) => {
                tracing::error!(error = %err, "failed to read sync queue");
                self.set_state(SyncState::Failed);
                self.stats.write().last_error = Some(err.to_string());
                return Err(SyncError::Storage(err));
            }
        };

        if pending.is_empty() {
            tracing::debug!("sync queue empty");
            self.set_state(SyncState::Synced);
            self.stats.write().last_sync = Some(Utc::now());
            return Ok(SyncOutcome::NothingPending);
        }

        tracing::info!(pending = pending.len(), "syncing notes");
        let start = Instant::now();
        let mut report = SyncReport::default();

        for note in &pending {
            report.attempted += 1;
            match self.deliver_one(note).await {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    tracing::warn!(id = %note.id, error = %err, "note not synced");
                    report.failed += 1;
                    report.failures.push(DeliveryFailure {
                        id: note.id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        report.duration = start.elapsed();

        {
            let mut stats = self.stats.write();
            stats.runs += 1;
            stats.delivered += report.succeeded as u64;
            stats.failures += report.failed as u64;
            if let Some(failure) = report.failures.last() {
                stats.last_error = Some(failure.reason.clone());
            } else {
                stats.last_sync = Some(Utc::now());
            }
        }
        self.set_state(if report.is_clean() {
            SyncState::Synced
        } else {
            SyncState::Failed
        });

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = report.duration.as_millis() as u64,
            "sync run finished"
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn deliver_one(&self, note: &Note) -> SyncResult<()> {
        let ack = self.transport.deliver(note).await?;
        tracing::debug!(id = %note.id, ack = %ack.0, "note delivered");
        if !self.source.acknowledge(note).await? {
            tracing::debug!(id = %note.id, "note changed during delivery; newer version stays queued");
        }
        Ok(())
    }
}
