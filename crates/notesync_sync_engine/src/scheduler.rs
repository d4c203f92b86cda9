//! Automatic sync on reconnect.

use crate::state::{SyncEngine, SyncSource};
use crate::transport::SyncTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Background task that runs one sync after each offline→online
/// transition, once the settling delay has passed.
///
/// Starting while already online counts as a transition, so notes queued
/// by an earlier session go out without waiting for a reconnect.
/// Transitions that happen while a sync is waiting or running are folded
/// into that sync. The task stops when this handle is dropped.
#[derive(Debug)]
pub struct AutoSync {
    handle: JoinHandle<()>,
}

impl AutoSync {
    /// Starts watching the engine's connectivity signal.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T, S>(engine: Arc<SyncEngine<T, S>>, settle_delay: Duration) -> Self
    where
        T: SyncTransport + 'static,
        S: SyncSource + 'static,
    {
        let mut rx = engine.connectivity().subscribe();
        let mut online = *rx.borrow_and_update();
        let handle = tokio::spawn(async move {
            let mut due = online;
            loop {
                if due {
                    tracing::debug!(delay_ms = settle_delay.as_millis() as u64, "online; sync scheduled");
                    tokio::time::sleep(settle_delay).await;
                    match engine.sync_all().await {
                        Ok(outcome) => tracing::info!(%outcome, "automatic sync finished"),
                        Err(err) => tracing::error!(error = %err, "automatic sync failed"),
                    }
                    online = *rx.borrow_and_update();
                }

                if rx.changed().await.is_err() {
                    break;
                }
                let now_online = *rx.borrow_and_update();
                due = now_online && !online;
                online = now_online;
            }
        });
        Self { handle }
    }

    /// Returns whether the task is still watching.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the task.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::Connectivity;
    use crate::transport::MockTransport;
    use notesync_core::{Database, NoteDraft, NoteRepository};

    #[tokio::test(start_paused = true)]
    async fn syncs_after_settle_delay() {
        let repo = NoteRepository::new(Arc::new(Database::open_in_memory().unwrap())).unwrap();
        let transport = Arc::new(MockTransport::new());
        let connectivity = Connectivity::new(false);
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&transport),
            repo.clone(),
            connectivity.clone(),
        ));
        let auto = AutoSync::spawn(Arc::clone(&engine), Duration::from_secs(2));

        repo.save(NoteDraft::new("offline note")).await.unwrap();
        connectivity.set_online(true);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.calls(), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        for _ in 0..50 {
            if repo.pending_count().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(repo.pending_count().await.unwrap(), 0);
        assert!(auto.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn starting_online_drains_earlier_notes() {
        let repo = NoteRepository::new(Arc::new(Database::open_in_memory().unwrap())).unwrap();
        repo.save(NoteDraft::new("left over")).await.unwrap();
        let transport = Arc::new(MockTransport::new());
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&transport),
            repo.clone(),
            Connectivity::new(true),
        ));
        let _auto = AutoSync::spawn(engine, Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.calls(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.calls(), 1);
        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn going_offline_does_not_sync() {
        let repo = NoteRepository::new(Arc::new(Database::open_in_memory().unwrap())).unwrap();
        let transport = Arc::new(MockTransport::new());
        let connectivity = Connectivity::new(true);
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&transport),
            repo.clone(),
            connectivity.clone(),
        ));
        let _auto = AutoSync::spawn(engine, Duration::from_secs(2));

        repo.save(NoteDraft::new("queued")).await.unwrap();
        connectivity.set_online(false);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(transport.calls(), 0);
        assert_eq!(repo.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stop_ends_the_task() {
        let repo = NoteRepository::new(Arc::new(Database::open_in_memory().unwrap())).unwrap();
        let engine = Arc::new(SyncEngine::new(
            MockTransport::new(),
            repo,
            Connectivity::default(),
        ));
        let auto = AutoSync::spawn(engine, Duration::from_millis(1));
        auto.stop();
        tokio::task::yield_now().await;
        for _ in 0..100 {
            if !auto.is_running() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!auto.is_running());
    }
}
