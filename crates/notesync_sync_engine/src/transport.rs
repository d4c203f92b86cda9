//! Transport abstraction for note delivery.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use notesync_core::{Note, NoteId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Opaque confirmation returned by the endpoint for one delivery.
///
/// `Null` when the endpoint answered with an empty body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ack(pub serde_json::Value);

impl Ack {
    /// An acknowledgement without a body.
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    /// Returns whether the endpoint sent no body.
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// Delivers one note to the remote side.
///
/// Implementations report every failure as an error; the engine treats any
/// `Ok` as confirmed delivery.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Sends `note` and waits for the endpoint's confirmation.
    async fn deliver(&self, note: &Note) -> SyncResult<Ack>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn deliver(&self, note: &Note) -> SyncResult<Ack> {
        (**self).deliver(note).await
    }
}

/// A scriptable transport for testing.
///
/// Succeeds for every note unless told to fail for specific ids or for
/// everything.
#[derive(Debug, Default)]
pub struct MockTransport {
    failing_ids: Mutex<HashSet<NoteId>>,
    fail_all: AtomicBool,
    calls: AtomicUsize,
    delivered: Mutex<Vec<Note>>,
}

impl MockTransport {
    /// Creates a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes deliveries of `id` fail.
    pub fn fail_for(&self, id: NoteId) {
        self.failing_ids.lock().insert(id);
    }

    /// Lets deliveries of `id` succeed again.
    pub fn succeed_for(&self, id: NoteId) {
        self.failing_ids.lock().remove(&id);
    }

    /// Makes every delivery fail (or stop failing).
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Number of `deliver` calls, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Notes delivered successfully, in order.
    pub fn delivered(&self) -> Vec<Note> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn deliver(&self, note: &Note) -> SyncResult<Ack> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) || self.failing_ids.lock().contains(&note.id) {
            return Err(SyncError::transport_retryable(format!(
                "mock failure for note {}",
                note.id
            )));
        }
        self.delivered.lock().push(note.clone());
        Ok(Ack(serde_json::json!({ "result": "success", "id": note.id })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::now_timestamp;

    fn note(id: i64) -> Note {
        Note::new(NoteId::new(id), None, "x", now_timestamp())
    }

    #[tokio::test]
    async fn mock_scripts_failures() {
        let transport = MockTransport::new();
        transport.fail_for(NoteId::new(2));

        assert!(transport.deliver(&note(1)).await.is_ok());
        assert!(transport.deliver(&note(2)).await.is_err());

        transport.succeed_for(NoteId::new(2));
        transport.set_fail_all(true);
        assert!(transport.deliver(&note(3)).await.is_err());

        assert_eq!(transport.calls(), 3);
        let delivered: Vec<NoteId> = transport.delivered().iter().map(|n| n.id).collect();
        assert_eq!(delivered, vec![NoteId::new(1)]);
    }

    #[tokio::test]
    async fn arc_transport_delegates() {
        let transport = Arc::new(MockTransport::new());
        let ack = SyncTransport::deliver(&transport, &note(1)).await.unwrap();
        assert_eq!(ack.0["result"], "success");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn empty_ack() {
        assert!(Ack::empty().is_empty());
        assert!(!Ack(serde_json::json!({})).is_empty());
    }
}
