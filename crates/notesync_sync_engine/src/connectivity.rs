//! Online/offline signal.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Shared online/offline flag with change notification.
///
/// The host sets the flag from whatever it observes (OS events, probes,
/// user toggles); the engine reads it before each sync and the auto-sync
/// task watches it for offline→online transitions.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Creates a signal with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Returns the current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Updates the state. Returns whether it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
        changed
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Checks whether the host of `endpoint` accepts a TCP connection within
/// `timeout`.
///
/// Unparseable endpoints count as unreachable.
pub async fn probe_endpoint(endpoint: &str, timeout: Duration) -> bool {
    let Ok(url) = reqwest::Url::parse(endpoint.trim()) else {
        return false;
    };
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            tracing::debug!(host, port, error = %err, "probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(host, port, "probe timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn set_online_reports_changes() {
        let connectivity = Connectivity::new(false);
        assert!(!connectivity.is_online());
        assert!(connectivity.set_online(true));
        assert!(!connectivity.set_online(true));
        assert!(connectivity.is_online());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let connectivity = Connectivity::new(false);
        let mut rx = connectivity.subscribe();
        let clone = connectivity.clone();

        clone.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn probe_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/exec");
        assert!(probe_endpoint(&url, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_rejects_garbage() {
        assert!(!probe_endpoint("not a url", Duration::from_millis(50)).await);
        assert!(!probe_endpoint("", Duration::from_millis(50)).await);
    }
}
