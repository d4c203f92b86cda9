//! HTTP transport.
//!
//! Each note is POSTed on its own as a form body with a single field:
//!
//! ```text
//! Content-Type: application/x-www-form-urlencoded
//!
//! data=<percent-encoded JSON of the note>
//! ```
//!
//! The HTTP library sits behind [`HttpClient`]; [`ReqwestClient`] is the
//! production implementation.

use crate::config::{validate_endpoint, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::transport::{Ack, SyncTransport};
use async_trait::async_trait;
use notesync_core::Note;
use parking_lot::RwLock;
use std::time::Duration;

/// Content type of delivery requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A response as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Canonical reason phrase for the status.
    pub reason: String,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POSTs a form-encoded `body` to `url`.
    ///
    /// Returns any response the server sent, including non-2xx ones; only
    /// failures to get a response are errors.
    async fn post_form(&self, url: &str, body: String) -> SyncResult<HttpResponse>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post_form(&self, url: &str, body: String) -> SyncResult<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;
        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body: body.to_vec(),
        })
    }
}

fn classify(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

/// Encodes a note as the `data=` form body.
///
/// # Errors
///
/// Fails only if the note cannot be serialized.
pub fn encode_form_body(note: &Note) -> SyncResult<String> {
    let json = serde_json::to_string(note)
        .map_err(|e| SyncError::transport_fatal(format!("failed to encode note {}: {e}", note.id)))?;
    Ok(format!("data={}", urlencoding::encode(&json)))
}

/// Parses a response body into an [`Ack`]. Blank bodies yield an empty ack.
///
/// # Errors
///
/// `MalformedAck` when a non-blank body is not JSON.
pub fn parse_ack(body: &[u8]) -> SyncResult<Ack> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Ack::empty());
    }
    serde_json::from_slice(body)
        .map(Ack)
        .map_err(|e| SyncError::MalformedAck(e.to_string()))
}

/// Delivers notes to a form endpoint over HTTP.
pub struct HttpTransport<C: HttpClient> {
    endpoint: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> std::fmt::Debug for HttpTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport for `endpoint`.
    ///
    /// The endpoint is validated on every delivery, so an unconfigured
    /// transport can be built and fails each note with `NotConfigured`.
    pub fn new(endpoint: impl Into<String>, client: C) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the last delivery error, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn try_deliver(&self, note: &Note) -> SyncResult<Ack> {
        let url = validate_endpoint(&self.endpoint)?;
        let body = encode_form_body(note)?;
        let response = self.client.post_form(url.as_str(), body).await?;
        if !response.is_success() {
            return Err(SyncError::Status {
                status: response.status,
                reason: response.reason,
            });
        }
        parse_ack(&response.body)
    }
}

impl HttpTransport<ReqwestClient> {
    /// Creates a reqwest-backed transport from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self::new(
            config.endpoint.clone(),
            ReqwestClient::new(config.request_timeout)?,
        ))
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn deliver(&self, note: &Note) -> SyncResult<Ack> {
        match self.try_deliver(note).await {
            Ok(ack) => {
                *self.last_error.write() = None;
                Ok(ack)
            }
            Err(err) => {
                *self.last_error.write() = Some(err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use notesync_core::NoteId;
    use parking_lot::Mutex;

    struct TestClient {
        response: Mutex<SyncResult<HttpResponse>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl TestClient {
        fn answering(status: u16, body: &str) -> Self {
            Self {
                response: Mutex::new(Ok(HttpResponse {
                    status,
                    reason: "test".into(),
                    body: body.as_bytes().to_vec(),
                })),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn post_form(&self, url: &str, body: String) -> SyncResult<HttpResponse> {
            self.requests.lock().push((url.to_string(), body));
            match &*self.response.lock() {
                Ok(response) => Ok(response.clone()),
                Err(_) => Err(SyncError::Timeout),
            }
        }
    }

    fn note() -> Note {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        Note::new(NoteId::new(1_714_979_289_000), Some("A & B".into()), "x=1", ts)
    }

    #[test]
    fn form_body_is_percent_encoded_json() {
        let body = encode_form_body(&note()).unwrap();
        assert!(body.starts_with("data=%7B%22id%22%3A1714979289000"));
        assert!(!body[5..].contains('&'));
        assert!(!body[5..].contains('='));

        let decoded = urlencoding::decode(&body[5..]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(value["title"], "A & B");
        assert_eq!(value["timestamp"], "2024-05-06T07:08:09.000Z");
    }

    #[test]
    fn ack_parsing() {
        assert!(parse_ack(b"").unwrap().is_empty());
        assert!(parse_ack(b"  \n").unwrap().is_empty());
        assert_eq!(parse_ack(br#"{"result":"success"}"#).unwrap().0["result"], "success");
        assert!(matches!(parse_ack(b"<html>"), Err(SyncError::MalformedAck(_))));
    }

    #[tokio::test]
    async fn delivers_to_endpoint() {
        let transport = HttpTransport::new(
            "https://script.example.com/exec",
            TestClient::answering(200, r#"{"result":"success"}"#),
        );
        let ack = transport.deliver(&note()).await.unwrap();
        assert_eq!(ack.0["result"], "success");
        assert!(transport.last_error().is_none());

        let requests = transport.client.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "https://script.example.com/exec");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let transport = HttpTransport::new(
            "https://script.example.com/exec",
            TestClient::answering(500, "oops"),
        );
        let err = transport.deliver(&note()).await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 500, .. }));
        assert!(transport.last_error().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn placeholder_endpoint_never_sends() {
        let transport = HttpTransport::new(
            crate::config::PLACEHOLDER_ENDPOINT,
            TestClient::answering(200, ""),
        );
        let err = transport.deliver(&note()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured { .. }));
        assert!(transport.client.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn client_errors_pass_through() {
        let client = TestClient::answering(200, "");
        *client.response.lock() = Err(SyncError::Timeout);
        let transport = HttpTransport::new("http://127.0.0.1:9/exec", client);
        assert!(matches!(
            transport.deliver(&note()).await,
            Err(SyncError::Timeout)
        ));
    }
}
