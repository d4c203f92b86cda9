//! # notesync sync engine
//!
//! Best-effort delivery of locally saved notes to a remote endpoint.
//!
//! This crate provides:
//! - [`SyncEngine`], which drains the sync queue one note at a time
//! - [`SyncTransport`] with an HTTP form implementation ([`HttpTransport`])
//! - [`Connectivity`], the online/offline signal, and an endpoint probe
//! - [`AutoSync`], which syncs once after each reconnect
//! - [`NotesClient`], the context object tying them to a database
//!
//! ## Delivery model
//!
//! Every local save is written to the note store and then to the sync
//! queue. A sync run:
//! 1. Does nothing while offline
//! 2. Reads every pending note
//! 3. Delivers each one; confirmed notes leave the queue, failed ones stay
//!
//! ## Key Invariants
//!
//! - A note leaves the queue only after the endpoint confirmed it
//! - One failing note never stops the rest of a run
//! - Runs never overlap
//! - Deletes are local only

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connectivity;
mod error;
mod http;
mod scheduler;
mod state;
mod transport;

pub use client::{NotesClient, SubmitOutcome};
pub use config::{
    validate_endpoint, SyncConfig, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SETTLE_DELAY,
    PLACEHOLDER_ENDPOINT,
};
pub use connectivity::{probe_endpoint, Connectivity};
pub use error::{SyncError, SyncResult};
pub use http::{
    encode_form_body, parse_ack, HttpClient, HttpResponse, HttpTransport, ReqwestClient,
    FORM_CONTENT_TYPE,
};
pub use scheduler::AutoSync;
pub use state::{
    DeliveryFailure, SyncEngine, SyncOutcome, SyncReport, SyncSource, SyncState, SyncStats,
};
pub use transport::{Ack, MockTransport, SyncTransport};
