//! # notesync testkit
//!
//! Test utilities for notesync.
//!
//! This crate provides:
//! - Test databases with automatic cleanup and simulated restarts
//! - A fault-injecting storage backend
//! - Property-based generators for notes and drafts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn survives_restart() {
//!     let test_db = TestDatabase::file();
//!     let repo = test_db.repository();
//!     repo.save(NoteDraft::new("hello")).await.unwrap();
//!     drop(repo);
//!     let test_db = test_db.reopen();
//!     assert_eq!(test_db.repository().load_all().await.unwrap().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fault;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fault::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fault::*;
pub use fixtures::*;
pub use generators::*;
