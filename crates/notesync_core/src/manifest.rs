//! Database manifest.
//!
//! The manifest records the on-disk format version, the schema version
//! reached by migrations and the set of object stores. It is stored as
//!
//! ```text
//! | magic "NSMF" | manifest version u16 | CBOR body |
//! ```

use crate::error::{StorageError, StorageResult};
use crate::migration::SchemaVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Magic bytes at the start of a manifest.
pub const MANIFEST_MAGIC: [u8; 4] = *b"NSMF";

/// Current manifest layout version.
pub const MANIFEST_VERSION: u16 = 1;

/// Database metadata persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// On-disk format version (major, minor).
    pub format_version: (u16, u16),
    /// Schema version reached by migrations; 0 for a fresh database.
    pub schema_version: SchemaVersion,
    /// Names of existing object stores.
    pub stores: BTreeSet<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new((1, 0))
    }
}

impl Manifest {
    /// Creates an empty manifest at schema version 0.
    #[must_use]
    pub fn new(format_version: (u16, u16)) -> Self {
        Self {
            format_version,
            schema_version: 0,
            stores: BTreeSet::new(),
        }
    }

    /// Returns whether a store named `name` exists.
    #[must_use]
    pub fn has_store(&self, name: &str) -> bool {
        self.stores.contains(name)
    }

    /// Encodes the manifest.
    ///
    /// # Errors
    ///
    /// Fails if CBOR serialization fails.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| StorageError::codec(format!("manifest encode: {e}")))?;
        Ok(buf)
    }

    /// Decodes a manifest.
    ///
    /// # Errors
    ///
    /// Fails on a bad magic, an unsupported layout version or a malformed
    /// body.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        if data.len() < 6 || data[..4] != MANIFEST_MAGIC {
            return Err(StorageError::invalid_format("invalid manifest magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > MANIFEST_VERSION {
            return Err(StorageError::invalid_format(format!(
                "unsupported manifest version: {version}"
            )));
        }
        ciborium::from_reader(&data[6..])
            .map_err(|e| StorageError::invalid_format(format!("manifest body: {e}")))
    }
}
