//! Database configuration.

/// Configuration for opening a [`crate::Database`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Create the database directory if it does not exist.
    pub create_if_missing: bool,

    /// Fsync every store write before acknowledging it.
    ///
    /// When false, writes are flushed to the OS only.
    pub sync_on_write: bool,

    /// Fraction of a store log that may be superseded records before the
    /// store is compacted at open.
    pub compaction_ratio: f64,

    /// Logs smaller than this many bytes are never compacted.
    pub compaction_min_bytes: u64,

    /// On-disk format version written to new manifests.
    pub format_version: (u16, u16),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            compaction_ratio: 0.5,
            compaction_min_bytes: 64 * 1024,
            format_version: (1, 0),
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether every write is fsynced.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the superseded-bytes ratio that triggers compaction.
    #[must_use]
    pub fn compaction_ratio(mut self, ratio: f64) -> Self {
        self.compaction_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Sets the minimum log size considered for compaction.
    #[must_use]
    pub const fn compaction_min_bytes(mut self, bytes: u64) -> Self {
        self.compaction_min_bytes = bytes;
        self
    }
}
