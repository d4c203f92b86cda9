//! Fault injection for storage backends.

use notesync_storage::{BackendError, BackendResult, StorageBackend};
use std::io;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// How a [`FaultyBackend`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultMode {
    /// Every operation passes through.
    Healthy = 0,
    /// Appends, flushes, syncs and truncations fail.
    FailWrites = 1,
    /// Appends write the first half of their bytes, then fail.
    TearAppends = 2,
    /// Appends land but the following flush or sync fails.
    FailDurability = 3,
}

impl FaultMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::FailWrites,
            2 => Self::TearAppends,
            3 => Self::FailDurability,
            _ => Self::Healthy,
        }
    }
}

/// Shared switch for a [`FaultyBackend`].
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    mode: Arc<AtomicU8>,
    injected: Arc<AtomicUsize>,
}

impl FaultSwitch {
    /// Creates a switch in the healthy position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail.
    pub fn fail(&self) {
        self.set_mode(FaultMode::FailWrites);
    }

    /// Makes appends write a prefix and then fail.
    pub fn tear_appends(&self) {
        self.set_mode(FaultMode::TearAppends);
    }

    /// Makes flush and sync fail after an append.
    pub fn fail_durability(&self) {
        self.set_mode(FaultMode::FailDurability);
    }

    /// Lets writes succeed again.
    pub fn heal(&self) {
        self.set_mode(FaultMode::Healthy);
    }

    /// The current mode.
    pub fn mode(&self) -> FaultMode {
        FaultMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Returns whether any fault is active.
    pub fn is_failing(&self) -> bool {
        self.mode() != FaultMode::Healthy
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn set_mode(&self, mode: FaultMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    fn inject(&self, op: &str) -> BackendError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        BackendError::Io(io::Error::other(format!("injected {op} fault")))
    }

    fn check(&self, op: &str, faulty_in: &[FaultMode]) -> BackendResult<()> {
        if faulty_in.contains(&self.mode()) {
            return Err(self.inject(op));
        }
        Ok(())
    }
}

/// A backend wrapper whose writes misbehave as its [`FaultSwitch`] says.
///
/// Reads always pass through, so the wrapped log stays readable. Torn
/// appends leave their prefix in the wrapped backend, the way a partial
/// write does on a real disk.
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    switch: FaultSwitch,
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wraps `inner`, controlled by `switch`.
    pub fn new(inner: B, switch: FaultSwitch) -> Self {
        Self { inner, switch }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> BackendResult<u64> {
        match self.switch.mode() {
            FaultMode::FailWrites => Err(self.switch.inject("append")),
            FaultMode::TearAppends => {
                self.inner.append(&data[..data.len() / 2])?;
                Err(self.switch.inject("torn append"))
            }
            FaultMode::Healthy | FaultMode::FailDurability => self.inner.append(data),
        }
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.switch
            .check("flush", &[FaultMode::FailWrites, FaultMode::FailDurability])?;
        self.inner.flush()
    }

    fn sync(&mut self) -> BackendResult<()> {
        self.switch
            .check("sync", &[FaultMode::FailWrites, FaultMode::FailDurability])?;
        self.inner.sync()
    }

    fn size(&self) -> BackendResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> BackendResult<()> {
        self.switch.check("truncate", &[FaultMode::FailWrites])?;
        self.inner.truncate(new_size)
    }

    fn close(&mut self) -> BackendResult<()> {
        self.inner.close()
    }
}
