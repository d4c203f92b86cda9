//! Store record format.
//!
//! Every object store is an append-only log of records:
//!
//! ```text
//! | len u32 | flags u8 | key i64 | sequence u64 | payload (N) | crc32 u32 |
//! ```
//!
//! All integers are little endian. `len` counts the whole record including
//! itself and the CRC; the CRC covers every byte before it.
//!
//! ## Replay policy
//!
//! - A truncated header or a record running past the end of the log is a
//!   torn write from a crash. Replay stops there and reports the last good
//!   offset so the tail can be cut.
//! - An impossible length is also torn when it cannot be followed by a whole
//!   record, or when every byte from there to the end is zero (a file
//!   extended but never written).
//! - A CRC mismatch, or an impossible length followed by data, is corruption
//!   and fails the open.

use crate::error::{StorageError, StorageResult};

/// Record flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// A live value.
    pub const NONE: Self = Self(0);
    /// The key was deleted.
    pub const TOMBSTONE: Self = Self(0x01);

    /// Creates flags from the raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks the tombstone bit.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// One entry in a store log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    /// Record key (the note id).
    pub key: i64,
    /// Record flags.
    pub flags: RecordFlags,
    /// Per-store write sequence.
    pub sequence: u64,
    /// Encoded value; empty for tombstones.
    pub payload: Vec<u8>,
}

impl StoreRecord {
    /// len (4) + flags (1) + key (8) + sequence (8)
    pub const HEADER_SIZE: usize = 21;
    /// Trailing checksum size.
    pub const CRC_SIZE: usize = 4;

    /// Creates a put record.
    #[must_use]
    pub fn put(key: i64, payload: Vec<u8>, sequence: u64) -> Self {
        Self {
            key,
            flags: RecordFlags::NONE,
            sequence,
            payload,
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(key: i64, sequence: u64) -> Self {
        Self {
            key,
            flags: RecordFlags::TOMBSTONE,
            sequence,
            payload: Vec::new(),
        }
    }

    /// Returns whether this record deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Returns the encoded size in bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + Self::CRC_SIZE
    }

    /// Encodes the record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let record_len = self.encoded_size();
        let mut buf = Vec::with_capacity(record_len);
        buf.extend_from_slice(&(record_len as u32).to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&self.key.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes exactly one record from `data`.
    ///
    /// # Errors
    ///
    /// Fails if `data` is not a complete record or the checksum is wrong.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        match scan_record(data)? {
            Scan::Record(record, _) => Ok(record),
            Scan::Torn => Err(StorageError::invalid_format("incomplete record")),
        }
    }
}

/// Outcome of scanning one record at the front of a buffer.
enum Scan {
    Record(StoreRecord, usize),
    Torn,
}

fn scan_record(data: &[u8]) -> StorageResult<Scan> {
    if data.len() < 4 {
        return Ok(Scan::Torn);
    }
    let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let min_len = StoreRecord::HEADER_SIZE + StoreRecord::CRC_SIZE;
    if record_len < min_len {
        if data.len() < min_len || data.iter().all(|&b| b == 0) {
            return Ok(Scan::Torn);
        }
        return Err(StorageError::invalid_format(format!(
            "record length {record_len} below minimum"
        )));
    }
    if data.len() < record_len {
        return Ok(Scan::Torn);
    }

    let body = &data[..record_len - StoreRecord::CRC_SIZE];
    let tail = &data[record_len - StoreRecord::CRC_SIZE..record_len];
    let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let actual = compute_crc32(body);
    if expected != actual {
        return Err(StorageError::ChecksumMismatch { expected, actual });
    }

    let mut key = [0u8; 8];
    key.copy_from_slice(&data[5..13]);
    let mut sequence = [0u8; 8];
    sequence.copy_from_slice(&data[13..21]);

    let record = StoreRecord {
        key: i64::from_le_bytes(key),
        flags: RecordFlags::from_byte(data[4]),
        sequence: u64::from_le_bytes(sequence),
        payload: data[StoreRecord::HEADER_SIZE..record_len - StoreRecord::CRC_SIZE].to_vec(),
    };
    Ok(Scan::Record(record, record_len))
}

/// Result of replaying a whole log.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Complete records with their offsets, in log order.
    pub records: Vec<(u64, StoreRecord)>,
    /// Length of the log up to the end of the last complete record.
    pub valid_len: u64,
    /// Whether bytes after `valid_len` were discarded.
    pub torn_tail: bool,
}

/// Replays a log buffer into its records.
///
/// # Errors
///
/// Fails on checksum mismatch or an impossible record length.
pub fn scan_log(data: &[u8]) -> StorageResult<LogScan> {
    let mut scan = LogScan::default();
    let mut offset = 0usize;

    while offset < data.len() {
        match scan_record(&data[offset..])? {
            Scan::Record(record, len) => {
                scan.records.push((offset as u64, record));
                offset += len;
            }
            Scan::Torn => {
                scan.torn_tail = true;
                break;
            }
        }
    }

    scan.valid_len = offset as u64;
    Ok(scan)
}

/// Computes a CRC32 (IEEE polynomial) checksum.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
