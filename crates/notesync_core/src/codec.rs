//! On-disk encoding of notes.
//!
//! Note payloads in both the note store and the sync queue are CBOR. The
//! encoding is deterministic for a given note, which lets the queue compare
//! payloads byte-for-byte when acknowledging a delivery.

use crate::error::{StorageError, StorageResult};
use crate::note::Note;

/// Encodes a note as CBOR.
///
/// # Errors
///
/// Fails only if serialization fails.
pub fn encode_note(note: &Note) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 + note.content.len());
    ciborium::into_writer(note, &mut buf)
        .map_err(|e| StorageError::codec(format!("encode note {}: {e}", note.id)))?;
    Ok(buf)
}

/// Decodes a CBOR note payload.
///
/// # Errors
///
/// Fails if the bytes are not a valid note.
pub fn decode_note(bytes: &[u8]) -> StorageResult<Note> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::codec(format!("decode note: {e}")))
}
