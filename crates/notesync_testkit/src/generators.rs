//! Property-based test generators using proptest.

use chrono::{DateTime, TimeZone, Utc};
use notesync_core::{Note, NoteDraft, NoteId};
use proptest::prelude::*;

/// Strategy for note ids in a plausible millisecond-timestamp range.
pub fn note_id_strategy() -> impl Strategy<Value = NoteId> {
    (1_500_000_000_000i64..2_000_000_000_000).prop_map(NoteId::new)
}

/// Strategy for a small id pool, so generated operations collide often.
pub fn colliding_id_strategy() -> impl Strategy<Value = NoteId> {
    (1i64..8).prop_map(NoteId::new)
}

/// Strategy for millisecond-precision UTC timestamps.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_500_000_000_000i64..2_000_000_000_000).prop_map(|ms| {
        Utc.timestamp_millis_opt(ms)
            .single()
            .expect("timestamp in range")
    })
}

/// Strategy for optional titles, including blank ones.
pub fn title_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        "[A-Za-z0-9 ]{1,40}".prop_map(Some),
    ]
}

/// Strategy for note bodies, including non-ASCII text.
pub fn content_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 .,!?\n]{0,200}",
        "\\PC{0,80}",
    ]
}

/// Strategy for complete notes.
pub fn note_strategy() -> impl Strategy<Value = Note> {
    (
        note_id_strategy(),
        title_strategy(),
        content_strategy(),
        timestamp_strategy(),
    )
        .prop_map(|(id, title, content, timestamp)| Note::new(id, title, content, timestamp))
}

/// Strategy for drafts targeting a small set of ids.
pub fn draft_strategy() -> impl Strategy<Value = NoteDraft> {
    (
        colliding_id_strategy(),
        title_strategy(),
        content_strategy(),
        timestamp_strategy(),
    )
        .prop_map(|(id, title, content, timestamp)| NoteDraft {
            id: Some(id),
            title,
            content,
            timestamp: Some(timestamp),
        })
}

/// A repository operation for sequence tests.
#[derive(Debug, Clone)]
pub enum NoteOp {
    /// Save a draft.
    Save(NoteDraft),
    /// Remove a note.
    Remove(NoteId),
}

/// Strategy for operation sequences over a small id pool.
pub fn note_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<NoteOp>> {
    prop::collection::vec(
        prop_oneof![
            3 => draft_strategy().prop_map(NoteOp::Save),
            1 => colliding_id_strategy().prop_map(NoteOp::Remove),
        ],
        0..max_len,
    )
}
