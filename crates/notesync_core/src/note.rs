//! The note model.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

/// Identifier of a note: milliseconds since the Unix epoch at first save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw id value, also the store key.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<i64> for NoteId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A persisted note.
///
/// The same value is written to the note store and the sync queue, and is
/// what the transport delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Primary key in both stores.
    pub id: NoteId,
    /// Optional display title.
    pub title: Option<String>,
    /// Free-text body.
    pub content: String,
    /// Creation or last-modified instant, millisecond precision.
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

impl Note {
    /// Creates a note. The timestamp is truncated to milliseconds.
    #[must_use]
    pub fn new(
        id: NoteId,
        title: Option<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            content: content.into(),
            timestamp: timestamp.trunc_subsecs(3),
        }
    }

    /// Title for display, falling back to `"Untitled Note"`.
    #[must_use]
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "Untitled Note",
        }
    }

    /// The first `max_chars` characters of the content, with `...` appended
    /// when cut.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

/// Input to a save: a note that may not have an id or timestamp yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    /// Existing id when updating, `None` for a new note.
    pub id: Option<NoteId>,
    /// Optional title.
    pub title: Option<String>,
    /// Body text.
    pub content: String,
    /// Explicit timestamp; stamped at save time when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NoteDraft {
    /// Creates a draft for a new note.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Targets an existing note.
    #[must_use]
    pub fn with_id(mut self, id: NoteId) -> Self {
        self.id = Some(id);
        self
    }

    /// Pins the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl From<Note> for NoteDraft {
    fn from(note: Note) -> Self {
        Self {
            id: Some(note.id),
            title: note.title,
            content: note.content,
            timestamp: Some(note.timestamp),
        }
    }
}

/// Issues note ids from the wall clock.
///
/// Ids are `max(now_ms, last + 1)`, so they are unique and increasing even
/// when several notes are created within one millisecond or the clock
/// steps back.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    /// Creates a generator that issues ids above `last`.
    #[must_use]
    pub fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    /// Next id for the current time.
    pub fn next(&self) -> NoteId {
        self.next_at(now_millis())
    }

    /// Next id for a clock reading of `now_ms`.
    pub fn next_at(&self, now_ms: i64) -> NoteId {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(current.saturating_add(1));
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return NoteId(candidate),
                Err(actual) => current = actual,
            }
        }
    }

    /// Records an id issued elsewhere so later ids stay above it.
    pub fn observe(&self, id: NoteId) {
        self.last.fetch_max(id.0, Ordering::AcqRel);
    }
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current instant truncated to milliseconds.
#[must_use]
pub fn now_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// `YYYY-MM-DDTHH:MM:SS.mmmZ` timestamps.
mod iso_millis {
    use super::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Note {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        Note::new(NoteId::new(1_709_285_400_000), Some("Groceries".into()), "milk", ts)
    }

    #[test]
    fn json_matches_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1_709_285_400_000_i64,
                "title": "Groceries",
                "content": "milk",
                "timestamp": "2024-03-01T09:30:00.000Z",
            })
        );
    }

    #[test]
    fn missing_title_serializes_as_null() {
        let mut note = sample();
        note.title = None;
        let json = serde_json::to_value(&note).unwrap();
        assert!(json["title"].is_null());
    }

    #[test]
    fn timestamps_are_truncated_to_millis() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let note = Note::new(NoteId::new(1), None, "x", ts);
        assert_eq!(note.timestamp.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn display_title_falls_back() {
        let mut note = sample();
        assert_eq!(note.display_title(), "Groceries");
        note.title = Some("   ".into());
        assert_eq!(note.display_title(), "Untitled Note");
        note.title = None;
        assert_eq!(note.display_title(), "Untitled Note");
    }

    #[test]
    fn preview_cuts_long_content() {
        let mut note = sample();
        note.content = "a".repeat(200);
        let preview = note.preview(150);
        assert_eq!(preview.len(), 153);
        assert!(preview.ends_with("..."));

        note.content = "short".into();
        assert_eq!(note.preview(150), "short");
    }

    #[test]
    fn ids_increase_within_one_millisecond() {
        let ids = IdGenerator::default();
        let a = ids.next_at(1_000);
        let b = ids.next_at(1_000);
        let c = ids.next_at(999);
        assert_eq!(a.as_i64(), 1_000);
        assert_eq!(b.as_i64(), 1_001);
        assert_eq!(c.as_i64(), 1_002);
        assert_eq!(ids.next_at(5_000).as_i64(), 5_000);
    }

    #[test]
    fn observed_ids_are_skipped() {
        let ids = IdGenerator::starting_after(10);
        ids.observe(NoteId::new(50));
        ids.observe(NoteId::new(20));
        assert_eq!(ids.next_at(0).as_i64(), 51);
    }

    #[test]
    fn note_id_parses_from_text() {
        assert_eq!(" 42 ".parse::<NoteId>().unwrap(), NoteId::new(42));
        assert!("abc".parse::<NoteId>().is_err());
        assert_eq!(NoteId::new(7).to_string(), "7");
    }

    #[test]
    fn draft_from_note_keeps_identity() {
        let note = sample();
        let draft = NoteDraft::from(note.clone());
        assert_eq!(draft.id, Some(note.id));
        assert_eq!(draft.timestamp, Some(note.timestamp));
    }
}
