//! Note commands: add, edit, delete, list, pending.

use super::CommandResult;
use crate::Format;
use notesync_core::{Note, NoteId};
use notesync_sync_engine::{NotesClient, SubmitOutcome, SyncError};

/// Characters of content shown per note in text listings.
const PREVIEW_CHARS: usize = 150;

pub async fn add(client: &NotesClient, title: &str, content: &str) -> CommandResult {
    let outcome = client.submit(title, content).await.map_err(explain)?;
    report_submit(client, "Saved", &outcome);
    Ok(())
}

pub async fn edit(
    client: &NotesClient,
    id: NoteId,
    title: Option<String>,
    content: Option<String>,
) -> CommandResult {
    let current = client.begin_edit(id).await?;
    let title = title.unwrap_or_else(|| current.title.clone().unwrap_or_default());
    let content = content.unwrap_or(current.content);

    let outcome = match client.submit(&title, &content).await {
        Ok(outcome) => outcome,
        Err(e) => {
            client.cancel_edit();
            return Err(explain(e));
        }
    };
    report_submit(client, "Updated", &outcome);
    Ok(())
}

pub async fn delete(client: &NotesClient, id: NoteId) -> CommandResult {
    if client.delete(id).await? {
        tracing::debug!(%id, "note deleted");
        println!("Deleted note {id}");
    } else {
        println!("No note with id {id}");
    }
    Ok(())
}

pub async fn list(client: &NotesClient, format: Format) -> CommandResult {
    let notes = client.notes().await?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&notes)?),
        Format::Text => print_cards(&notes),
    }
    Ok(())
}

pub async fn pending(client: &NotesClient) -> CommandResult {
    let mut notes = client.repository().pending().await?;
    notes.sort_by_key(|note| note.id);
    if notes.is_empty() {
        println!("No notes waiting to sync.");
        return Ok(());
    }
    println!("{} note(s) waiting to sync:", notes.len());
    for note in &notes {
        println!("  {}  {}", note.id, note.display_title());
    }
    Ok(())
}

fn print_cards(notes: &[Note]) {
    if notes.is_empty() {
        println!("No notes yet.");
        return;
    }
    for (i, note) in notes.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("[{}] {}", note.id, note.display_title());
        println!("    {}", note.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("    {}", note.preview(PREVIEW_CHARS));
    }
}

fn report_submit(client: &NotesClient, verb: &str, outcome: &SubmitOutcome) {
    println!("{verb} note {}", outcome.note.id);
    println!("{}", sync_message(outcome, client.connectivity().is_online()));
}

/// What happened to the note after the local save.
fn sync_message(outcome: &SubmitOutcome, online: bool) -> String {
    match &outcome.sync {
        Some(sync) => sync.to_string(),
        None if online => {
            tracing::warn!(id = %outcome.note.id, "sync after save failed");
            "Sync failed; the note stays queued and will be retried.".to_string()
        }
        None => "Saved offline; it will sync when a connection is available.".to_string(),
    }
}

fn explain(err: SyncError) -> Box<dyn std::error::Error> {
    match err {
        SyncError::EmptyNote => "a note needs a title or some content".into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_sync_engine::{SyncOutcome, SyncReport};
    use std::time::Duration;

    fn outcome(sync: Option<SyncOutcome>) -> SubmitOutcome {
        SubmitOutcome {
            note: Note::new(
                NoteId::new(1_700_000_000_000),
                None,
                "body",
                notesync_core::now_timestamp(),
            ),
            sync,
        }
    }

    #[test]
    fn missing_sync_explains_why() {
        assert!(sync_message(&outcome(None), false).starts_with("Saved offline"));
        assert!(sync_message(&outcome(None), true).starts_with("Sync failed"));
    }

    #[test]
    fn finished_sync_is_reported() {
        let report = SyncReport {
            attempted: 1,
            succeeded: 1,
            failed: 0,
            failures: Vec::new(),
            duration: Duration::from_millis(5),
        };
        let message = sync_message(&outcome(Some(SyncOutcome::Completed(report))), true);
        assert_eq!(message, "synchronization complete: 1 succeeded, 0 failed");
    }
}
