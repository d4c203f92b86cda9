//! Sync commands: sync, status, watch.

use super::CommandResult;
use notesync_core::Database;
use notesync_sync_engine::{probe_endpoint, NotesClient, SyncConfig, SyncOutcome, SyncState};
use std::path::Path;
use std::time::Duration;

pub async fn sync(client: &NotesClient) -> CommandResult {
    let outcome = client.sync_now().await?;
    println!("{outcome}");
    if let SyncOutcome::Completed(report) = &outcome {
        for failure in &report.failures {
            println!("  {}: {}", failure.id, failure.reason);
        }
    }
    Ok(())
}

pub async fn status(client: &NotesClient, config: &SyncConfig, data_dir: &Path) -> CommandResult {
    let repo = client.repository();
    let notes = repo.load_all().await?.len();
    let pending = repo.pending_count().await?;
    let db: &Database = repo.database();

    println!("Data directory: {}", data_dir.display());
    println!("Schema version: {}", db.schema_version());
    if config.is_configured() {
        println!("Endpoint:       {}", config.endpoint.trim());
    } else {
        println!("Endpoint:       not configured");
    }
    let online = if client.connectivity().is_online() {
        "online"
    } else {
        "offline"
    };
    println!("Connectivity:   {online}");
    println!("Notes:          {notes}");
    println!("Pending sync:   {pending}");
    Ok(())
}

pub async fn watch(client: &NotesClient, config: &SyncConfig, interval: Duration) -> CommandResult {
    if !config.is_configured() {
        return Err("watch needs a configured --endpoint".into());
    }

    println!(
        "Watching connectivity every {}s (Ctrl-C to stop)",
        interval.as_secs()
    );
    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let online = probe_endpoint(&config.endpoint, interval).await;
                if client.connectivity().set_online(online) {
                    println!("{}", if online { "Back online" } else { "Went offline" });
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    let stats = client.engine().stats();
    let state = match client.engine().state() {
        SyncState::Idle => "idle",
        SyncState::Syncing => "syncing",
        SyncState::Synced => "synced",
        SyncState::Failed => "failed",
        SyncState::Offline => "offline",
    };
    println!(
        "Stopped. {} run(s), {} delivered, {} failed; last state {state}",
        stats.runs, stats.delivered, stats.failures
    );
    Ok(())
}
