//! notesync CLI
//!
//! A command-line notes client. Notes are saved locally first and
//! delivered to the configured endpoint whenever the device is online.
//!
//! # Commands
//!
//! - `add` - Save a new note
//! - `edit` - Update an existing note
//! - `delete` - Delete a note locally
//! - `list` - Show all notes, newest first
//! - `pending` - Show notes waiting to be synced
//! - `sync` - Deliver pending notes now
//! - `status` - Show connectivity and queue state
//! - `watch` - Probe connectivity and sync automatically on reconnect

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use notesync_core::{Database, NoteId};
use notesync_sync_engine::{probe_endpoint, Connectivity, NotesClient, SyncConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Offline-first notes with best-effort sync.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the local database
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Endpoint URL that receives synced notes
    #[arg(global = true, short, long)]
    endpoint: Option<String>,

    /// Treat the device as offline; nothing is sent
    #[arg(global = true, long)]
    offline: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a new note
    Add {
        /// Note title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Note body
        #[arg(short, long, default_value = "")]
        content: String,
    },

    /// Update an existing note
    Edit {
        /// Id of the note to update
        id: NoteId,

        /// New title (keeps the current one if omitted)
        #[arg(short, long)]
        title: Option<String>,

        /// New body (keeps the current one if omitted)
        #[arg(short, long)]
        content: Option<String>,
    },

    /// Delete a note locally (the remote copy is kept)
    Delete {
        /// Id of the note to delete
        id: NoteId,
    },

    /// Show all notes, newest first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show notes waiting to be synced
    Pending,

    /// Deliver pending notes now
    Sync,

    /// Show connectivity and queue state
    Status,

    /// Probe connectivity and sync after each reconnect
    Watch {
        /// Seconds between connectivity probes
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
    },
}

/// Output format for listings.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Format {
    /// Human-readable cards
    Text,
    /// JSON array of notes
    Json,
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let config = match cli.endpoint {
        Some(endpoint) => SyncConfig::new(endpoint),
        None => SyncConfig::default(),
    };

    let online = initial_online(cli.offline, &config).await;
    tracing::debug!(data_dir = %data_dir.display(), online, "opening notes database");
    let connectivity = Connectivity::new(online);
    let db = Database::open(&data_dir)?;
    let client = NotesClient::open_http(db, &config, connectivity)?;

    let result = match cli.command {
        Commands::Add { title, content } => commands::notes::add(&client, &title, &content).await,
        Commands::Edit { id, title, content } => {
            commands::notes::edit(&client, id, title, content).await
        }
        Commands::Delete { id } => commands::notes::delete(&client, id).await,
        Commands::List { format } => commands::notes::list(&client, format).await,
        Commands::Pending => commands::notes::pending(&client).await,
        Commands::Sync => commands::sync::sync(&client).await,
        Commands::Status => commands::sync::status(&client, &config, &data_dir).await,
        Commands::Watch { interval } => {
            if cli.offline {
                Err("watch probes the network; drop --offline".into())
            } else {
                commands::sync::watch(&client, &config, Duration::from_secs(interval.max(1))).await
            }
        }
    };

    client.close()?;
    result
}

fn default_data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dirs = ProjectDirs::from("com", "notesync", "notesync")
        .ok_or("could not determine a data directory; pass --data-dir")?;
    Ok(dirs.data_dir().join("db"))
}

/// Online unless forced offline. A configured endpoint is probed; without
/// one there is nothing to probe and deliveries fail as unconfigured.
async fn initial_online(forced_offline: bool, config: &SyncConfig) -> bool {
    if forced_offline {
        return false;
    }
    if !config.is_configured() {
        return true;
    }
    probe_endpoint(&config.endpoint, PROBE_TIMEOUT).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "notesync",
            "edit",
            "1700000000000",
            "--content",
            "body",
            "--offline",
        ])
        .unwrap();
        assert!(cli.offline);
        match cli.command {
            Commands::Edit { id, title, content } => {
                assert_eq!(id, NoteId::new(1_700_000_000_000));
                assert_eq!(title, None);
                assert_eq!(content.as_deref(), Some("body"));
            }
            _ => panic!("expected edit"),
        }
    }

    #[test]
    fn forced_offline_skips_probing() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let config = SyncConfig::new("http://127.0.0.1:9/exec");
        assert!(!rt.block_on(initial_online(true, &config)));
        assert!(rt.block_on(initial_online(false, &SyncConfig::default())));
    }
}
