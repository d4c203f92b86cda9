//! CLI command implementations.

pub mod notes;
pub mod sync;

/// Result type shared by the commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
