//! Command-line definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Waymark - durable, queryable checkpoints for AI coding sessions
#[derive(Parser, Debug)]
#[command(name = "waymark")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prepare the repository for checkpointing (idempotent)
    Init {
        /// Persistence strategy: manual-commit or auto-commit
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Agent hook entry points; adapters pipe normalized JSON on stdin
    Hook {
        #[command(subcommand)]
        event: HookEvent,
    },

    /// Restore working tree and logs to a checkpoint
    Rewind {
        /// Checkpoint id to restore
        id: String,
    },

    /// List restore candidates, newest first
    Points {
        /// Maximum points to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List recorded sessions
    Sessions {
        /// Maximum sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Aggregated per-session numbers
    Insights,

    /// Remove shadow branches and state for ended sessions
    Cleanup,

    /// Detached review worker entry point
    #[command(hide = true)]
    ReviewWorker,
}

#[derive(Subcommand, Debug)]
pub enum HookEvent {
    /// A user prompt started a turn
    UserPrompt,

    /// An agent turn finished
    TurnEnd,

    /// A sub-agent/task boundary inside a turn
    TaskCheckpoint,

    /// Git prepare-commit-msg hook; receives the message file
    PrepareCommitMsg {
        message_file: PathBuf,

        /// Commit source and sha that git may also pass; unused
        #[arg(hide = true)]
        extra: Vec<String>,
    },

    /// Git post-commit hook
    PostCommit,

    /// The session stopped
    SessionEnd,
}
