use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version, about = "Dual-store sync engine for rich-text notes")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a quill notebook in the current directory
    Init,

    /// Record a signed-in user identity for the durable store
    Login {
        /// Authenticated user id supplied by the auth system
        user_id: String,
    },

    /// Clear the signed-in identity
    Logout,

    /// Add a new note
    Add {
        /// Note title
        title: String,

        /// Read content from stdin
        #[arg(long)]
        stdin: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List notes in display order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a single note
    Get {
        /// Display position like "2" or UUID prefix like "a1b2c"
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Update a note's title or content
    Edit {
        /// Display position or UUID prefix
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// Read new content from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// Pin a note to the front of the list
    Pin {
        /// Display position or UUID prefix
        id: String,

        /// Unpin instead
        #[arg(long)]
        remove: bool,
    },

    /// Mark a note private
    Private {
        /// Display position or UUID prefix
        id: String,

        /// Clear the flag instead
        #[arg(long)]
        remove: bool,
    },

    /// Collapse a note in list views
    Collapse {
        /// Display position or UUID prefix
        id: String,

        /// Expand instead
        #[arg(long)]
        remove: bool,
    },

    /// Move a note up or down within its pin group
    Reorder {
        /// Display position or UUID prefix
        id: String,

        /// "up" or "down"
        direction: String,
    },

    /// Delete a note
    Delete {
        /// Display position or UUID prefix
        id: String,
    },

    /// Move a note to the other store
    Transfer {
        /// Display position or UUID prefix
        id: String,

        /// Target store: "cache" or "durable"
        target: String,
    },

    /// Replay queued offline mutations and reload from both stores
    Sync,

    /// Show queued offline mutations
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
