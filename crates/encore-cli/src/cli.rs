use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use encore_core::Role;

#[derive(Parser)]
#[command(name = "encore")]
#[command(about = "Follow and drive a live song-request queue from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// CLI profile name holding backend and identity settings
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the ranked request queue
    #[command(alias = "ls")]
    Queue {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Request a song
    Submit {
        /// Song title
        title: String,
        /// Artist name
        artist: String,
        /// Name shown next to the request
        #[arg(short, long, value_name = "NAME")]
        name: String,
        /// Optional message for the DJ
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Up-vote a request
    Vote {
        /// Request ID or unique ID prefix
        id: String,
    },
    /// Lock a request as playing next, or unlock it if already locked
    Lock {
        /// Request ID or unique ID prefix
        id: String,
    },
    /// Clear the lock on a request
    Unlock {
        /// Request ID or unique ID prefix
        id: String,
    },
    /// List the song catalog
    Songs {
        /// Number of songs to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow the queue live until interrupted
    Watch {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Walk through the sync engine against an in-memory backend
    Demo,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RoleArg {
    Guest,
    Operator,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Guest => Self::Guest,
            RoleArg::Operator => Self::Operator,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Access token of a signed-in operator account
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
        /// Stable voter id (generated when missing)
        #[arg(long, value_name = "ID")]
        voter_id: Option<String>,
        /// Session role
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved profile
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
