//! Encore CLI - follow and drive a live song-request queue from the terminal
//!
//! Guests request and up-vote songs; operators lock the one playing next.

mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::{Cli, Commands};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::demo::run_demo;
use crate::commands::lock::{run_lock, run_unlock};
use crate::commands::queue::run_queue;
use crate::commands::songs::run_songs;
use crate::commands::submit::run_submit;
use crate::commands::vote::run_vote;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy()
                .add_directive(encore_directive()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Some(Commands::Queue { limit, json }) => run_queue(limit, json, profile).await?,
        Some(Commands::Submit {
            title,
            artist,
            name,
            message,
        }) => run_submit(title, artist, name, message, profile).await?,
        Some(Commands::Vote { id }) => run_vote(&id, profile).await?,
        Some(Commands::Lock { id }) => run_lock(&id, profile).await?,
        Some(Commands::Unlock { id }) => run_unlock(&id, profile).await?,
        Some(Commands::Songs { limit, json }) => run_songs(limit, json, profile).await?,
        Some(Commands::Watch { limit }) => run_watch(limit, profile).await?,
        Some(Commands::Demo) => run_demo().await?,
        Some(Commands::Config { command }) => run_config(command, profile)?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}

fn encore_directive() -> tracing_subscriber::filter::Directive {
    "encore=info"
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into())
}

#[cfg(test)]
mod tests;
