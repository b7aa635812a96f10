//! CLI binary entry point: thin client over the daemon's HTTP surface,
//! with one sub-command per supported verb.

mod client;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use client::ClientError;
use output::{render_error, CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "sparkle: thin client over the local sparkle daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pretty-print one item's current aggregate state.
    Cat(cmd::cat::CatArgs),
    /// Show the dependency DAG relative to one item.
    Inspect(cmd::inspect::InspectArgs),
    /// Open the OS default browser at the daemon's address.
    Browser,
    /// List items whose tagline contains a substring.
    FindItem(cmd::find_item::FindItemArgs),
    /// Create a new item and print its id.
    CreateItem(cmd::create_item::CreateItemArgs),
    /// Append a journal entry read from stdin.
    AddEntry(cmd::add_entry::AddEntryArgs),
    /// Mutate one field of an item (status, monitoring, visibility, responsibility).
    Alter(cmd::alter::AlterArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SPARKLE_LOG").unwrap_or_else(|_| EnvFilter::new("sparkle=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Exit codes: `0` success, `1` request/validation error, `2`
/// the daemon could not be reached at all.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ClientError>() {
        Some(ClientError::DaemonUnreachable | ClientError::Spawn(_)) => 2,
        _ => 1,
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let repo_root: PathBuf = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("error: could not resolve the current directory: {err}");
            std::process::exit(1);
        }
    };

    let json = match &cli.command {
        Commands::Cat(a) => a.json,
        Commands::Inspect(a) => a.json,
        Commands::FindItem(a) => a.json,
        Commands::CreateItem(a) => a.json,
        Commands::AddEntry(a) => a.json,
        Commands::Alter(a) => a.json,
        Commands::Browser => false,
    };

    let result = match &cli.command {
        Commands::Cat(args) => cmd::cat::run(args, &repo_root),
        Commands::Inspect(args) => cmd::inspect::run(args, &repo_root),
        Commands::Browser => cmd::browser::run(&repo_root),
        Commands::FindItem(args) => cmd::find_item::run(args, &repo_root),
        Commands::CreateItem(args) => cmd::create_item::run(args, &repo_root),
        Commands::AddEntry(args) => cmd::add_entry::run(args, &repo_root),
        Commands::Alter(args) => cmd::alter::run(args, &repo_root),
    };

    if let Err(err) = result {
        let mode = OutputMode::from_flag(json);
        let _ = render_error(mode, &CliError::new(err.to_string()));
        std::process::exit(exit_code_for(&err));
    }
}
