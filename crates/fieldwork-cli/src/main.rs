//! Fieldwork CLI - operator interface for the offline sync engine
//!
//! Stage mutations, inspect the queue, flush deliveries, and work through
//! conflicts from the terminal.

mod cli;
mod commands;
mod error;

use std::env;
use std::path::PathBuf;

use clap::Parser;

use crate::cli::{Cli, Commands, ConflictCommands, QueueCommands, RecordCommands};
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
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fieldwork=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Stage {
            op_type,
            data_type,
            resource_id,
            payload,
            file,
            priority,
        } => {
            commands::stage::run_stage(
                op_type,
                &data_type,
                &resource_id,
                payload.as_deref(),
                file.as_deref(),
                priority,
                &db_path,
            )?;
        }
        Commands::Queue { command } => match command {
            QueueCommands::List {
                status,
                limit,
                json,
            } => commands::queue::run_list(status, limit, json, &db_path)?,
            QueueCommands::Stats { json } => commands::queue::run_stats(json, &db_path)?,
            QueueCommands::Retry { id } => commands::queue::run_retry(&id, &db_path)?,
            QueueCommands::Cancel { id } => commands::queue::run_cancel(&id, &db_path)?,
        },
        Commands::Flush { workers, json } => {
            commands::flush::run_flush(workers, json, &db_path).await?;
        }
        Commands::Conflicts { command } => match command {
            ConflictCommands::List { limit, all, json } => {
                commands::conflicts::run_list(limit, all, json, &db_path)?;
            }
            ConflictCommands::Show { id, json } => {
                commands::conflicts::run_show(&id, json, &db_path)?;
            }
            ConflictCommands::Resolve {
                id,
                strategy,
                payload,
                file,
            } => {
                commands::conflicts::run_resolve(
                    &id,
                    strategy,
                    payload.as_deref(),
                    file.as_deref(),
                    &db_path,
                )?;
            }
            ConflictCommands::Dismiss { id } => commands::conflicts::run_dismiss(&id, &db_path)?,
        },
        Commands::Record { command } => match command {
            RecordCommands::Show {
                data_type,
                resource_id,
                json,
            } => commands::record::run_show(&data_type, &resource_id, json, &db_path)?,
        },
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("FIELDWORK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldwork")
        .join("fieldwork.db")
}
