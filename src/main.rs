// ABOUTME: CLI entry point for pg-packager
// ABOUTME: Parses commands, sets up logging and Ctrl-C cancellation, routes to handlers

use clap::{Parser, Subcommand};
use pg_packager::commands::{self, ExportOptions, ImportOptions};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "pg-packager")]
#[command(
    about = "Package a PostgreSQL database's schema and data into one file and replay it",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Script a database's schema and table data into a package file
    Export {
        /// Source connection string
        #[arg(long)]
        connection: String,
        /// Package file to create (must not exist)
        #[arg(long)]
        output: PathBuf,
        /// Database to export (defaults to the connection's dbname)
        #[arg(long)]
        catalog: Option<String>,
        /// Tables whose data is left out (comma-separated, case-insensitive)
        #[arg(long, value_delimiter = ',')]
        ignore: Vec<String>,
        /// Path to a TOML file with category toggles and ignore-list
        #[arg(long = "config")]
        config_path: Option<PathBuf>,
        /// Log verbosity: 1=info, 2=warn, 3=trace, 4=debug
        #[arg(long, default_value_t = 1)]
        logging: u8,
        /// Treat any non-fatal error as fatal
        #[arg(long)]
        strict: bool,
    },
    /// Replay a package file into a target database
    Import {
        /// Target connection string
        #[arg(long)]
        connection: String,
        /// Package file to import
        #[arg(long)]
        input: PathBuf,
        /// Log verbosity: 1=info, 2=warn, 3=trace, 4=debug
        #[arg(long, default_value_t = 1)]
        logging: u8,
        /// Treat any failed batch as fatal
        #[arg(long)]
        strict: bool,
    },
}

impl Commands {
    fn logging(&self) -> u8 {
        match self {
            Commands::Export { logging, .. } | Commands::Import { logging, .. } => *logging,
        }
    }
}

fn log_level(logging: u8) -> &'static str {
    match logging {
        2 => "warn",
        3 => "trace",
        4 => "debug",
        _ => "info",
    }
}

/// Cancel the returned token on the first Ctrl-C
fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Received Ctrl-C, cancelling after the current step...");
                token.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(log_level(cli.command.logging()))
            }),
        )
        .init();

    let cancel = setup_signal_handler();

    match cli.command {
        Commands::Export {
            connection,
            output,
            catalog,
            ignore,
            config_path,
            strict,
            ..
        } => {
            let options = ExportOptions {
                connection,
                output,
                catalog,
                ignore,
                config_path,
                strict,
            };
            commands::export(options, cancel).await
        }
        Commands::Import {
            connection,
            input,
            strict,
            ..
        } => {
            let options = ImportOptions {
                connection,
                input,
                strict,
            };
            commands::import(options, cancel).await
        }
    }
}
