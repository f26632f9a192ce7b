mod catalog;
mod config;
mod fetch;
mod isbn;
mod output;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use config::{SyncArgs, SyncConfig};
use sync::Outcome;

/// Fallback document written, or the catalog could not be written at all.
const EXIT_FAILED: u8 = 1;
/// Bad or missing configuration; nothing fetched, nothing written.
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "shelf_sync", about = "Publish a spreadsheet book catalog as static JSON")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the sheet's CSV export and rewrite the catalog JSON
    Sync(SyncArgs),
    /// Look up book metadata on Open Library
    Isbn {
        /// ISBN-10 or ISBN-13, hyphens allowed (e.g. 978-0-06-112008-4)
        isbn: String,
        /// Request timeout in seconds
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap resolves env-backed arguments.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Some(msg) = dotenv_warning(&dotenv) {
        warn!("{}", msg);
    }

    let t0 = Instant::now();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Sync(args) => sync_catalog(args).await,
        Commands::Isbn { isbn, timeout } => lookup_isbn(&isbn, timeout).await,
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {:.1}s", elapsed.as_secs_f64());
    }

    code
}

/// A missing `.env` is normal; anything else about it is worth a warning.
fn dotenv_warning(result: &dotenvy::Result<PathBuf>) -> Option<String> {
    match result {
        Err(e) if !e.not_found() => Some(format!("Ignoring unreadable .env file: {}", e)),
        _ => None,
    }
}

async fn sync_catalog(args: SyncArgs) -> ExitCode {
    ExitCode::from(sync_status(args).await)
}

async fn sync_status(args: SyncArgs) -> u8 {
    let config = match SyncConfig::from_args(args) {
        Ok(c) => c,
        Err(e) => {
            error!("Error: {}", e);
            return EXIT_CONFIG;
        }
    };
    run_status(&config).await
}

async fn run_status(config: &SyncConfig) -> u8 {
    match sync::run(config).await {
        Ok(Outcome::Complete { written, dropped }) => {
            println!(
                "Saved {} books to {} ({} invalid rows skipped).",
                written,
                config.output.display(),
                dropped
            );
            0
        }
        Ok(Outcome::Degraded(cause)) => {
            println!(
                "Books not available ({}): wrote an empty catalog to {}.",
                cause,
                config.output.display()
            );
            EXIT_FAILED
        }
        Err(e) => {
            error!("Error writing catalog: {}", e);
            EXIT_FAILED
        }
    }
}

async fn lookup_isbn(input: &str, timeout: u64) -> ExitCode {
    let summary = match isbn::search(input, Duration::from_secs(timeout.max(1))).await {
        Ok(s) => s,
        Err(e) => {
            error!("Error: {:#}", e);
            return ExitCode::from(EXIT_FAILED);
        }
    };

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error encoding result: {}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}
