use std::time::Duration;

use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::table::ParseError;
use crate::catalog::{self, Catalog};
use crate::config::SyncConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::output::{self, WriteError};

/// Failures that degrade a run to the empty fallback document.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("error parsing CSV: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug)]
pub enum Outcome {
    Complete { written: usize, dropped: usize },
    Degraded(PipelineError),
}

/// Fetch, parse, repair, filter and persist the catalog.
///
/// Fetch and parse failures still leave a valid `[]` document at the output
/// path and are reported as `Outcome::Degraded`. Only a write failure is an
/// `Err`.
pub async fn run(config: &SyncConfig) -> Result<Outcome, WriteError> {
    match fetch_catalog(config).await {
        Ok(catalog) => {
            output::write_catalog(&config.output, &catalog.records)?;
            info!(
                "Successfully saved {} books to {}",
                catalog.records.len(),
                config.output.display()
            );
            Ok(Outcome::Complete {
                written: catalog.records.len(),
                dropped: catalog.dropped,
            })
        }
        Err(e) => {
            error!("{}", e);
            output::write_empty(&config.output)?;
            warn!("Wrote empty catalog to {}", config.output.display());
            Ok(Outcome::Degraded(e))
        }
    }
}

async fn fetch_catalog(config: &SyncConfig) -> Result<Catalog, PipelineError> {
    let fetcher = Fetcher::new(config.timeout, config.max_redirects)?;

    info!("Fetching catalog export: {}", config.export_url);
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Downloading sheet export...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    let body = fetcher.fetch(&config.export_url).await;
    spinner.finish_and_clear();
    let body = body?;

    let catalog = catalog::build_catalog(&body, &config.fields, &config.policy)?;
    info!(
        "Parsed {} rows: {} kept, {} dropped as invalid",
        catalog.parsed,
        catalog.records.len(),
        catalog.dropped
    );
    Ok(catalog)
}
