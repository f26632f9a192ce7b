use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use thiserror::Error;
use url::Url;

use crate::catalog::filter::ValidityPolicy;
use crate::catalog::normalize::FieldSelection;
use crate::output::DEFAULT_OUTPUT;

const EXPORT_BASE: &str = "https://docs.google.com/spreadsheets/d/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GOOGLE_SHEET_ID is not defined (set it in the environment or .env, or pass --sheet-id)")]
    MissingSheetId,
    #[error("invalid sheet id {0:?}: only letters, digits, '-' and '_' are allowed")]
    InvalidSheetId(String),
    #[error("invalid worksheet gid {0:?}: expected digits")]
    InvalidGid(String),
    #[error("--timeout must be at least 1 second")]
    ZeroTimeout,
    #[error("failed to build export URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Keep rows whose title column is non-blank
    Title,
    /// Keep rows with at least one non-blank cell
    AnyCell,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Google Sheets document id
    #[arg(long, env = "GOOGLE_SHEET_ID")]
    pub sheet_id: Option<String>,
    /// Worksheet tab id (default: first tab)
    #[arg(long)]
    pub gid: Option<String>,
    /// Where to write the catalog JSON
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,
    /// Row validity policy
    #[arg(long, value_enum, default_value_t = PolicyArg::Title)]
    pub policy: PolicyArg,
    /// Column that must be non-blank under the title policy
    #[arg(long, default_value = "Title")]
    pub title_field: String,
    /// Column to repair formulas in (repeatable)
    #[arg(long = "clean", value_name = "FIELD", default_value = "Cover")]
    pub clean: Vec<String>,
    /// Repair formulas in every column
    #[arg(long)]
    pub clean_all: bool,
    /// Maximum redirect hops before giving up
    #[arg(long, default_value_t = 5)]
    pub max_redirects: usize,
    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,
}

/// Validated settings for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub export_url: Url,
    pub output: PathBuf,
    pub policy: ValidityPolicy,
    pub fields: FieldSelection,
    pub max_redirects: usize,
    pub timeout: Duration,
}

impl SyncConfig {
    pub fn from_args(args: SyncArgs) -> Result<Self, ConfigError> {
        let sheet_id = args
            .sheet_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSheetId)?;
        if !is_id_safe(&sheet_id) {
            return Err(ConfigError::InvalidSheetId(sheet_id));
        }

        let gid = args.gid.map(|g| g.trim().to_string());
        if let Some(g) = &gid {
            if g.is_empty() || !g.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::InvalidGid(g.clone()));
            }
        }

        if args.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let policy = match args.policy {
            PolicyArg::Title => ValidityPolicy::TitleRequired {
                field: args.title_field,
            },
            PolicyArg::AnyCell => ValidityPolicy::AnyNonBlank,
        };
        let fields = if args.clean_all {
            FieldSelection::All
        } else {
            FieldSelection::Named(args.clean)
        };

        Ok(Self {
            export_url: export_url(&sheet_id, gid.as_deref())?,
            output: args.output,
            policy,
            fields,
            max_redirects: args.max_redirects,
            timeout: Duration::from_secs(args.timeout),
        })
    }
}

/// CSV export endpoint for a sheet, optionally pinned to one tab.
pub fn export_url(sheet_id: &str, gid: Option<&str>) -> Result<Url, ConfigError> {
    let mut url = Url::parse(EXPORT_BASE)?.join(&format!("{}/export", sheet_id))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("format", "csv");
        if let Some(gid) = gid {
            query.append_pair("gid", gid);
        }
    }
    Ok(url)
}

fn is_id_safe(id: &str) -> bool {
    id.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
