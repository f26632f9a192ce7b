use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::fetch::{FetchError, Fetcher};

const OPEN_LIBRARY_URL: &str = "https://openlibrary.org/";
const COVERS_URL: &str = "https://covers.openlibrary.org/b/isbn";
const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum IsbnError {
    #[error("invalid ISBN format {0:?}: provide a valid 10 or 13 digit ISBN")]
    Invalid(String),
    #[error("ISBN {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("error parsing response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad lookup URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A checksum-verified ISBN, kept in its 13-digit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isbn {
    isbn13: String,
    isbn10: Option<String>,
}

impl Isbn {
    /// Accepts ISBN-10 or ISBN-13, with or without hyphens and spaces.
    pub fn parse(input: &str) -> Result<Self, IsbnError> {
        let cleaned = input
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();

        match cleaned.len() {
            10 if isbn10_valid(&cleaned) => Ok(Isbn {
                isbn13: isbn10_to_13(&cleaned),
                isbn10: Some(cleaned),
            }),
            13 if isbn13_valid(&cleaned) => Ok(Isbn {
                isbn10: cleaned.starts_with("978").then(|| isbn13_to_10(&cleaned)),
                isbn13: cleaned,
            }),
            _ => Err(IsbnError::Invalid(input.to_string())),
        }
    }

    pub fn isbn13(&self) -> &str {
        &self.isbn13
    }

    /// Only 978-prefixed ISBNs have a 10-digit form.
    pub fn isbn10(&self) -> Option<&str> {
        self.isbn10.as_deref()
    }
}

fn isbn10_valid(s: &str) -> bool {
    let mut sum = 0;
    for (i, b) in s.bytes().enumerate() {
        let v = match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'X' if i == 9 => 10,
            _ => return false,
        };
        sum += v * (10 - i as u32);
    }
    sum % 11 == 0
}

fn isbn13_valid(s: &str) -> bool {
    if !s.bytes().all(|b| b.is_ascii_digit()) || !(s.starts_with("978") || s.starts_with("979")) {
        return false;
    }
    weighted13(s) % 10 == 0
}

fn weighted13(digits: &str) -> u32 {
    digits
        .bytes()
        .enumerate()
        .map(|(i, b)| (b - b'0') as u32 * if i % 2 == 0 { 1 } else { 3 })
        .sum()
}

fn isbn10_to_13(isbn10: &str) -> String {
    let core = format!("978{}", &isbn10[..9]);
    let check = (10 - weighted13(&core) % 10) % 10;
    format!("{}{}", core, check)
}

fn isbn13_to_10(isbn13: &str) -> String {
    let core = &isbn13[3..12];
    let sum: u32 = core
        .bytes()
        .enumerate()
        .map(|(i, b)| (b - b'0') as u32 * (10 - i as u32))
        .sum();
    match (11 - sum % 11) % 11 {
        10 => format!("{}X", core),
        d => format!("{}{}", core, d),
    }
}

/// Flattened view of an Open Library edition record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub publish_date: String,
    pub publisher: String,
    pub number_of_pages: Value,
    pub language: String,
    pub cover_url: String,
    pub open_library_url: String,
    pub full_metadata: Value,
}

impl BookSummary {
    pub fn from_metadata(metadata: Value, isbn: &Isbn) -> Self {
        let clean = isbn.isbn13();
        let first_of = |key: &str| {
            metadata
                .get(key)
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let text = |key: &str| {
            metadata
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        let author = join_names(metadata.get("authors"), |a| {
            a.get("name").and_then(|n| n.as_str()).map(str::to_string)
        });
        let publisher = join_names(metadata.get("publishers"), |p| {
            p.as_str()
                .or_else(|| p.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
        });
        let language = join_names(metadata.get("languages"), |l| {
            l.get("key")
                .and_then(|k| k.as_str())
                .and_then(|k| k.rsplit('/').next())
                .map(str::to_string)
        });
        let number_of_pages = metadata
            .get("number_of_pages")
            .filter(|v| v.is_number())
            .cloned()
            .unwrap_or_else(|| Value::String(UNKNOWN.to_string()));

        BookSummary {
            isbn: first_of("isbn_13")
                .or_else(|| first_of("isbn_10"))
                .unwrap_or_else(|| clean.to_string()),
            title: text("title"),
            author,
            publish_date: text("publish_date"),
            publisher,
            number_of_pages,
            language,
            cover_url: format!("{}/{}-M.jpg", COVERS_URL, clean),
            open_library_url: format!("{}isbn/{}", OPEN_LIBRARY_URL, clean),
            full_metadata: metadata,
        }
    }
}

fn join_names(list: Option<&Value>, name: impl Fn(&Value) -> Option<String>) -> String {
    let names: Vec<String> = list
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(&name).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default();
    if names.is_empty() {
        UNKNOWN.to_string()
    } else {
        names.join(", ")
    }
}

/// Fetch the edition record for `isbn` from an Open Library compatible host.
pub async fn lookup(fetcher: &Fetcher, base: &Url, isbn: &Isbn) -> Result<BookSummary, IsbnError> {
    let url = base.join(&format!("isbn/{}.json", isbn.isbn13()))?;
    let body = match fetcher.fetch(&url).await {
        Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
            return Err(IsbnError::NotFound(isbn.isbn13().to_string()))
        }
        other => other?,
    };
    let metadata: Value = serde_json::from_str(&body)?;
    Ok(BookSummary::from_metadata(metadata, isbn))
}

/// Validate `input` and look it up on openlibrary.org.
pub async fn search(input: &str, timeout: Duration) -> anyhow::Result<BookSummary> {
    let isbn = Isbn::parse(input)?;
    info!(
        "Searching for ISBN: {} (ISBN-13 {}, ISBN-10 {})...",
        input,
        isbn.isbn13(),
        isbn.isbn10().unwrap_or("n/a")
    );
    let fetcher = Fetcher::new(timeout, 5)?;
    let base = Url::parse(OPEN_LIBRARY_URL)?;
    lookup(&fetcher, &base, &isbn)
        .await
        .with_context(|| format!("lookup failed for ISBN {}", input))
}
