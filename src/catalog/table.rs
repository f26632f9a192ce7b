use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::{debug, warn};

use super::record::RawRow;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },
    #[error("failed to read record on line {line}: {source}")]
    Record {
        line: u64,
        #[source]
        source: csv::Error,
    },
}

/// Parse a comma-separated export whose first record is the header row.
///
/// Values and headers are trimmed. Blank and whitespace-only lines produce no
/// row. Short rows get empty strings for the missing trailing columns; cells
/// past the last header are dropped.
pub fn parse(body: &str) -> Result<Vec<RawRow>, ParseError> {
    let body = body.strip_prefix('\u{feff}').unwrap_or(body);
    check_quoting(body)?;

    // The header is read as an ordinary record so blank lines above it are
    // skipped the same way as blank lines between data rows.
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut records = reader
        .records()
        .map(|result| {
            result.map_err(|e| ParseError::Record {
                line: e.position().map(|p| p.line()).unwrap_or(0),
                source: e,
            })
        })
        .filter(|result| !matches!(result, Ok(record) if is_blank(record)));

    let headers = match records.next() {
        Some(headers) => headers?,
        None => {
            debug!("Export has no header row");
            return Ok(Vec::new());
        }
    };

    let mut rows = Vec::new();
    for result in records {
        let record = result?;

        if record.len() > headers.len() {
            warn!(
                "Line {}: {} cells but only {} headers, extra cells dropped",
                record.position().map(|p| p.line()).unwrap_or(0),
                record.len(),
                headers.len()
            );
        }

        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header, record.get(i).unwrap_or("")))
            .collect();
        rows.push(row);
    }

    debug!("Parsed {} rows across {} columns", rows.len(), headers.len());
    Ok(rows)
}

// "   " still comes through as a single empty cell
fn is_blank(record: &StringRecord) -> bool {
    record.len() <= 1 && record.iter().all(str::is_empty)
}

/// The csv reader closes an open quote at end of input without complaint,
/// which would silently merge every following line into one cell.
fn check_quoting(body: &str) -> Result<(), ParseError> {
    let mut line = 1;
    let mut opened_at: Option<usize> = None;
    let mut field_start = true;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if opened_at.is_some() {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                }
                '"' => opened_at = None,
                '\n' => line += 1,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if field_start => {
                opened_at = Some(line);
                field_start = false;
            }
            ',' | '\r' => field_start = true,
            '\n' => {
                line += 1;
                field_start = true;
            }
            _ => field_start = false,
        }
    }

    match opened_at {
        Some(line) => Err(ParseError::UnterminatedQuote { line }),
        None => Ok(()),
    }
}
