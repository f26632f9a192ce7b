use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::record::{NormalizedRecord, RawRow};

static IMAGE_FORMULA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^=IMAGE\s*\(\s*["']([^"']+)["']"#).unwrap());

/// Which columns go through formula repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    Named(Vec<String>),
    All,
}

impl FieldSelection {
    pub fn covers(&self, key: &str) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::Named(names) => names.iter().any(|n| n == key),
        }
    }
}

impl Default for FieldSelection {
    fn default() -> Self {
        FieldSelection::Named(vec!["Cover".to_string()])
    }
}

/// Repair spreadsheet formula artifacts in the selected fields.
pub fn normalize(mut row: RawRow, fields: &FieldSelection) -> NormalizedRecord {
    for (key, value) in row.values_mut() {
        if !fields.covers(key) {
            continue;
        }
        let cleaned = clean_value(value);
        if cleaned.len() == value.len() {
            continue;
        }
        let cleaned = cleaned.to_string();
        debug!("Repaired formula in {}: {:?} -> {:?}", key, value, cleaned);
        *value = cleaned;
    }
    NormalizedRecord::from_repaired(row)
}

/// Unwrap `=IMAGE("url")` and `="text"`. Anything else is returned as is.
pub fn clean_value(value: &str) -> &str {
    if let Some(caps) = IMAGE_FORMULA_RE.captures(value) {
        if let Some(url) = caps.get(1) {
            return url.as_str();
        }
    }
    if value.len() >= 3 && value.starts_with("=\"") && value.ends_with('"') {
        return &value[2..value.len() - 1];
    }
    value
}
