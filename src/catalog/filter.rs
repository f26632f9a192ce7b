use super::record::NormalizedRecord;

/// Row-validity policy. The two are not equivalent: `TitleRequired` drops rows
/// that have content but no title, `AnyNonBlank` keeps them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidityPolicy {
    TitleRequired { field: String },
    AnyNonBlank,
}

impl Default for ValidityPolicy {
    fn default() -> Self {
        ValidityPolicy::TitleRequired {
            field: "Title".to_string(),
        }
    }
}

impl ValidityPolicy {
    pub fn is_valid(&self, record: &NormalizedRecord) -> bool {
        match self {
            ValidityPolicy::TitleRequired { field } => record
                .get(field)
                .is_some_and(|title| !title.trim().is_empty()),
            ValidityPolicy::AnyNonBlank => record.iter().any(|(_, v)| !v.trim().is_empty()),
        }
    }
}
