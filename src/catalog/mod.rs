pub mod filter;
pub mod normalize;
pub mod record;
pub mod table;

use filter::ValidityPolicy;
use normalize::FieldSelection;
use record::NormalizedRecord;
use table::ParseError;

/// Records ready to persist, plus how many parsed rows the policy rejected.
#[derive(Debug)]
pub struct Catalog {
    pub records: Vec<NormalizedRecord>,
    pub parsed: usize,
    pub dropped: usize,
}

/// Three-pass pipeline: csv text → rows → repaired records → valid records.
pub fn build_catalog(
    body: &str,
    fields: &FieldSelection,
    policy: &ValidityPolicy,
) -> Result<Catalog, ParseError> {
    let rows = table::parse(body)?;
    let parsed = rows.len();

    let records: Vec<NormalizedRecord> = rows
        .into_iter()
        .map(|row| normalize::normalize(row, fields))
        .filter(|record| policy.is_valid(record))
        .collect();

    Ok(Catalog {
        dropped: parsed - records.len(),
        parsed,
        records,
    })
}
