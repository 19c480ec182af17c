//! Record linkage.
//!
//! Merges the price stream (authoritative for who is running) with the
//! form stream (authoritative for what is known about them) on the
//! normalised entrant name. Exact match only.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::types::{normalize_name, Attributes, Entrant, FormRecord, PriceRecord, Quote};

/// Merge the two streams into canonical entrants.
///
/// Every primary record yields one entrant, in primary order. Secondary
/// records with no primary counterpart are dropped. Quotes that fail to
/// parse are skipped individually.
pub fn link(primary: &[PriceRecord], secondary: &[FormRecord]) -> Vec<Entrant> {
    let mut by_key: HashMap<String, &FormRecord> = HashMap::with_capacity(secondary.len());
    for record in secondary {
        let key = normalize_name(&record.name);
        if key.is_empty() {
            continue;
        }
        // First occurrence wins on duplicate rows.
        by_key.entry(key).or_insert(record);
    }

    let mut matched = 0usize;
    let entrants: Vec<Entrant> = primary
        .iter()
        .map(|row| {
            let mut entrant = Entrant::new(row.name.trim());
            entrant.quotes = parse_quotes(row);

            if let Some(form) = by_key.get(&normalize_name(&row.name)) {
                entrant.attributes = Attributes::from_record(form);
                matched += 1;
            } else {
                debug!(entrant = %row.name, "No form record for entrant");
            }
            entrant
        })
        .collect();

    info!(
        entrants = entrants.len(),
        matched,
        form_rows = secondary.len(),
        dropped = secondary.len().saturating_sub(matched),
        "Linking complete"
    );

    entrants
}

fn parse_quotes(row: &PriceRecord) -> BTreeMap<String, Quote> {
    row.quotes
        .iter()
        .filter_map(|(source, raw)| match Quote::parse(raw) {
            Ok(q) => Some((source.clone(), q)),
            Err(e) => {
                debug!(entrant = %row.name, source = %source, error = %e, "Skipping quote");
                None
            }
        })
        .collect()
}
