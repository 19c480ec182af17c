//! Weighted market consensus.
//!
//! Converts one entrant's bookmaker quotes into a single implied
//! probability, a disagreement signal and a value-outlier flag.

use std::collections::{BTreeMap, HashMap};

use crate::types::{normalize_name, Quote};

// ---------------------------------------------------------------------------
// Source weights
// ---------------------------------------------------------------------------

/// Weight given to a source missing from the table.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Disagreement fires only above both of these.
pub const DISAGREEMENT_STD_DEV: f64 = 2.5;
pub const DISAGREEMENT_MIN_PROBABILITY: f64 = 15.0;

/// A single price this far above the mean decimal counts as value.
pub const VALUE_OUTLIER_RATIO: f64 = 1.2;

/// Static trust weight per source. Exchanges and sharp books carry the
/// most weight, large recreational books the least. Lookups ignore case
/// and punctuation, so "Sky Bet" and "skybet" are the same source.
#[derive(Debug, Clone)]
pub struct SourceWeights {
    weights: HashMap<String, f64>,
}

impl SourceWeights {
    pub fn new(table: HashMap<String, f64>) -> Self {
        Self {
            weights: table
                .into_iter()
                .map(|(name, w)| (normalize_name(&name), w))
                .collect(),
        }
    }

    pub fn weight(&self, source: &str) -> f64 {
        self.weights
            .get(&normalize_name(source))
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        let table = [
            ("Betfair", 2.0),
            ("Matchbook", 2.0),
            ("Pinnacle", 2.0),
            ("Smarkets", 2.0),
            ("bet365", 1.5),
            ("William Hill", 1.5),
            ("Unibet", 1.5),
            ("BetVictor", 1.5),
            ("Paddy Power", 1.0),
            ("Skybet", 1.0),
            ("Ladbrokes", 1.0),
            ("Coral", 1.0),
            ("Boylesports", 1.0),
        ];
        Self::new(
            table
                .into_iter()
                .map(|(name, w)| (name.to_string(), w))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsensusMetrics {
    /// Weighted mean implied probability in percent; 0 with no valid quotes.
    pub implied_probability: f64,
    /// Population std-dev of unweighted per-source probabilities; 0 with
    /// fewer than two valid quotes.
    pub std_dev: f64,
    pub disagreement: bool,
    pub mean_decimal: Option<f64>,
    /// Some single price exceeds the mean decimal by the outlier ratio.
    pub value: bool,
    pub valid_quotes: usize,
}

impl ConsensusMetrics {
    /// Compute consensus over the quotes from `sources`. An empty `sources`
    /// list means every quote the entrant carries. Non-positive or
    /// non-finite prices are ignored.
    pub fn compute(quotes: &BTreeMap<String, Quote>, sources: &[String], weights: &SourceWeights) -> Self {
        let selected: Vec<(&str, f64)> = if sources.is_empty() {
            quotes
                .iter()
                .map(|(source, q)| (source.as_str(), q.decimal))
                .collect()
        } else {
            sources
                .iter()
                .filter_map(|s| quotes.get(s).map(|q| (s.as_str(), q.decimal)))
                .collect()
        };
        let valid: Vec<(&str, f64)> = selected
            .into_iter()
            .filter(|(_, d)| d.is_finite() && *d > 0.0)
            .collect();

        if valid.is_empty() {
            return Self::default();
        }

        let probabilities: Vec<f64> = valid.iter().map(|(_, d)| 100.0 / d).collect();

        let (weighted_sum, weight_total) = valid
            .iter()
            .zip(&probabilities)
            .fold((0.0, 0.0), |(sum, total), ((source, _), p)| {
                let w = weights.weight(source);
                (sum + p * w, total + w)
            });
        let implied_probability = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let std_dev = population_std_dev(&probabilities);

        let n = valid.len() as f64;
        let mean_decimal = valid.iter().map(|(_, d)| d).sum::<f64>() / n;
        let value = valid.iter().any(|(_, d)| *d > mean_decimal * VALUE_OUTLIER_RATIO);

        Self {
            implied_probability,
            std_dev,
            disagreement: std_dev > DISAGREEMENT_STD_DEV
                && implied_probability > DISAGREEMENT_MIN_PROBABILITY,
            mean_decimal: Some(mean_decimal),
            value,
            valid_quotes: valid.len(),
        }
    }
}

fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
