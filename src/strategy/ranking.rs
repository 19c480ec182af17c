//! Ranking over scored entrants.
//!
//! Pure sorts and selections; ties always fall back to name order so the
//! output is deterministic.

use std::cmp::Ordering;

use crate::types::Entrant;

/// Minimum mean decimal odds for an each-way pick.
pub const EACH_WAY_MIN_ODDS: f64 = 6.0;
pub const EACH_WAY_PICKS: usize = 2;

fn by_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Sort by consensus probability, highest first.
pub fn rank_by_probability(entrants: &mut [Entrant]) {
    entrants.sort_by(|a, b| {
        by_desc(a.derived.implied_probability, b.derived.implied_probability)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Entrants ordered by composite score, highest first.
pub fn rank_by_score(entrants: &[Entrant]) -> Vec<&Entrant> {
    let mut ranked: Vec<&Entrant> = entrants.iter().collect();
    ranked.sort_by(|a, b| {
        by_desc(a.derived.composite_score, b.derived.composite_score)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
}

/// Highest composite score.
pub fn top_pick(entrants: &[Entrant]) -> Option<&Entrant> {
    rank_by_score(entrants).into_iter().next()
}

/// Best-scoring entrants at each-way prices, excluding the top pick.
pub fn each_way_picks<'a>(entrants: &'a [Entrant], top: Option<&str>) -> Vec<&'a Entrant> {
    rank_by_score(entrants)
        .into_iter()
        .filter(|e| Some(e.name.as_str()) != top)
        .filter(|e| e.derived.mean_decimal.is_some_and(|d| d >= EACH_WAY_MIN_ODDS))
        .take(EACH_WAY_PICKS)
        .collect()
}
