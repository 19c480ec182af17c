//! Composite ranking heuristics.
//!
//! Each function here computes one bounded sub-score from one signal.
//! None of them reads another's output; `ScoringEngine` sums them.

use crate::types::{CourseDistance, GroundSuitability, RuleSet, Weight};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CONSENSUS_FACTOR: f64 = 0.4;
pub const VALUE_BONUS: f64 = 20.0;

pub const RATING_THRESHOLD: u32 = 130;
pub const RATING_CAP: f64 = 30.0;

pub const OFFICIAL_RATING_THRESHOLD: u32 = 145;
pub const OFFICIAL_RATING_BONUS: f64 = 10.0;

pub const ELITE_TRAINER_BONUS: f64 = 15.0;
pub const ELITE_COMBO_BONUS: f64 = 25.0;

/// Shortening faster than this (decimal points per minute) is momentum.
pub const VELOCITY_THRESHOLD: f64 = -0.1;
pub const VELOCITY_FACTOR: f64 = 50.0;
pub const VELOCITY_CAP: f64 = 30.0;

pub const GROUND_PERFECT_BONUS: f64 = 15.0;
pub const GROUND_POOR_PENALTY: f64 = -20.0;

const SOFT_LIKES: &[&str] = &["won on soft", "acts on heavy", "mudlark"];
const SOFT_DISLIKES: &[&str] = &["needs good", "better ground"];
const GOOD_LIKES: &[&str] = &["won on good", "top of the ground"];
const GOOD_DISLIKES: &[&str] = &["needs soft", "wants rain"];

/// National Hunt standard top weight, 11-7.
const NH_STANDARD_POUNDS: u32 = 11 * 14 + 7;
/// Flat standard weight, 9-0.
const FLAT_STANDARD_POUNDS: u32 = 9 * 14;

// ---------------------------------------------------------------------------
// Elite lists
// ---------------------------------------------------------------------------

/// Curated trainer and trainer+jockey lists. Entries are lower-case
/// fragments matched as substrings of the lower-cased name.
#[derive(Debug, Clone, PartialEq)]
pub struct EliteConfig {
    pub national_hunt_trainers: Vec<String>,
    pub flat_trainers: Vec<String>,
    /// (trainer fragment, jockey fragment)
    pub combos: Vec<(String, String)>,
}

impl Default for EliteConfig {
    fn default() -> Self {
        fn owned(names: &[&str]) -> Vec<String> {
            names.iter().map(|n| n.to_string()).collect()
        }
        Self {
            national_hunt_trainers: owned(&[
                "mullins", "elliott", "henderson", "bromhead", "nicholls", "skelton",
            ]),
            flat_trainers: owned(&[
                "appleby", "o'brien", "haggas", "gosden", "doyle", "stoute", "morrison",
                "balding", "de foy", "skelton", "henderson", "mullins", "nicholls",
            ]),
            combos: [
                ("mullins", "townend"),
                ("henderson", "boinville"),
                ("elliott", "kennedy"),
                ("nicholls", "cobden"),
                ("bromhead", "blackmore"),
            ]
            .iter()
            .map(|(t, j)| (t.to_string(), j.to_string()))
            .collect(),
        }
    }
}

impl EliteConfig {
    pub fn trainers_for(&self, rules: RuleSet) -> &[String] {
        match rules {
            RuleSet::NationalHunt => &self.national_hunt_trainers,
            RuleSet::Flat => &self.flat_trainers,
        }
    }

    pub fn is_elite_trainer(&self, trainer: &str, rules: RuleSet) -> bool {
        let t = trainer.to_lowercase();
        self.trainers_for(rules).iter().any(|e| t.contains(e.as_str()))
    }

    pub fn is_elite_combo(&self, trainer: &str, jockey: &str) -> bool {
        let t = trainer.to_lowercase();
        let j = jockey.to_lowercase();
        self.combos
            .iter()
            .any(|(et, ej)| t.contains(et.as_str()) && j.contains(ej.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Sub-scores
// ---------------------------------------------------------------------------

pub fn consensus_score(implied_probability: f64) -> f64 {
    implied_probability.clamp(0.0, 100.0) * CONSENSUS_FACTOR
}

pub fn value_score(value: bool) -> f64 {
    if value {
        VALUE_BONUS
    } else {
        0.0
    }
}

/// Linear above the threshold, capped.
pub fn expert_score(rating: Option<u32>) -> f64 {
    match rating {
        Some(r) if r > RATING_THRESHOLD => ((r - RATING_THRESHOLD) as f64).min(RATING_CAP),
        _ => 0.0,
    }
}

/// Result of reading a form string.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FormReading {
    pub score: f64,
    /// Won the last two.
    pub hot: bool,
    /// Failed to complete last time.
    pub cold: bool,
}

/// Score a form string such as `"1-21P1"`. Only digits and P/F/U count;
/// season separators and other markers are dropped.
pub fn form_score(form: Option<&str>) -> FormReading {
    let Some(form) = form else {
        return FormReading::default();
    };
    let clean: String = form
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(*c, 'P' | 'F' | 'U'))
        .collect();

    let mut reading = FormReading::default();
    let Some(last) = clean.chars().last() else {
        return reading;
    };

    if last == '1' {
        reading.score += 10.0;
    }
    if clean.ends_with("11") {
        reading.score += 10.0;
        reading.hot = true;
    }
    if clean.ends_with("111") {
        reading.score += 5.0;
    }
    if matches!(last, '2' | '3') {
        reading.score += 5.0;
    }
    if matches!(last, 'P' | 'F' | 'U') {
        reading.score -= 15.0;
        reading.cold = true;
    }
    if clean.contains("00") {
        reading.score -= 10.0;
    }
    reading
}

pub fn age_score(age: Option<u32>, rules: RuleSet) -> f64 {
    match (rules, age) {
        (RuleSet::NationalHunt, Some(5 | 6)) => 10.0,
        (RuleSet::NationalHunt, Some(a)) if a > 7 => -5.0,
        (RuleSet::Flat, Some(4..=6)) => 5.0,
        _ => 0.0,
    }
}

pub fn official_rating_score(official_rating: Option<u32>) -> f64 {
    match official_rating {
        Some(or) if or > OFFICIAL_RATING_THRESHOLD => OFFICIAL_RATING_BONUS,
        _ => 0.0,
    }
}

/// Bonus for carrying less than the code's standard weight.
pub fn weight_score(weight: Option<Weight>, rules: RuleSet) -> f64 {
    let Some(w) = weight else {
        return 0.0;
    };
    match rules {
        RuleSet::NationalHunt if w.total_pounds() < NH_STANDARD_POUNDS => 15.0,
        RuleSet::Flat if w.total_pounds() < FLAT_STANDARD_POUNDS => 10.0,
        _ => 0.0,
    }
}

pub fn trainer_score(trainer: Option<&str>, rules: RuleSet, elite: &EliteConfig) -> (f64, bool) {
    match trainer {
        Some(t) if elite.is_elite_trainer(t, rules) => (ELITE_TRAINER_BONUS, true),
        _ => (0.0, false),
    }
}

pub fn combo_score(trainer: Option<&str>, jockey: Option<&str>, elite: &EliteConfig) -> (f64, bool) {
    match (trainer, jockey) {
        (Some(t), Some(j)) if elite.is_elite_combo(t, j) => (ELITE_COMBO_BONUS, true),
        _ => (0.0, false),
    }
}

pub fn course_distance_score(cd: Option<CourseDistance>) -> f64 {
    match cd {
        Some(CourseDistance::CourseAndDistance) => 20.0,
        Some(CourseDistance::Course) => 15.0,
        Some(CourseDistance::Distance) => 5.0,
        None => 0.0,
    }
}

/// Momentum bonus for a shortening price; returns the high-velocity flag.
pub fn velocity_score(velocity: Option<f64>) -> (f64, bool) {
    match velocity {
        Some(v) if v < VELOCITY_THRESHOLD => ((v.abs() * VELOCITY_FACTOR).min(VELOCITY_CAP), true),
        _ => (0.0, false),
    }
}

/// Ground suitability from the official going and analyst commentary.
pub fn going_score(going: Option<&str>, commentary: Option<&str>) -> (f64, Option<GroundSuitability>) {
    let (Some(going), Some(commentary)) = (going, commentary) else {
        return (0.0, None);
    };
    let going = going.to_lowercase();
    let text = commentary.to_lowercase();
    let mentions = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));

    let (likes, dislikes) = if going.contains("soft") || going.contains("heavy") {
        (SOFT_LIKES, SOFT_DISLIKES)
    } else if going.contains("good") || going.contains("firm") {
        (GOOD_LIKES, GOOD_DISLIKES)
    } else {
        return (0.0, None);
    };

    if mentions(likes) {
        (GROUND_PERFECT_BONUS, Some(GroundSuitability::Perfect))
    } else if mentions(dislikes) {
        (GROUND_POOR_PENALTY, Some(GroundSuitability::Poor))
    } else {
        (0.0, None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
