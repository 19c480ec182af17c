//! Shared types for the STEAMER pipeline.
//!
//! These types form the data model used across all modules: the raw
//! per-source records handed over by an extractor, the canonical merged
//! entrant, derived metrics, published snapshots, and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Normalise a free-text entrant name into a join key.
///
/// Lower-cases and strips everything that is not ASCII alphanumeric.
/// Only ever used for matching, never for display.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Which racing code an event is run under. Several scoring heuristics
/// (age bands, weight allowances, elite yards) differ between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    #[default]
    NationalHunt,
    Flat,
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSet::NationalHunt => write!(f, "National Hunt"),
            RuleSet::Flat => write!(f, "Flat"),
        }
    }
}

/// One tracked race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Stable short key, e.g. `"goldcup"`.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Locator for the price-comparison source (primary stream).
    pub price_url: String,
    /// Locator for the expert form source (secondary stream).
    pub form_url: String,
    /// Scheduled off time.
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub rules: RuleSet,
}

impl Event {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Time remaining until the off (negative once the race has started).
    pub fn time_to_start(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.start_time - now
    }
}

/// Race-level context the scoring engine needs besides the entrant itself.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub rules: RuleSet,
    /// Official going description, e.g. "Good to Soft".
    pub going: Option<String>,
}

// ---------------------------------------------------------------------------
// Raw records (as handed over by an extractor)
// ---------------------------------------------------------------------------

/// One bookmaker's price as scraped: the fraction text and, when the source
/// exposes it, a decimal value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawQuote {
    pub fraction: String,
    #[serde(default)]
    pub decimal: Option<f64>,
}

/// A runner row from the price-comparison source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub name: String,
    #[serde(default)]
    pub quotes: BTreeMap<String, RawQuote>,
}

/// Everything the price-comparison source yields for one race.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PriceCard {
    #[serde(default)]
    pub race_name: String,
    /// Bookmaker column headers, in page order.
    #[serde(default)]
    pub bookmakers: Vec<String>,
    #[serde(default)]
    pub runners: Vec<PriceRecord>,
}

/// A runner row from the expert form source. Every field is kept as the
/// raw scraped text; parsing happens when records are merged. Numbers are
/// accepted in place of text, and other mistyped values read as absent, so
/// one odd field never costs the whole card.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormRecord {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub form: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub trainer: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub jockey: Option<String>,
    /// "C", "D" or "CD" badge.
    #[serde(default, deserialize_with = "lenient_text")]
    pub course_distance: Option<String>,
    /// Expert rating (RPR).
    #[serde(default, deserialize_with = "lenient_text")]
    pub rpr: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub age: Option<String>,
    /// Carried weight as "st-lb".
    #[serde(default, deserialize_with = "lenient_text")]
    pub weight: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub official_rating: Option<String>,
    /// Free-text analyst commentary.
    #[serde(default, deserialize_with = "lenient_text")]
    pub spotlight: Option<String>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Everything the expert form source yields for one race.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormCard {
    #[serde(default)]
    pub going: Option<String>,
    #[serde(default)]
    pub runners: Vec<FormRecord>,
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// A validated price: original fraction text plus decimal odds (> 1.0 for
/// any sane price, always > 0).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub fraction: String,
    pub decimal: f64,
}

impl Quote {
    /// Build a quote from its raw form. The fraction text is authoritative;
    /// a scraped decimal is only used when the fraction is blank.
    pub fn parse(raw: &RawQuote) -> Result<Self, ComputationError> {
        let text = raw.fraction.trim();
        let decimal = if text.is_empty() {
            match raw.decimal {
                Some(d) => d,
                None => return Err(ComputationError::UnparsablePrice(String::new())),
            }
        } else {
            match (fraction_to_decimal(text), raw.decimal) {
                (Ok(d), _) => d,
                (Err(_), Some(d)) => d,
                (Err(e), None) => return Err(e),
            }
        };

        if !decimal.is_finite() || decimal <= 0.0 {
            return Err(ComputationError::NonPositivePrice(decimal));
        }

        Ok(Self {
            fraction: text.to_string(),
            decimal,
        })
    }

    /// Implied probability in percent.
    pub fn implied_probability(&self) -> f64 {
        100.0 / self.decimal
    }
}

/// Convert a quoted price to decimal odds.
///
/// `n/d` becomes `n/d + 1`; "EVS"/"evens" is 2.0; anything else is read as
/// an already-decimal price. Negative fractions are rejected.
pub fn fraction_to_decimal(text: &str) -> Result<f64, ComputationError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("evs") || text.eq_ignore_ascii_case("evens") {
        return Ok(2.0);
    }

    match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num
                .trim()
                .parse()
                .map_err(|_| ComputationError::UnparsablePrice(text.to_string()))?;
            let den: f64 = den
                .trim()
                .parse()
                .map_err(|_| ComputationError::UnparsablePrice(text.to_string()))?;
            if num < 0.0 || den <= 0.0 {
                return Err(ComputationError::UnparsablePrice(text.to_string()));
            }
            Ok(num / den + 1.0)
        }
        None => text
            .parse()
            .map_err(|_| ComputationError::UnparsablePrice(text.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Course / distance winner badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseDistance {
    Course,
    Distance,
    CourseAndDistance,
}

impl std::str::FromStr for CourseDistance {
    type Err = ComputationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" => Ok(CourseDistance::Course),
            "D" => Ok(CourseDistance::Distance),
            "CD" | "C&D" | "C D" => Ok(CourseDistance::CourseAndDistance),
            other => Err(ComputationError::UnparsableField {
                field: "course_distance",
                value: other.to_string(),
            }),
        }
    }
}

/// Carried weight in stones and pounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weight {
    pub stones: u32,
    pub pounds: u32,
}

impl Weight {
    pub fn total_pounds(&self) -> u32 {
        self.stones * 14 + self.pounds
    }
}

impl std::str::FromStr for Weight {
    type Err = ComputationError;

    /// Parses "11-7" style weights. A bare "11" is 11st 0lb.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ComputationError::UnparsableField {
            field: "weight",
            value: s.to_string(),
        };
        let s = s.trim();
        let (st, lb) = match s.split_once('-') {
            Some((st, lb)) => (st, lb),
            None => (s, "0"),
        };
        let stones = st.trim().parse().map_err(|_| bad())?;
        let pounds = lb.trim().parse().map_err(|_| bad())?;
        Ok(Weight { stones, pounds })
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stones, self.pounds)
    }
}

/// Structured expert metadata for one entrant. Missing or unparsable
/// source fields are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Attributes {
    /// Expert rating (RPR).
    pub rating: Option<u32>,
    pub official_rating: Option<u32>,
    pub form: Option<String>,
    pub trainer: Option<String>,
    pub jockey: Option<String>,
    pub age: Option<u32>,
    pub weight: Option<Weight>,
    pub course_distance: Option<CourseDistance>,
    pub commentary: Option<String>,
}

impl Attributes {
    /// Parse a raw form record. Each field is parsed independently; a bad
    /// value is logged and dropped without affecting the others.
    pub fn from_record(record: &FormRecord) -> Self {
        Self {
            rating: parse_field(&record.name, "rpr", record.rpr.as_deref()),
            official_rating: parse_field(
                &record.name,
                "official_rating",
                record.official_rating.as_deref(),
            ),
            form: non_blank(record.form.as_deref()),
            trainer: non_blank(record.trainer.as_deref()),
            jockey: non_blank(record.jockey.as_deref()),
            age: parse_field(&record.name, "age", record.age.as_deref()),
            weight: parse_field(&record.name, "weight", record.weight.as_deref()),
            course_distance: parse_field(
                &record.name,
                "course_distance",
                record.course_distance.as_deref(),
            ),
            commentary: non_blank(record.spotlight.as_deref()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "-")
        .map(String::from)
}

fn parse_field<T: std::str::FromStr>(entrant: &str, field: &str, value: Option<&str>) -> Option<T> {
    let value = non_blank(value)?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(entrant, field, value = %value, "Skipping unparsable field");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

/// Direction of the market since the opening line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketMove {
    /// Price has shortened.
    Steamer,
    /// Price has lengthened.
    Drifter,
    Stable,
}

impl fmt::Display for MarketMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketMove::Steamer => write!(f, "steamer"),
            MarketMove::Drifter => write!(f, "drifter"),
            MarketMove::Stable => write!(f, "stable"),
        }
    }
}

/// Movement output of the temporal tracker for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub direction: MarketMove,
    /// Rounded percentage move from the opening line.
    pub percent: u32,
    pub opening_price: f64,
    pub current_price: f64,
    /// Decimal-odds points per minute; negative means shortening.
    pub velocity: f64,
}

/// Going suitability read from commentary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundSuitability {
    Perfect,
    Poor,
}

/// Individual heuristic sub-scores. The composite score is their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub consensus: f64,
    pub value: f64,
    pub expert: f64,
    pub form: f64,
    pub age: f64,
    pub official_rating: f64,
    pub trainer: f64,
    pub weight: f64,
    pub combo: f64,
    pub course_distance: f64,
    pub velocity: f64,
    pub going: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.consensus
            + self.value
            + self.expert
            + self.form
            + self.age
            + self.official_rating
            + self.trainer
            + self.weight
            + self.combo
            + self.course_distance
            + self.velocity
            + self.going
    }
}

/// Boolean markers raised while scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFlags {
    /// Last two runs won.
    pub hot: bool,
    /// Failed to finish last time.
    pub cold: bool,
    pub value: bool,
    pub elite_trainer: bool,
    pub elite_combo: bool,
    pub high_velocity: bool,
    pub ground: Option<GroundSuitability>,
}

/// Everything computed on top of the raw quotes and attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    /// Weighted consensus implied probability, in percent.
    pub implied_probability: f64,
    /// Population std-dev of per-source probabilities, in percentage points.
    pub std_dev: f64,
    pub disagreement: bool,
    /// Unweighted mean of valid decimal prices.
    pub mean_decimal: Option<f64>,
    /// Best (largest) valid decimal price.
    pub best_price: Option<f64>,
    pub composite_score: f64,
    pub breakdown: ScoreBreakdown,
    pub flags: ScoreFlags,
    pub movement: Option<Movement>,
}

// ---------------------------------------------------------------------------
// Entrant
// ---------------------------------------------------------------------------

/// One runner in one race, merged from both source streams.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entrant {
    /// Display name from the primary stream.
    pub name: String,
    pub attributes: Attributes,
    /// Source id → validated quote.
    pub quotes: BTreeMap<String, Quote>,
    pub derived: Derived,
}

impl Entrant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Join key for cross-source matching and baseline storage.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Largest valid decimal price across all quotes.
    pub fn best_price(&self) -> Option<f64> {
        self.quotes
            .values()
            .map(|q| q.decimal)
            .filter(|d| d.is_finite() && *d > 0.0)
            .fold(None, |best: Option<f64>, d| Some(best.map_or(d, |b| b.max(d))))
    }
}

impl fmt::Display for Entrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.1}% | score {:.0}",
            self.name, self.derived.implied_probability, self.derived.composite_score
        )?;
        if let Some(m) = &self.derived.movement {
            write!(f, " | {} {}%", m.direction, m.percent)?;
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A fully merged, scored and ranked view of one race, published atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub event_id: String,
    pub event_name: String,
    pub race_name: String,
    pub start_time: DateTime<Utc>,
    pub going: Option<String>,
    pub bookmakers: Vec<String>,
    /// Entrants ranked by consensus probability, highest first.
    pub entrants: Vec<Entrant>,
    /// Name of the highest composite score.
    pub top_pick: Option<String>,
    pub each_way: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn entrant(&self, name: &str) -> Option<&Entrant> {
        let key = normalize_name(name);
        self.entrants.iter().find(|e| e.key() == key)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of an acquisition attempt or of the whole retry loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("acquisition timed out after {0:?}")]
    Timeout(Duration),

    #[error("acquisition blocked: {0}")]
    Blocked(String),

    #[error("source structure not found: {0}")]
    StructureNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("retry budget exhausted after {attempts} attempts (last: {last})")]
    Exhausted {
        attempts: u32,
        last: Box<AcquisitionError>,
    },

    /// The extraction function itself is broken. Never retried.
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("invalid source locator: {0}")]
    InvalidLocator(String),
}

impl AcquisitionError {
    /// Network, timeout, block and structure failures are worth another
    /// attempt; a broken extractor or a spent budget is not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Timeout(_)
                | AcquisitionError::Blocked(_)
                | AcquisitionError::StructureNotFound(_)
                | AcquisitionError::Network(_)
        )
    }

    /// The underlying per-attempt failure, looking through `Exhausted`.
    pub fn root(&self) -> &AcquisitionError {
        match self {
            AcquisitionError::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Malformed numeric input on a single field or quote. Always isolated to
/// that field; never escalated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputationError {
    #[error("unparsable price: {0:?}")]
    UnparsablePrice(String),

    #[error("non-positive price: {0}")]
    NonPositivePrice(f64),

    #[error("unparsable {field}: {value:?}")]
    UnparsableField { field: &'static str, value: String },
}

/// Event-level failure of one refresh cycle.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stream} acquisition failed for {event_id}: {source}")]
    Acquisition {
        event_id: String,
        stream: &'static str,
        #[source]
        source: AcquisitionError,
    },

    #[error("no entrants after linking for {event_id}")]
    LinkageEmpty { event_id: String },

    #[error("cycle for {event_id} timed out after {timeout:?}")]
    ColdStartTimeout { event_id: String, timeout: Duration },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
