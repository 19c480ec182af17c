//! Temporal tracking of market movement.
//!
//! Owns the opening-line baselines. Each (event, entrant) key is updated
//! under its own `DashMap` entry lock, so two refresh paths overlapping on
//! the same event cannot lose an update. Nothing else mutates baselines.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{MarketMove, Movement};

/// Velocity is only measured once this much time has passed since the
/// last accepted observation.
pub const VELOCITY_WINDOW_MINS: i64 = 30;

/// Per (event, entrant) price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// First observed best price. Never changes within one running.
    pub opening_price: f64,
    pub last_price: f64,
    pub last_observed_at: DateTime<Utc>,
}

/// Flat, serializable form of the tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerState {
    /// Event id → start time the baselines belong to.
    pub runnings: Vec<(String, DateTime<Utc>)>,
    pub baselines: Vec<BaselineEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub event_id: String,
    pub entrant: String,
    #[serde(flatten)]
    pub baseline: Baseline,
}

/// Direction and rounded percentage move from `opening` to `current`.
pub fn classify(opening: f64, current: f64) -> (MarketMove, u32) {
    if current < opening {
        (MarketMove::Steamer, percent(opening - current, opening))
    } else if current > opening {
        (MarketMove::Drifter, percent(current - opening, opening))
    } else {
        (MarketMove::Stable, 0)
    }
}

fn percent(delta: f64, opening: f64) -> u32 {
    ((delta / opening) * 100.0).round() as u32
}

pub struct Tracker {
    baselines: DashMap<(String, String), Baseline>,
    runnings: DashMap<String, DateTime<Utc>>,
    velocity_window: Duration,
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            baselines: DashMap::new(),
            runnings: DashMap::new(),
            velocity_window: Duration::minutes(VELOCITY_WINDOW_MINS),
        }
    }

    /// Bind the event's baselines to a running. A changed start time means
    /// a new running of the fixture and discards the old baselines.
    pub fn begin_cycle(&self, event_id: &str, start_time: DateTime<Utc>) {
        let previous = self.runnings.insert(event_id.to_string(), start_time);
        if let Some(prev) = previous.filter(|prev| *prev != start_time) {
            let before = self.baselines.len();
            self.baselines.retain(|(event, _), _| event != event_id);
            info!(
                event_id,
                previous_start = %prev,
                new_start = %start_time,
                discarded = before - self.baselines.len(),
                "Event re-initialised, baselines reset"
            );
        }
    }

    /// Record the latest best price and report movement.
    ///
    /// A missing or non-positive price leaves state untouched and yields
    /// `None`. The first observation sets the opening line and reports a
    /// stable market. Velocity is non-zero only when the velocity window
    /// has elapsed since the last accepted observation; otherwise it is 0
    /// and the last observation is kept as is.
    pub fn update(
        &self,
        event_id: &str,
        entrant_key: &str,
        latest_best_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<Movement> {
        let price = latest_best_price.filter(|p| p.is_finite() && *p > 0.0)?;

        match self.baselines.entry((event_id.to_string(), entrant_key.to_string())) {
            Entry::Vacant(slot) => {
                slot.insert(Baseline {
                    opening_price: price,
                    last_price: price,
                    last_observed_at: now,
                });
                debug!(event_id, entrant = entrant_key, opening = price, "Opening line set");
                Some(Movement {
                    direction: MarketMove::Stable,
                    percent: 0,
                    opening_price: price,
                    current_price: price,
                    velocity: 0.0,
                })
            }
            Entry::Occupied(mut slot) => {
                let baseline = slot.get_mut();
                let (direction, pct) = classify(baseline.opening_price, price);

                let elapsed = now - baseline.last_observed_at;
                let velocity = if elapsed >= self.velocity_window {
                    let minutes = elapsed.num_seconds() as f64 / 60.0;
                    let v = (price - baseline.last_price) / minutes;
                    baseline.last_price = price;
                    baseline.last_observed_at = now;
                    v
                } else {
                    0.0
                };

                Some(Movement {
                    direction,
                    percent: pct,
                    opening_price: baseline.opening_price,
                    current_price: price,
                    velocity,
                })
            }
        }
    }

    pub fn baseline(&self, event_id: &str, entrant_key: &str) -> Option<Baseline> {
        self.baselines
            .get(&(event_id.to_string(), entrant_key.to_string()))
            .map(|b| *b)
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    pub fn export(&self) -> TrackerState {
        let mut baselines: Vec<BaselineEntry> = self
            .baselines
            .iter()
            .map(|item| BaselineEntry {
                event_id: item.key().0.clone(),
                entrant: item.key().1.clone(),
                baseline: *item.value(),
            })
            .collect();
        baselines.sort_by(|a, b| (&a.event_id, &a.entrant).cmp(&(&b.event_id, &b.entrant)));

        let mut runnings: Vec<(String, DateTime<Utc>)> = self
            .runnings
            .iter()
            .map(|item| (item.key().clone(), *item.value()))
            .collect();
        runnings.sort();

        TrackerState { runnings, baselines }
    }

    pub fn from_state(state: TrackerState) -> Self {
        let tracker = Self::new();
        for (event_id, start) in state.runnings {
            tracker.runnings.insert(event_id, start);
        }
        for entry in state.baselines {
            tracker
                .baselines
                .insert((entry.event_id, entry.entrant), entry.baseline);
        }
        tracker
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
