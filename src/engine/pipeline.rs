//! One event's refresh cycle, and the read path.
//!
//! A cycle acquires the price stream and then the form stream (strictly
//! sequential), links them, updates the tracker, scores, ranks and then
//! publishes a complete snapshot by replacement. Any failure leaves the
//! previously published snapshot untouched.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::linker;
use super::tracker::Tracker;
use crate::acquisition::fetcher::Fetcher;
use crate::acquisition::Page;
use crate::data::Extractor;
use crate::storage::{SnapshotStore, SnapshotView};
use crate::strategy::{ranking, ScoringEngine};
use crate::types::{Event, EventContext, MarketMove, PipelineError, PriceCard, Snapshot};

pub struct Pipeline {
    fetcher: Fetcher,
    extractor: Arc<dyn Extractor>,
    scoring: ScoringEngine,
    tracker: Arc<Tracker>,
    store: Arc<dyn SnapshotStore>,
}

impl Pipeline {
    pub fn new(
        fetcher: Fetcher,
        extractor: Arc<dyn Extractor>,
        scoring: ScoringEngine,
        tracker: Arc<Tracker>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            scoring,
            tracker,
            store,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Run one full cycle for `event` and publish the result.
    pub async fn run_cycle(&self, event: &Event, now: DateTime<Utc>) -> Result<Arc<Snapshot>, PipelineError> {
        info!(event_id = %event.id, event = %event.display_name(), "Cycle started");

        let prices = self
            .fetcher
            .fetch(&event.price_url, |page: &Page| self.extractor.extract_prices(page))
            .await
            .map_err(|source| PipelineError::Acquisition {
                event_id: event.id.clone(),
                stream: "price",
                source,
            })?;

        let form = self
            .fetcher
            .fetch(&event.form_url, |page: &Page| self.extractor.extract_form(page))
            .await
            .map_err(|source| PipelineError::Acquisition {
                event_id: event.id.clone(),
                stream: "form",
                source,
            })?;

        let mut entrants = linker::link(&prices.runners, &form.runners);
        if entrants.is_empty() {
            return Err(PipelineError::LinkageEmpty {
                event_id: event.id.clone(),
            });
        }

        self.tracker.begin_cycle(&event.id, event.start_time);
        for entrant in entrants.iter_mut() {
            entrant.derived.movement =
                self.tracker
                    .update(&event.id, &entrant.key(), entrant.best_price(), now);
        }

        let sources = observed_sources(&prices);
        let ctx = EventContext {
            rules: event.rules,
            going: form.going.clone(),
        };
        self.scoring.score_all(&mut entrants, &sources, &ctx);
        ranking::rank_by_probability(&mut entrants);

        let top_pick = ranking::top_pick(&entrants).map(|e| e.name.clone());
        let each_way = ranking::each_way_picks(&entrants, top_pick.as_deref())
            .into_iter()
            .map(|e| e.name.clone())
            .collect();

        let steamers = entrants
            .iter()
            .filter(|e| matches!(e.derived.movement, Some(m) if m.direction == MarketMove::Steamer))
            .count();
        let disagreements = entrants.iter().filter(|e| e.derived.disagreement).count();

        let snapshot = Arc::new(Snapshot {
            event_id: event.id.clone(),
            event_name: event.display_name().to_string(),
            race_name: prices.race_name,
            start_time: event.start_time,
            going: form.going,
            bookmakers: sources,
            entrants,
            top_pick,
            each_way,
            updated_at: now,
        });
        self.store.put(snapshot.clone());

        info!(
            event_id = %event.id,
            entrants = snapshot.entrants.len(),
            bookmakers = snapshot.bookmakers.len(),
            top_pick = snapshot.top_pick.as_deref().unwrap_or("-"),
            steamers,
            disagreements,
            "Cycle complete, snapshot published"
        );

        Ok(snapshot)
    }

    /// Latest published snapshot. Never fetches.
    pub fn current(&self, event_id: &str) -> SnapshotView {
        self.store.get(event_id).into()
    }

    /// Serve the stored snapshot, or on a true cold start run one cycle
    /// bounded by `timeout`.
    pub async fn read_through(&self, event: &Event, timeout: Duration) -> SnapshotView {
        if let Some(snapshot) = self.store.get(&event.id) {
            return SnapshotView::Available(snapshot);
        }

        info!(event_id = %event.id, timeout_secs = timeout.as_secs(), "Cold start, fetching synchronously");
        match tokio::time::timeout(timeout, self.run_cycle(event, Utc::now())).await {
            Ok(Ok(snapshot)) => SnapshotView::Available(snapshot),
            Ok(Err(e)) => {
                warn!(event_id = %event.id, error = %e, "Cold-start cycle failed");
                SnapshotView::NotYetAvailable
            }
            Err(_) => {
                let e = PipelineError::ColdStartTimeout {
                    event_id: event.id.clone(),
                    timeout,
                };
                warn!(error = %e, "Cold-start cycle abandoned");
                SnapshotView::NotYetAvailable
            }
        }
    }
}

/// Bookmakers seen this cycle: the page's column headers, or every source
/// quoted when the page lists none.
fn observed_sources(prices: &PriceCard) -> Vec<String> {
    if !prices.bookmakers.is_empty() {
        return prices.bookmakers.clone();
    }
    prices
        .runners
        .iter()
        .flat_map(|r| r.quotes.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
