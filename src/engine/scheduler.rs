//! Adaptive refresh scheduling.
//!
//! Each tracked event is STALE, FRESH or CLOSED. How long a successful
//! refresh stays fresh depends on how close the event is: a routine
//! ceiling far out, then progressively tighter ceilings inside proximity
//! bands. A pass refreshes a shuffled, capped subset of the stale events
//! one at a time with random gaps between them. Only one pass runs at a
//! time; a tick that arrives while a pass is in flight is skipped.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::pipeline::Pipeline;
use crate::acquisition::random_duration;
use crate::storage::SnapshotView;
use crate::types::Event;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Inside `within` of the start, a refresh goes stale after `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityBand {
    pub within: chrono::Duration,
    pub ceiling: chrono::Duration,
}

impl ProximityBand {
    fn new(within: chrono::Duration, ceiling: chrono::Duration) -> Self {
        Self { within, ceiling }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshPolicy {
    /// Staleness ceiling outside every band.
    pub routine_ceiling: chrono::Duration,
    /// Sorted widest first.
    bands: Vec<ProximityBand>,
}

impl RefreshPolicy {
    pub fn new(routine_ceiling: chrono::Duration, mut bands: Vec<ProximityBand>) -> Self {
        bands.sort_by(|a, b| b.within.cmp(&a.within));
        Self {
            routine_ceiling,
            bands,
        }
    }

    pub fn bands(&self) -> &[ProximityBand] {
        &self.bands
    }

    /// Staleness ceiling at a given time-to-start. The tightest ceiling of
    /// every band that contains the event applies, so ceilings never widen
    /// as the start approaches.
    pub fn ceiling_for(&self, time_to_start: chrono::Duration) -> chrono::Duration {
        self.bands
            .iter()
            .filter(|b| time_to_start <= b.within)
            .map(|b| b.ceiling)
            .fold(self.routine_ceiling, |acc, c| acc.min(c))
    }

    pub fn state(
        &self,
        now: DateTime<Utc>,
        start_time: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
    ) -> RefreshState {
        if now >= start_time {
            return RefreshState::Closed;
        }
        match last_success {
            None => RefreshState::Stale,
            Some(last) if now - last >= self.ceiling_for(start_time - now) => RefreshState::Stale,
            Some(_) => RefreshState::Fresh,
        }
    }

    pub fn needs_refresh(
        &self,
        now: DateTime<Utc>,
        start_time: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
    ) -> bool {
        self.state(now, start_time, last_success) == RefreshState::Stale
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        let h = chrono::Duration::hours;
        let m = chrono::Duration::minutes;
        Self::new(
            h(24),
            vec![
                ProximityBand::new(h(12), h(2)),
                ProximityBand::new(h(5), h(1)),
                ProximityBand::new(h(2), m(30)),
                ProximityBand::new(h(1), m(15)),
                ProximityBand::new(m(30), m(6)),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Due for a refresh.
    Stale,
    Fresh,
    /// Started; never refreshed again.
    Closed,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub policy: RefreshPolicy,
    /// Base pause between passes.
    pub tick_interval: Duration,
    /// Pause is `tick_interval ± pass_jitter`.
    pub pass_jitter: Duration,
    pub max_events_per_pass: usize,
    /// Random gap between consecutive events in one pass.
    pub event_delay: (Duration, Duration),
    /// Extra pause after a failed event before the next one.
    pub failure_cooldown: Duration,
    pub cold_start_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: RefreshPolicy::default(),
            tick_interval: Duration::from_secs(300),
            pass_jitter: Duration::from_secs(60),
            max_events_per_pass: 8,
            event_delay: (Duration::from_secs(30), Duration::from_secs(90)),
            failure_cooldown: Duration::from_secs(60),
            cold_start_timeout: Duration::from_secs(45),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Another pass was in flight.
    Skipped,
    Completed(PassReport),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub due: usize,
    pub closed: usize,
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    events: Vec<Event>,
    config: SchedulerConfig,
    last_success: Mutex<HashMap<String, DateTime<Utc>>>,
    cycle_lock: tokio::sync::Mutex<()>,
    rng: Mutex<StdRng>,
}

impl Scheduler {
    /// Events that already have a published snapshot start out with its
    /// timestamp as their last success.
    pub fn new(pipeline: Arc<Pipeline>, events: Vec<Event>, config: SchedulerConfig) -> Self {
        Self::with_rng(pipeline, events, config, StdRng::from_entropy())
    }

    pub fn with_seed(pipeline: Arc<Pipeline>, events: Vec<Event>, config: SchedulerConfig, seed: u64) -> Self {
        Self::with_rng(pipeline, events, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(pipeline: Arc<Pipeline>, events: Vec<Event>, config: SchedulerConfig, rng: StdRng) -> Self {
        let last_success = events
            .iter()
            .filter_map(|e| {
                pipeline
                    .store()
                    .get(&e.id)
                    .map(|s| (e.id.clone(), s.updated_at))
            })
            .collect();
        Self {
            pipeline,
            events,
            config,
            last_success: Mutex::new(last_success),
            cycle_lock: tokio::sync::Mutex::new(()),
            rng: Mutex::new(rng),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn last_success(&self, event_id: &str) -> Option<DateTime<Utc>> {
        self.last_success.lock().get(event_id).copied()
    }

    /// Serving path for a tracked event: the stored snapshot, or a bounded
    /// cold-start cycle when none exists yet.
    pub async fn read_through(&self, event_id: &str) -> SnapshotView {
        let Some(event) = self.events.iter().find(|e| e.id == event_id) else {
            return SnapshotView::NotYetAvailable;
        };
        let view = self
            .pipeline
            .read_through(event, self.config.cold_start_timeout)
            .await;
        if let SnapshotView::Available(snapshot) = &view {
            self.last_success
                .lock()
                .entry(event.id.clone())
                .or_insert(snapshot.updated_at);
        }
        view
    }

    pub fn state_of(&self, event: &Event, now: DateTime<Utc>) -> RefreshState {
        self.config
            .policy
            .state(now, event.start_time, self.last_success(&event.id))
    }

    /// Stale events for this pass: shuffled, then capped.
    fn plan_pass(&self, now: DateTime<Utc>) -> (Vec<Event>, usize, usize) {
        let mut due = Vec::new();
        let mut closed = 0;
        for event in &self.events {
            match self.state_of(event, now) {
                RefreshState::Stale => due.push(event.clone()),
                RefreshState::Closed => closed += 1,
                RefreshState::Fresh => {}
            }
        }
        let due_count = due.len();
        due.shuffle(&mut *self.rng.lock());
        due.truncate(self.config.max_events_per_pass);
        (due, due_count, closed)
    }

    fn draw_event_delay(&self) -> Duration {
        let (lo, hi) = self.config.event_delay;
        random_duration(&mut *self.rng.lock(), lo, hi)
    }

    /// Pause before the next pass.
    pub fn next_pause(&self) -> Duration {
        let base = self.config.tick_interval;
        let jitter = self.config.pass_jitter.as_millis() as i64;
        if jitter == 0 {
            return base;
        }
        let offset = self.rng.lock().gen_range(-jitter..=jitter);
        let millis = (base.as_millis() as i64 + offset).max(1_000);
        Duration::from_millis(millis as u64)
    }

    /// Run one pass if none is in flight.
    pub async fn tick(&self, now: DateTime<Utc>) -> PassOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            info!("Pass already in flight, tick coalesced");
            return PassOutcome::Skipped;
        };

        let (selected, due, closed) = self.plan_pass(now);
        let mut report = PassReport {
            due,
            closed,
            ..Default::default()
        };

        info!(
            tracked = self.events.len(),
            due,
            closed,
            selected = selected.len(),
            "Refresh pass started"
        );

        for (i, event) in selected.iter().enumerate() {
            if i > 0 {
                let delay = self.draw_event_delay();
                debug!(delay_secs = delay.as_secs_f64(), "Pausing between events");
                tokio::time::sleep(delay).await;
            }

            match self.pipeline.run_cycle(event, Utc::now()).await {
                Ok(snapshot) => {
                    self.last_success
                        .lock()
                        .insert(event.id.clone(), snapshot.updated_at);
                    report.refreshed.push(event.id.clone());
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Event refresh failed, keeping previous snapshot");
                    report.failed.push(event.id.clone());
                    if i + 1 < selected.len() && !self.config.failure_cooldown.is_zero() {
                        tokio::time::sleep(self.config.failure_cooldown).await;
                    }
                }
            }
        }

        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "Refresh pass complete"
        );
        PassOutcome::Completed(report)
    }

    /// Drive passes until `shutdown` resolves. `on_pass` runs after every
    /// tick, e.g. to persist state.
    pub async fn run<S, F>(&self, shutdown: S, mut on_pass: F)
    where
        S: Future<Output = ()>,
        F: FnMut(&PassOutcome),
    {
        tokio::pin!(shutdown);
        info!(
            events = self.events.len(),
            tick_secs = self.config.tick_interval.as_secs(),
            "Scheduler running"
        );

        loop {
            tokio::select! {
                outcome = self.tick(Utc::now()) => on_pass(&outcome),
                _ = &mut shutdown => break,
            }

            let pause = self.next_pause();
            debug!(pause_secs = pause.as_secs(), "Sleeping until next pass");
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = &mut shutdown => break,
            }
        }

        // Give sessions released by an interrupted pass a chance to close.
        tokio::task::yield_now().await;
        info!("Scheduler stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
