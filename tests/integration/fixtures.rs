//! Shared race fixtures and wiring.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use steamer::acquisition::fetcher::{FetchConfig, Fetcher};
use steamer::acquisition::humanize::HumanizeConfig;
use steamer::acquisition::Launcher;
use steamer::data::embedded::EmbeddedJsonExtractor;
use steamer::engine::pipeline::Pipeline;
use steamer::engine::scheduler::{RefreshPolicy, SchedulerConfig};
use steamer::engine::tracker::Tracker;
use steamer::storage::{MemoryStore, SnapshotStore};
use steamer::strategy::ScoringEngine;
use steamer::types::{Event, FormCard, FormRecord, PriceCard, PriceRecord, RawQuote, RuleSet};

use crate::mock_source::{MockSource, Route};

pub fn event(id: &str, start_in: chrono::Duration) -> Event {
    Event {
        id: id.to_string(),
        name: format!("{id} (test)"),
        price_url: format!("https://prices.example.com/{id}/winner"),
        form_url: format!("https://form.example.com/{id}/"),
        start_time: Utc::now() + start_in,
        rules: RuleSet::NationalHunt,
    }
}

fn row(name: &str, quotes: &[(&str, &str)]) -> PriceRecord {
    PriceRecord {
        name: name.to_string(),
        quotes: quotes
            .iter()
            .map(|(source, fraction)| {
                (
                    source.to_string(),
                    RawQuote {
                        fraction: fraction.to_string(),
                        decimal: None,
                    },
                )
            })
            .collect(),
    }
}

/// Four-runner Gold Cup market. `galopin` is the favourite's price at
/// every bookmaker, so tests can shorten or drift it between cycles.
pub fn gold_cup_prices(galopin: &str) -> PriceCard {
    PriceCard {
        race_name: "Cheltenham Gold Cup".to_string(),
        bookmakers: vec!["Betfair".into(), "Bet365".into(), "Coral".into()],
        runners: vec![
            row(
                "Galopin Des Champs",
                &[("Betfair", galopin), ("Bet365", galopin), ("Coral", galopin)],
            ),
            row("Fact To File", &[("Betfair", "4/1"), ("Bet365", "9/2"), ("Coral", "4/1")]),
            row("Gaelic Warrior", &[("Betfair", "7/1"), ("Bet365", "13/2"), ("Coral", "7/1")]),
            row("Monty's Star", &[("Betfair", "20/1"), ("Bet365", "25/1"), ("Coral", "22/1")]),
        ],
    }
}

pub fn gold_cup_form() -> FormCard {
    let record = |name: &str, trainer: &str, jockey: &str, form: &str| FormRecord {
        name: name.to_string(),
        trainer: Some(trainer.to_string()),
        jockey: Some(jockey.to_string()),
        form: Some(form.to_string()),
        age: Some("8".to_string()),
        weight: Some("11-10".to_string()),
        ..Default::default()
    };
    FormCard {
        going: Some("Good to Soft".to_string()),
        runners: vec![
            record("Galopin Des Champs", "W P Mullins", "P Townend", "1-11"),
            record("Fact To File", "W P Mullins", "M P Walsh", "11-2"),
            record("Gaelic Warrior", "W P Mullins", "D E Mullins", "2P1"),
            // Not in the price card; dropped by the linker.
            record("Non Runner", "A Trainer", "A Jockey", "0"),
        ],
    }
}

fn island<T: serde::Serialize>(marker: &str, card: &T) -> String {
    format!(
        "<html><body><script id=\"{marker}\" type=\"application/json\">{}</script></body></html>",
        serde_json::to_string(card).unwrap()
    )
}

pub fn price_page(card: &PriceCard) -> String {
    island("price-card", card)
}

pub fn form_page(card: &FormCard) -> String {
    island("form-card", card)
}

/// Route both of the event's sources to healthy pages.
pub fn serve(source: &MockSource, event: &Event, prices: &PriceCard, form: &FormCard) {
    source.route(&event.price_url, Route::Html(price_page(prices)));
    source.route(&event.form_url, Route::Html(form_page(form)));
}

/// Fast, deterministic fetch settings.
pub fn fetch_config(max_attempts: u32) -> FetchConfig {
    FetchConfig {
        max_attempts,
        backoff_base: Duration::ZERO,
        backoff_step: Duration::ZERO,
        pacing: (Duration::ZERO, Duration::ZERO),
        attempt_timeout: Duration::from_secs(2),
        proxies: vec![],
        humanize: HumanizeConfig::disabled(),
    }
}

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        policy: RefreshPolicy::default(),
        tick_interval: Duration::from_millis(50),
        pass_jitter: Duration::ZERO,
        max_events_per_pass: 8,
        event_delay: (Duration::ZERO, Duration::ZERO),
        failure_cooldown: Duration::ZERO,
        cold_start_timeout: Duration::from_secs(2),
    }
}

pub fn build_pipeline(
    source: &MockSource,
    max_attempts: u32,
    store: Arc<dyn SnapshotStore>,
    tracker: Arc<Tracker>,
) -> Arc<Pipeline> {
    let launcher: Arc<dyn Launcher> = Arc::new(source.clone());
    Arc::new(Pipeline::new(
        Fetcher::with_seed(launcher, fetch_config(max_attempts), 42),
        Arc::new(EmbeddedJsonExtractor::new("price-card", "form-card")),
        ScoringEngine::default(),
        tracker,
        store,
    ))
}

pub fn pipeline(source: &MockSource) -> Arc<Pipeline> {
    build_pipeline(
        source,
        3,
        Arc::new(MemoryStore::new()),
        Arc::new(Tracker::new()),
    )
}
