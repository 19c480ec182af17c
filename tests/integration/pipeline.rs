//! Full refresh cycles through the real extractor, tracker and scorer.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use steamer::storage::SnapshotView;
use steamer::types::{MarketMove, PipelineError};

use crate::fixtures::{self, event};
use crate::mock_source::{MockSource, Route};

#[tokio::test]
async fn test_cycle_links_scores_and_ranks() {
    let source = MockSource::new();
    let race = event("goldcup", chrono::Duration::hours(3));
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    let pipeline = fixtures::pipeline(&source);

    let snap = pipeline.run_cycle(&race, Utc::now()).await.unwrap();

    assert_eq!(snap.race_name, "Cheltenham Gold Cup");
    assert_eq!(snap.going.as_deref(), Some("Good to Soft"));
    assert_eq!(snap.bookmakers, vec!["Betfair", "Bet365", "Coral"]);

    // Price card decides the field; the form-only row is dropped.
    assert_eq!(snap.entrants.len(), 4);
    assert!(snap.entrant("Non Runner").is_none());
    assert!(snap.entrant("Monty's Star").unwrap().attributes.trainer.is_none());

    // Ranked by consensus probability.
    assert_eq!(snap.entrants[0].name, "Galopin Des Champs");
    assert_eq!(snap.entrants[3].name, "Monty's Star");
    for pair in snap.entrants.windows(2) {
        assert!(pair[0].derived.implied_probability >= pair[1].derived.implied_probability);
    }

    let galopin = snap.entrant("Galopin Des Champs").unwrap();
    assert!((galopin.derived.implied_probability - 40.0).abs() < 1e-9);
    assert!(galopin.derived.flags.hot);
    assert!(galopin.derived.flags.elite_combo);
    assert_eq!(galopin.derived.best_price, Some(2.5));
    assert_eq!(galopin.derived.movement.unwrap().direction, MarketMove::Stable);

    // Each-way picks never include the top pick and need a big enough price.
    let top = snap.top_pick.as_deref().unwrap();
    assert!(snap.each_way.iter().all(|name| name != top));
    for name in &snap.each_way {
        let mean = snap.entrant(name).unwrap().derived.mean_decimal.unwrap();
        assert!(mean >= 6.0);
    }

    assert_eq!(source.open_sessions(), 0);
}

#[tokio::test]
async fn test_movement_across_cycles() {
    let source = MockSource::new();
    let race = event("goldcup", chrono::Duration::hours(6));
    let form = fixtures::gold_cup_form();
    let pipeline = fixtures::pipeline(&source);
    let t0 = Utc.with_ymd_and_hms(2026, 3, 13, 9, 0, 0).unwrap();

    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &form);
    pipeline.run_cycle(&race, t0).await.unwrap();

    // Shortens to 5/4 after 45 minutes.
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("5/4"), &form);
    let snap = pipeline
        .run_cycle(&race, t0 + chrono::Duration::minutes(45))
        .await
        .unwrap();
    let movement = snap.entrant("Galopin Des Champs").unwrap().derived.movement.unwrap();
    assert_eq!(movement.direction, MarketMove::Steamer);
    assert_eq!(movement.percent, 10);
    assert_eq!(movement.opening_price, 2.5);
    assert!(movement.velocity < 0.0);

    // Drifts to 2/1 five minutes later: inside the velocity window.
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("2/1"), &form);
    let snap = pipeline
        .run_cycle(&race, t0 + chrono::Duration::minutes(50))
        .await
        .unwrap();
    let movement = snap.entrant("Galopin Des Champs").unwrap().derived.movement.unwrap();
    assert_eq!(movement.direction, MarketMove::Drifter);
    assert_eq!(movement.percent, 20);
    assert_eq!(movement.opening_price, 2.5);
    assert_eq!(movement.velocity, 0.0);
}

#[tokio::test]
async fn test_failed_cycle_keeps_previous_snapshot() {
    let source = MockSource::new();
    let race = event("goldcup", chrono::Duration::hours(3));
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    let pipeline = fixtures::pipeline(&source);

    let first = pipeline.run_cycle(&race, Utc::now()).await.unwrap();

    source.route(&race.form_url, Route::Status(403));
    let err = pipeline.run_cycle(&race, Utc::now()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Acquisition { stream: "form", .. }));

    match pipeline.current("goldcup") {
        SnapshotView::Available(current) => assert!(Arc::ptr_eq(&current, &first)),
        SnapshotView::NotYetAvailable => panic!("previous snapshot was discarded"),
    }
    assert_eq!(source.open_sessions(), 0);
}

#[tokio::test]
async fn test_reader_keeps_its_snapshot_across_publish() {
    let source = MockSource::new();
    let race = event("goldcup", chrono::Duration::hours(3));
    let form = fixtures::gold_cup_form();
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &form);
    let pipeline = fixtures::pipeline(&source);

    pipeline.run_cycle(&race, Utc::now()).await.unwrap();
    let held = pipeline.current("goldcup");

    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("11/10"), &form);
    pipeline.run_cycle(&race, Utc::now()).await.unwrap();

    let held = held.snapshot().unwrap();
    assert_eq!(held.entrant("Galopin Des Champs").unwrap().derived.best_price, Some(2.5));
    let latest = pipeline.current("goldcup");
    let best = latest
        .snapshot()
        .unwrap()
        .entrant("Galopin Des Champs")
        .unwrap()
        .derived
        .best_price
        .unwrap();
    assert!((best - 2.1).abs() < 1e-9);
}

#[tokio::test]
async fn test_not_yet_available_before_first_success() {
    let source = MockSource::new();
    let pipeline = fixtures::pipeline(&source);
    assert!(matches!(pipeline.current("goldcup"), SnapshotView::NotYetAvailable));
}

#[tokio::test]
async fn test_cold_start_read_through() {
    let source = MockSource::new();
    let race = event("champion", chrono::Duration::hours(3));
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    let pipeline = fixtures::pipeline(&source);

    let view = pipeline.read_through(&race, std::time::Duration::from_secs(2)).await;
    assert!(view.is_available());
    assert_eq!(source.hits(&race.price_url), 1);

    // Served from the store afterwards.
    let view = pipeline.read_through(&race, std::time::Duration::from_secs(2)).await;
    assert!(view.is_available());
    assert_eq!(source.hits(&race.price_url), 1);
}

#[tokio::test]
async fn test_cold_start_timeout_is_not_yet_available() {
    let source = MockSource::new();
    let race = event("champion", chrono::Duration::hours(3));
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    source.set_latency(std::time::Duration::from_millis(500));
    let pipeline = fixtures::pipeline(&source);

    let view = pipeline
        .read_through(&race, std::time::Duration::from_millis(50))
        .await;
    assert!(!view.is_available());
    assert!(!pipeline.current("champion").is_available());
    assert_eq!(source.launched(), 1);

    // The abandoned attempt closes its session in the background.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(source.open_sessions(), 0);
}
