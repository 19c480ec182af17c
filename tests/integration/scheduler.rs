//! Scheduler passes, coalescing and restart behaviour.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use steamer::engine::scheduler::{PassOutcome, PassReport, RefreshState, Scheduler};
use steamer::engine::tracker::Tracker;
use steamer::storage::{self, MemoryStore, PersistedState, SnapshotStore, SnapshotView};
use steamer::types::MarketMove;

use crate::fixtures::{self, event};
use crate::mock_source::{MockSource, Route};

fn completed(outcome: PassOutcome) -> PassReport {
    match outcome {
        PassOutcome::Completed(report) => report,
        PassOutcome::Skipped => panic!("pass was skipped"),
    }
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_pass_refreshes_stale_and_skips_closed() {
    let source = MockSource::new();
    let goldcup = event("goldcup", chrono::Duration::hours(3));
    let champion = event("champion", chrono::Duration::hours(26));
    let finished = event("supreme", -chrono::Duration::hours(1));
    for race in [&goldcup, &champion, &finished] {
        fixtures::serve(&source, race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    }

    let scheduler = Scheduler::with_seed(
        fixtures::pipeline(&source),
        vec![goldcup.clone(), champion.clone(), finished.clone()],
        fixtures::scheduler_config(),
        7,
    );

    let report = completed(scheduler.tick(Utc::now()).await);
    assert_eq!(report.due, 2);
    assert_eq!(report.closed, 1);
    assert_eq!(sorted(report.refreshed), vec!["champion", "goldcup"]);
    assert!(report.failed.is_empty());
    assert_eq!(source.hits(&finished.price_url), 0);

    assert!(scheduler.last_success("goldcup").is_some());
    assert_eq!(scheduler.state_of(&goldcup, Utc::now()), RefreshState::Fresh);
    assert_eq!(scheduler.state_of(&finished, Utc::now()), RefreshState::Closed);

    // Nothing is due straight after a successful pass.
    let report = completed(scheduler.tick(Utc::now()).await);
    assert_eq!(report.due, 0);
    assert!(report.refreshed.is_empty());
    assert_eq!(source.hits(&goldcup.price_url), 1);
}

#[tokio::test]
async fn test_failed_event_stays_due() {
    let source = MockSource::new();
    let goldcup = event("goldcup", chrono::Duration::hours(3));
    let champion = event("champion", chrono::Duration::hours(5));
    fixtures::serve(&source, &goldcup, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    fixtures::serve(&source, &champion, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    source.route(&champion.price_url, Route::Unreachable);

    let scheduler = Scheduler::with_seed(
        fixtures::pipeline(&source),
        vec![goldcup.clone(), champion.clone()],
        fixtures::scheduler_config(),
        7,
    );

    let report = completed(scheduler.tick(Utc::now()).await);
    assert_eq!(report.refreshed, vec!["goldcup"]);
    assert_eq!(report.failed, vec!["champion"]);
    assert!(scheduler.last_success("champion").is_none());
    assert_eq!(scheduler.state_of(&champion, Utc::now()), RefreshState::Stale);
    assert_eq!(source.open_sessions(), 0);

    // Source recovers; the next pass picks up only the failed event.
    fixtures::serve(&source, &champion, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    let report = completed(scheduler.tick(Utc::now()).await);
    assert_eq!(report.due, 1);
    assert_eq!(report.refreshed, vec!["champion"]);
}

#[tokio::test]
async fn test_pass_is_capped() {
    let source = MockSource::new();
    let races: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| event(id, chrono::Duration::hours(4)))
        .collect();
    for race in &races {
        fixtures::serve(&source, race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    }
    let mut config = fixtures::scheduler_config();
    config.max_events_per_pass = 1;

    let scheduler = Scheduler::with_seed(fixtures::pipeline(&source), races, config, 3);

    let report = completed(scheduler.tick(Utc::now()).await);
    assert_eq!(report.due, 3);
    assert_eq!(report.refreshed.len(), 1);

    let report = completed(scheduler.tick(Utc::now()).await);
    assert_eq!(report.due, 2);
    assert_eq!(report.refreshed.len(), 1);
}

#[tokio::test]
async fn test_overlapping_tick_is_coalesced() {
    let source = MockSource::new();
    let goldcup = event("goldcup", chrono::Duration::hours(3));
    fixtures::serve(&source, &goldcup, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    source.set_latency(Duration::from_millis(100));

    let scheduler = Scheduler::with_seed(
        fixtures::pipeline(&source),
        vec![goldcup.clone()],
        fixtures::scheduler_config(),
        7,
    );

    let now = Utc::now();
    let (first, second) = tokio::join!(scheduler.tick(now), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.tick(now).await
    });

    assert_eq!(completed(first).refreshed, vec!["goldcup"]);
    assert_eq!(second, PassOutcome::Skipped);
    assert_eq!(source.hits(&goldcup.price_url), 1);
}

#[tokio::test]
async fn test_read_through_records_success() {
    let source = MockSource::new();
    let goldcup = event("goldcup", chrono::Duration::hours(3));
    fixtures::serve(&source, &goldcup, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());

    let scheduler = Scheduler::with_seed(
        fixtures::pipeline(&source),
        vec![goldcup.clone()],
        fixtures::scheduler_config(),
        7,
    );

    assert!(matches!(scheduler.read_through("unknown").await, SnapshotView::NotYetAvailable));

    let view = scheduler.read_through("goldcup").await;
    assert_eq!(view.snapshot().unwrap().entrants.len(), 4);
    assert!(scheduler.last_success("goldcup").is_some());

    // The cold-start result counts as a refresh.
    let report = completed(scheduler.tick(Utc::now()).await);
    assert_eq!(report.due, 0);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let path = std::env::temp_dir()
        .join(format!("steamer_it_state_{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();

    let source = MockSource::new();
    let goldcup = event("goldcup", chrono::Duration::hours(3));
    let form = fixtures::gold_cup_form();
    fixtures::serve(&source, &goldcup, &fixtures::gold_cup_prices("6/4"), &form);

    {
        let pipeline = fixtures::pipeline(&source);
        let scheduler = Scheduler::with_seed(
            pipeline.clone(),
            vec![goldcup.clone()],
            fixtures::scheduler_config(),
            7,
        );
        completed(scheduler.tick(Utc::now()).await);

        let state = PersistedState::capture(pipeline.store().as_ref(), pipeline.tracker().export());
        tokio_test::assert_ok!(storage::save_state(&state, Some(&path)));
    }

    let state = storage::load_state(Some(&path)).unwrap().unwrap();
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::with_snapshots(state.snapshots));
    let tracker = Arc::new(Tracker::from_state(state.tracker));
    let pipeline = fixtures::build_pipeline(&source, 3, store, tracker);
    let scheduler = Scheduler::with_seed(
        pipeline.clone(),
        vec![goldcup.clone()],
        fixtures::scheduler_config(),
        7,
    );

    // Restored snapshot is served and counts as the last success.
    assert!(pipeline.current("goldcup").is_available());
    assert_eq!(scheduler.state_of(&goldcup, Utc::now()), RefreshState::Fresh);

    // The opening line from before the restart still anchors movement.
    fixtures::serve(&source, &goldcup, &fixtures::gold_cup_prices("5/4"), &form);
    let snap = tokio_test::assert_ok!(pipeline.run_cycle(&goldcup, Utc::now()).await);
    let movement = snap.entrant("Galopin Des Champs").unwrap().derived.movement.unwrap();
    assert_eq!(movement.direction, MarketMove::Steamer);
    assert_eq!(movement.opening_price, 2.5);

    tokio_test::assert_ok!(storage::delete_state(Some(&path)));
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let source = MockSource::new();
    let goldcup = event("goldcup", chrono::Duration::hours(3));
    fixtures::serve(&source, &goldcup, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());

    let scheduler = Scheduler::with_seed(
        fixtures::pipeline(&source),
        vec![goldcup],
        fixtures::scheduler_config(),
        7,
    );

    let mut passes = 0;
    scheduler
        .run(tokio::time::sleep(Duration::from_millis(200)), |_| passes += 1)
        .await;

    assert!(passes >= 2);
    // Only the first pass had anything to do.
    assert_eq!(source.launched(), 2);
}
