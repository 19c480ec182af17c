//! Retry budget, error classification and session hygiene.

use chrono::Utc;

use steamer::types::{AcquisitionError, PipelineError};

use crate::fixtures::{self, event};
use crate::mock_source::{MockSource, Route};

#[tokio::test]
async fn test_exhausted_budget_leaks_no_sessions() {
    let source = MockSource::new();
    let race = event("goldcup", chrono::Duration::hours(3));
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    source.route(&race.price_url, Route::Status(503));
    let pipeline = fixtures::pipeline(&source);

    let err = tokio_test::assert_err!(pipeline.run_cycle(&race, Utc::now()).await);
    match err {
        PipelineError::Acquisition { stream, source: e, .. } => {
            assert_eq!(stream, "price");
            assert!(matches!(e, AcquisitionError::Exhausted { attempts: 3, .. }));
            assert!(matches!(e.root(), AcquisitionError::Blocked(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(source.launched(), 3);
    assert_eq!(source.open_sessions(), 0);
    // The form stream is never attempted once prices fail.
    assert_eq!(source.hits(&race.form_url), 0);
    assert!(!pipeline.current("goldcup").is_available());
}

#[tokio::test]
async fn test_unreachable_form_source() {
    let source = MockSource::new();
    let race = event("goldcup", chrono::Duration::hours(3));
    fixtures::serve(&source, &race, &fixtures::gold_cup_prices("6/4"), &fixtures::gold_cup_form());
    source.route(&race.form_url, Route::Unreachable);
    let pipeline = fixtures::pipeline(&source);

    let err = tokio_test::assert_err!(pipeline.run_cycle(&race, Utc::now()).await);
    assert!(matches!(
        err,
        PipelineError::Acquisition { stream: "form", ref source, .. }
            if matches!(source.root(), AcquisitionError::Network(_))
    ));
    assert_eq!(source.hits(&race.price_url), 1);
    assert_eq!(source.hits(&race.form_url), 3);
    assert_eq!(source.open_sessions(), 0);
}

#[tokio::test]
async fn test_challenge_page_is_structure_failure() {
    let source = MockSource::new();
    let race = event("goldcup", chrono::Duration::hours(3));
    source.route(
        &race.price_url,
        Route::Html("<html><body><p>Checking your browser...</p></body></html>".to_string()),
    );
    let pipeline = fixtures::pipeline(&source);

    let err = tokio_test::assert_err!(pipeline.run_cycle(&race, Utc::now()).await);
    assert!(matches!(
        err,
        PipelineError::Acquisition { ref source, .. }
            if matches!(source.root(), AcquisitionError::StructureNotFound(_))
    ));
    assert_eq!(source.open_sessions(), 0);
}

#[tokio::test]
async fn test_invalid_locator_never_launches() {
    let source = MockSource::new();
    let mut race = event("goldcup", chrono::Duration::hours(3));
    race.price_url = "not a url".to_string();
    let pipeline = fixtures::pipeline(&source);

    let err = tokio_test::assert_err!(pipeline.run_cycle(&race, Utc::now()).await);
    assert!(matches!(
        err,
        PipelineError::Acquisition {
            source: AcquisitionError::InvalidLocator(_),
            ..
        }
    ));
    assert_eq!(source.launched(), 0);
}
