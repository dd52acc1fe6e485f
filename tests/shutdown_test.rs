//! Tests for graceful shutdown of the predictor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use prediktor_core::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
use prediktor_core::{InfillRequest, PredictErrorKind};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_initial_state_is_running() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.state().await, ShutdownState::Running);
    assert!(coordinator.is_accepting());
}

#[tokio::test]
async fn test_multiple_guards_track_correctly() {
    let coordinator = ShutdownCoordinator::new();

    let g1 = coordinator.track();
    let g2 = coordinator.track();
    let g3 = coordinator.track();
    assert_eq!(coordinator.in_flight_count(), 3);

    drop(g1);
    assert_eq!(coordinator.in_flight_count(), 2);

    drop(g2);
    drop(g3);
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn test_track_returns_none_when_draining() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guard = coordinator.track();

    let handle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.initiate(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(coordinator.track().is_none());
    assert_eq!(coordinator.state().await, ShutdownState::Draining);

    drop(guard);
    assert_eq!(handle.await.unwrap(), ShutdownResult::Complete);
}

#[tokio::test]
async fn test_predictor_rejects_after_shutdown() {
    let predictor = common::load_predictor();
    assert_eq!(predictor.shutdown(Duration::from_millis(50)).await, ShutdownResult::Complete);
    assert!(!predictor.is_accepting());

    let err = predictor.predict("I gave", "", None, None, None).await.unwrap_err();
    assert_eq!(err.kind, PredictErrorKind::ShuttingDown);
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_request() {
    let predictor = Arc::new(common::slow_predictor(
        Duration::from_millis(2),
        common::fixture_config(),
    ));

    let request = {
        let predictor = predictor.clone();
        tokio::spawn(async move { predictor.predict("I gave the book to", "", None, None, None).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(predictor.in_flight(), 1);

    let result = predictor.shutdown(Duration::from_secs(10)).await;
    assert_eq!(result, ShutdownResult::Complete);
    let predictions = request.await.unwrap().unwrap();
    assert_eq!(predictions[0].text, " him.");
}

#[tokio::test]
async fn test_drain_timeout_cancels_stragglers() {
    let predictor = Arc::new(common::slow_predictor(
        Duration::from_millis(25),
        common::fixture_config(),
    ));

    let request = {
        let predictor = predictor.clone();
        tokio::spawn(async move {
            predictor
                .predict_request(InfillRequest::gap("I gave the book to", ""), CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let result = predictor.shutdown(Duration::from_millis(30)).await;
    assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });

    let err = request.await.unwrap().unwrap_err();
    assert_eq!(err.kind, PredictErrorKind::ShuttingDown);
}
