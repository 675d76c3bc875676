mod common;

use std::time::Duration;

use common::{test_config, wait_until, Harness, BLUE, GREEN, RED};
use teachable::{Facing, LoopKind, SessionConfig, SessionError, SessionEvent, SessionState};

fn predictions(events: &[SessionEvent]) -> Vec<&teachable::Prediction> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::PredictionReady(p) => Some(p),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_predicting_requires_two_trained_labels() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("cat", RED)], 3).await;
    h.session.add_label("dog").await?;

    let result = h.session.start_predicting().await;
    assert!(matches!(result, Err(SessionError::InsufficientTraining { trained: 1 })));
    assert_eq!(h.session.state().await, SessionState::Idle);

    h.camera.set_scene(BLUE);
    h.session.capture_example("dog").await?;
    h.session.start_predicting().await?;
    assert_eq!(h.session.state().await, SessionState::Predicting);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cat_dog_predictions() -> Result<(), Box<dyn std::error::Error>> {
    let mut h = Harness::new(SessionConfig {
        auto_predict: true,
        ..test_config()
    });
    h.session.open_camera(Facing::User).await?;
    h.session.add_label("cat").await?;
    h.session.add_label("dog").await?;

    h.camera.set_scene(RED);
    for _ in 0..5 {
        h.session.capture_example("cat").await?;
    }
    h.camera.set_scene(BLUE);
    h.session.start_recording("dog").await?;
    let recorded = wait_until(Duration::from_secs(2), &h.session, |s| async move {
        s.label_counts().await["dog"] >= 5
    });
    assert!(recorded.await);
    assert_eq!(h.session.stop_recording().await?, SessionState::Predicting);
    h.drain();

    tokio::time::sleep(Duration::from_millis(650)).await;
    let events = h.drain();
    let seen = predictions(&events);
    assert_eq!(seen.len(), 3);
    for prediction in seen {
        assert_eq!(prediction.label, "dog");
        let labels: Vec<&str> = prediction.confidences.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["cat", "dog"]);
        let total: f32 = prediction.confidences.values().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(prediction.confidences.values().all(|c| (0.0..=1.0).contains(c)));
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_untrained_label_scores_zero() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 3).await;
    h.session.add_label("green").await?;

    h.camera.set_scene(RED);
    let prediction = h.session.classify_frame().await?;
    assert_eq!(prediction.label, "red");
    assert_eq!(prediction.confidence("red"), Some(1.0));
    assert_eq!(prediction.confidence("green").unwrap_or(0.0), 0.0);

    h.camera.set_scene(GREEN);
    h.session.capture_example("green").await?;
    let prediction = h.session.classify_frame().await?;
    assert_eq!(prediction.confidences.len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_classify_without_training_fails() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED)], 1).await;

    let result = h.session.classify_frame().await;
    assert!(matches!(result, Err(SessionError::NotTrained)));
    assert_eq!(h.camera.live_frames(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_predictions() -> Result<(), Box<dyn std::error::Error>> {
    let mut h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 2).await;

    h.session.start_predicting().await?;
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(h.session.stop().await, SessionState::Predicting);
    h.drain();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(predictions(&h.drain()).is_empty());
    assert!(matches!(
        h.session.stop_predicting().await,
        Err(SessionError::InvalidTransition { from: SessionState::Idle, .. })
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_prediction_aborts_after_repeated_failures() -> Result<(), Box<dyn std::error::Error>> {
    let mut h = Harness::new(SessionConfig {
        max_consecutive_failures: 3,
        ..test_config()
    });
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 2).await;
    h.session.start_predicting().await?;
    h.embedding.set_failing(true);

    // Cycles at 200ms, then backoff retries at 700ms and 1200ms.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.session.state().await, SessionState::Predicting);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.session.state().await, SessionState::Idle);

    let events = h.drain();
    let failures: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::CycleFailed(f) if f.kind == LoopKind::Predicting => Some(f.consecutive),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![1, 2, 3]);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Error(err) if matches!(**err, SessionError::TooManyFailures(3)))));
    assert_eq!(h.camera.live_frames(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_prediction_recovers_after_transient_failure() -> Result<(), Box<dyn std::error::Error>> {
    let mut h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 2).await;
    h.camera.fail_next(1);

    h.session.start_predicting().await?;
    tokio::time::sleep(Duration::from_millis(950)).await;
    assert_eq!(h.session.state().await, SessionState::Predicting);

    // 200ms fails, 700ms succeeds, 900ms succeeds.
    let events = h.drain();
    assert_eq!(predictions(&events).len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_removing_label_below_two_stops_predictions() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE), ("green", GREEN)], 2).await;
    h.session.start_predicting().await?;

    h.session.remove_label("green").await?;
    assert_eq!(h.session.state().await, SessionState::Predicting);
    h.session.remove_label("blue").await?;
    assert_eq!(h.session.state().await, SessionState::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_camera_revoked_while_predicting() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 2).await;
    h.session.start_predicting().await?;

    tokio::time::sleep(Duration::from_millis(250)).await;
    h.camera.revoke();
    let idle = wait_until(Duration::from_secs(1), &h.session, |s| async move { s.state().await.is_idle() });
    assert!(idle.await);
    assert_eq!(h.camera.live_frames(), 0);
    Ok(())
}
