mod common;

use std::time::Duration;

use common::{init, test_config, wait_until, BLUE, GREEN, RED};
use teachable::{
    EventChannel, Facing, PooledEmbedding, Session, SessionConfig, SessionEvent, SessionState, SyntheticCamera,
};

#[tokio::test(start_paused = true)]
async fn test_record_on_one_camera_predict_on_another() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let config = SessionConfig {
        auto_predict: false,
        ..test_config()
    };

    let recorder_camera = SyntheticCamera::new();
    let recorder_scene = recorder_camera.control();
    let recorder = Session::builder()
        .with_config(config.clone())
        .with_frame_source(recorder_camera)
        .with_embedding(PooledEmbedding::default())
        .build()?;

    let predictor_camera = SyntheticCamera::new();
    let predictor_scene = predictor_camera.control();
    let (channel, mut events) = EventChannel::new();
    let predictor = Session::builder()
        .with_config(config)
        .with_frame_source(predictor_camera)
        .with_embedding(PooledEmbedding::default())
        .with_training_set(recorder.training_set())
        .with_observer(channel)
        .build()?;

    recorder.open_camera(Facing::User).await?;
    predictor.open_camera(Facing::Environment).await?;
    for (label, scene) in [("red", RED), ("blue", BLUE)] {
        recorder.add_label(label).await?;
        recorder_scene.set_scene(scene);
        recorder.capture_example(label).await?;
        recorder.capture_example(label).await?;
    }

    predictor_scene.set_scene(GREEN);
    predictor.start_predicting().await?;
    recorder.add_label("green").await?;
    recorder_scene.set_scene(GREEN);
    recorder.start_recording("green").await?;
    assert_eq!(recorder.state().await, SessionState::Recording("green".into()));
    assert_eq!(predictor.state().await, SessionState::Predicting);

    let recorded = wait_until(Duration::from_secs(2), &recorder, |s| async move {
        s.label_counts().await["green"] >= 3
    });
    assert!(recorded.await);
    recorder.stop().await;
    while events.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_millis(450)).await;
    let mut latest = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::PredictionReady(prediction) = event {
            latest = Some(prediction);
        }
    }
    let prediction = latest.ok_or("no prediction while recording in parallel")?;
    assert_eq!(prediction.label, "green");
    assert_eq!(predictor.state().await, SessionState::Predicting);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stopping_one_session_leaves_the_other_running() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let first_camera = SyntheticCamera::new();
    let scene = first_camera.control();
    let first = Session::builder()
        .with_config(test_config())
        .with_frame_source(first_camera)
        .with_embedding(PooledEmbedding::default())
        .build()?;
    let second = Session::builder()
        .with_config(test_config())
        .with_frame_source(SyntheticCamera::new())
        .with_embedding(PooledEmbedding::default())
        .with_training_set(first.training_set())
        .build()?;

    first.open_camera(Facing::User).await?;
    second.open_camera(Facing::User).await?;
    for (label, colour) in [("red", RED), ("blue", BLUE)] {
        first.add_label(label).await?;
        scene.set_scene(colour);
        first.capture_example(label).await?;
    }

    first.start_predicting().await?;
    second.start_predicting().await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(first.stop().await, SessionState::Predicting);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(first.state().await, SessionState::Idle);
    assert_eq!(second.state().await, SessionState::Predicting);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_recorders_respect_the_cap() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let config = SessionConfig {
        max_examples_per_label: 50,
        record_interval_ms: 1,
        auto_predict: false,
        ..test_config()
    };

    let (first_channel, mut first_events) = EventChannel::new();
    let first = Session::builder()
        .with_config(config.clone())
        .with_frame_source(SyntheticCamera::new())
        .with_embedding(PooledEmbedding::default())
        .with_observer(first_channel)
        .build()?;
    let (second_channel, mut second_events) = EventChannel::new();
    let second = Session::builder()
        .with_config(config)
        .with_frame_source(SyntheticCamera::new())
        .with_embedding(PooledEmbedding::default())
        .with_training_set(first.training_set())
        .with_observer(second_channel)
        .build()?;

    first.open_camera(Facing::User).await?;
    second.open_camera(Facing::User).await?;
    first.add_label("cat").await?;
    first.start_recording("cat").await?;
    second.start_recording("cat").await?;

    for session in [&first, &second] {
        let idle = wait_until(Duration::from_secs(5), session, |s| async move { s.state().await.is_idle() });
        assert!(idle.await);
    }
    assert_eq!(first.label_counts().await["cat"], 50);

    // Every count from 1 to the cap is handed out exactly once across both writers.
    let mut counts = Vec::new();
    for events in [&mut first_events, &mut second_events] {
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::ExampleAdded { count, .. } = event {
                counts.push(count);
            }
        }
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=50).collect::<Vec<usize>>());
    Ok(())
}
