mod common;

use std::time::Duration;

use common::{test_config, Harness, BLUE, RED};
use teachable::{
    EmbeddingProvider, ExportError, Facing, ModelExport, PooledEmbedding, Session, SessionError, SessionState,
    SyntheticCamera,
};

#[tokio::test(start_paused = true)]
async fn test_export_needs_two_trained_labels() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED)], 2).await;
    h.session.add_label("blue").await?;

    let result = h.session.export_model().await;
    assert!(matches!(result, Err(SessionError::InsufficientTraining { trained: 1 })));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_export_lists_every_example() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 3).await;

    let bytes = h.session.export_model().await?;
    let document: ModelExport = serde_json::from_slice(&bytes)?;
    assert_eq!(document.version, 1);
    assert_eq!(document.dimension, PooledEmbedding::default().dimension());
    assert_eq!(document.classes.len(), 2);
    assert!(document.classes.values().all(|vectors| vectors.len() == 3));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_imported_model_classifies_like_original() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 3).await;
    h.camera.set_scene(BLUE);
    let before = h.session.classify_frame().await?;
    let bytes = h.session.export_model().await?;

    let camera = SyntheticCamera::new();
    let scene = camera.control();
    let restored = Session::builder()
        .with_config(test_config())
        .with_frame_source(camera)
        .with_embedding(PooledEmbedding::default())
        .build()?;
    restored.import_model(&bytes).await?;
    restored.open_camera(Facing::User).await?;
    scene.set_scene(BLUE);

    let after = restored.classify_frame().await?;
    assert_eq!(after.label, before.label);
    assert_eq!(after.confidences, before.confidences);

    let mut labels = restored.labels().await;
    labels.sort();
    assert_eq!(labels, vec!["blue".to_string(), "red".to_string()]);
    assert_eq!(restored.label_counts().await, h.session.label_counts().await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_import_rejects_wrong_dimension() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    let document = r#"{"version":1,"dimension":2,"cap":10,"classes":{"a":[[1.0,0.0]],"b":[[0.0,1.0]]}}"#;

    let result = h.session.import_model(document.as_bytes()).await;
    assert!(matches!(result, Err(SessionError::DimensionMismatch { actual: 2, .. })));
    assert!(h.session.labels().await.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_import_rejects_malformed_documents() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());

    let result = h.session.import_model(b"not json").await;
    assert!(matches!(result, Err(SessionError::Export(ExportError::Json(_)))));

    let result = h
        .session
        .import_model(br#"{"version":7,"dimension":1,"cap":1,"classes":{}}"#)
        .await;
    assert!(matches!(result, Err(SessionError::Export(ExportError::UnsupportedVersion(7)))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_import_only_while_idle() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 2).await;
    let bytes = h.session.export_model().await?;

    h.session.start_predicting().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let result = h.session.import_model(&bytes).await;
    assert!(matches!(
        result,
        Err(SessionError::InvalidTransition { from: SessionState::Predicting, .. })
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_save_model_writes_file() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new(test_config());
    h.session.open_camera(Facing::User).await?;
    h.train(&[("red", RED), ("blue", BLUE)], 2).await;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("model.json");
    h.session.save_model(&path).await?;

    let bytes = std::fs::read(&path)?;
    assert_eq!(bytes, h.session.export_model().await?);
    Ok(())
}
