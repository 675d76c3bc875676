#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use env_logger::{Builder, Env};
use ndarray::Array1;
use teachable::{
    EmbeddingError, EmbeddingProvider, EventChannel, Frame, PooledEmbedding, Resolution, Session, SessionConfig,
    SessionEvent, SyntheticCamera, SyntheticControl,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const RED: [u8; 3] = [220, 20, 20];
pub const BLUE: [u8; 3] = [20, 20, 220];
pub const GREEN: [u8; 3] = [20, 220, 20];

// Initialize test logger
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Small frames keep the loops cheap under paused time.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        resolution: Resolution { width: 32, height: 24 },
        ..SessionConfig::default()
    }
}

/// Pooled embedding that can be switched into failing mode.
#[derive(Clone, Default)]
pub struct FlakyEmbedding {
    inner: Arc<PooledEmbedding>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FlakyEmbedding {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for FlakyEmbedding {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed(&self, frame: &Frame) -> Result<Array1<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Inference("model crashed".into()));
        }
        self.inner.embed(frame)
    }
}

pub struct Harness {
    pub session: Session,
    pub camera: SyntheticControl,
    pub embedding: FlakyEmbedding,
    pub events: UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        init();
        let camera = SyntheticCamera::new();
        let control = camera.control();
        let embedding = FlakyEmbedding::default();
        let (channel, events) = EventChannel::new();
        let session = Session::builder()
            .with_config(config)
            .with_frame_source(camera)
            .with_embedding(embedding.clone())
            .with_observer(channel)
            .build()
            .expect("session should build");
        Self {
            session,
            camera: control,
            embedding,
            events,
        }
    }

    /// Everything observed so far.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }

    /// Adds `labels`, then captures `per_label` examples of each with the given scene.
    pub async fn train(&self, classes: &[(&str, [u8; 3])], per_label: usize) {
        for (label, scene) in classes {
            self.session.add_label(label).await.expect("label");
            self.camera.set_scene(*scene);
            for _ in 0..per_label {
                self.session.capture_example(label).await.expect("capture");
            }
        }
    }
}

/// Polls `condition` every 10ms of (paused) time, for at most `limit`.
pub async fn wait_until<F, Fut>(limit: Duration, session: &Session, mut condition: F) -> bool
where
    F: FnMut(Session) -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition(session.clone()).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition(session.clone()).await
}
