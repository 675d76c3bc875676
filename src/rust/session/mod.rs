//! The session controller: owns the camera, drives the recording and
//! prediction loops, and enforces the `Idle` / `Recording` / `Predicting`
//! state machine.
//!
//! ```no_run
//! # async fn demo() -> Result<(), teachable::SessionError> {
//! use teachable::{Facing, PooledEmbedding, Session, SyntheticCamera};
//!
//! let session = Session::builder()
//!     .with_frame_source(SyntheticCamera::new())
//!     .with_embedding(PooledEmbedding::default())
//!     .build()?;
//!
//! session.open_camera(Facing::User).await?;
//! session.add_label("cat").await?;
//! session.add_label("dog").await?;
//! session.start_recording("cat").await?;
//! // ... frames are collected every 100ms until stopped or the label is full
//! session.stop_recording().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use ndarray::Array1;
use tokio::sync::Mutex;

mod builder;
mod error;
mod events;
mod state;
mod task;

pub use builder::SessionBuilder;
pub use error::SessionError;
pub use events::{CycleFailure, EventChannel, LogObserver, LoopKind, SessionEvent, SessionObserver};
pub use state::SessionState;

use crate::classifier::{ClassifyError, Prediction, SharedTrainingSet, TrainingSet, MIN_TRAINED_LABELS};
use crate::config::{CollectionPolicy, SessionConfig};
use crate::embedding::EmbeddingProvider;
use crate::export::{self, ExportError};
use crate::frame::{Facing, FrameSource};
use crate::store::StoreError;
use events::Observers;
use task::{LoopHandle, Next};

/// Progress through an automatic round-robin collection.
#[derive(Debug)]
struct RoundRobin {
    queue: VecDeque<String>,
    per_label: usize,
    collected: usize,
}

struct Inner {
    state: SessionState,
    /// Bumped on every state change; a loop cycle only has effects while its generation is current.
    generation: u64,
    camera: Option<Box<dyn FrameSource>>,
    facing: Facing,
    active: Option<LoopHandle>,
    collection: Option<RoundRobin>,
    failures: u32,
}

impl Inner {
    fn camera_open(&self) -> bool {
        self.camera.as_ref().map(|c| c.is_open()).unwrap_or(false)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            camera.close();
        }
    }
}

struct Core {
    config: SessionConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    training: SharedTrainingSet,
    observers: Observers,
    inner: Mutex<Inner>,
}

/// Handle to one training session. Cheap to clone; clones share the session.
///
/// Lock order is always session state first, then the training set.
#[derive(Clone)]
pub struct Session {
    core: Arc<Core>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.core.config)
            .field("embedding_size", &self.core.embedder.dimension())
            .finish()
    }
}

fn insufficient(err: ExportError) -> SessionError {
    match err {
        ExportError::InsufficientTraining { trained } => SessionError::InsufficientTraining { trained },
        other => SessionError::Export(other),
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn from_parts(
        config: SessionConfig,
        camera: Option<Box<dyn FrameSource>>,
        embedder: Arc<dyn EmbeddingProvider>,
        training: SharedTrainingSet,
        observers: Observers,
    ) -> Self {
        let facing = config.facing;
        let inner = Inner {
            state: SessionState::Idle,
            generation: 0,
            camera,
            facing,
            active: None,
            collection: None,
            failures: 0,
        };
        Self {
            core: Arc::new(Core {
                config,
                embedder,
                training,
                observers,
                inner: Mutex::new(inner),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    /// The training set, for sharing with another session.
    pub fn training_set(&self) -> SharedTrainingSet {
        Arc::clone(&self.core.training)
    }

    pub async fn state(&self) -> SessionState {
        self.core.inner.lock().await.state.clone()
    }

    // --- camera ---------------------------------------------------------

    /// Opens the camera, closing any device the source currently holds.
    ///
    /// A running loop keeps going on the new device. If the open fails the
    /// session drops back to `Idle`.
    pub async fn open_camera(&self, facing: Facing) -> Result<(), SessionError> {
        let mut inner = self.core.inner.lock().await;
        self.core.open_locked(&mut inner, facing)
    }

    /// Switches between front and back camera by closing and reopening.
    /// With no camera open, only the preferred facing changes.
    ///
    /// The device is closed and reopened under one lock, so a loop cycle
    /// never observes the closed device in between.
    pub async fn flip_camera(&self) -> Result<Facing, SessionError> {
        let mut inner = self.core.inner.lock().await;
        let current = inner.camera.as_ref().and_then(|c| c.facing()).unwrap_or(inner.facing);
        let facing = current.flipped();
        inner.facing = facing;
        if inner.camera_open() {
            if let Some(camera) = inner.camera.as_mut() {
                camera.close();
            }
            self.core.open_locked(&mut inner, facing)?;
        }
        Ok(facing)
    }

    /// Stops any loop and releases the device.
    pub async fn close_camera(&self) {
        let mut inner = self.core.inner.lock().await;
        self.core.transition(&mut inner, SessionState::Idle);
        if let Some(camera) = inner.camera.as_mut() {
            camera.close();
        }
    }

    /// Installs a different frame source. The old one is closed first; the new one starts closed.
    pub async fn replace_frame_source(&self, source: impl FrameSource + 'static) {
        let mut inner = self.core.inner.lock().await;
        self.core.transition(&mut inner, SessionState::Idle);
        if let Some(mut old) = inner.camera.take() {
            old.close();
        }
        inner.camera = Some(Box::new(source));
    }

    pub async fn camera_open(&self) -> bool {
        self.core.inner.lock().await.camera_open()
    }

    // --- labels ---------------------------------------------------------

    pub async fn add_label(&self, label: &str) -> Result<(), SessionError> {
        let mut training = self.core.training.lock().await;
        training.add_label(label)?;
        info!("Added label '{}'", label.trim());
        Ok(())
    }

    /// Deletes a label with its examples and rebuilds the classifier.
    ///
    /// Recording that label, or predicting with fewer than two trained labels
    /// left, returns the session to `Idle`.
    pub async fn remove_label(&self, label: &str) -> Result<usize, SessionError> {
        let label = label.trim();
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        let mut training = core.training.lock().await;
        let dropped = training.remove_label(label)?;

        let stop = match &inner.state {
            SessionState::Recording(current) => current == label,
            SessionState::Predicting => training.trained_label_count() < MIN_TRAINED_LABELS,
            SessionState::Idle => false,
        };
        if stop {
            core.transition(&mut inner, SessionState::Idle);
        }
        Ok(dropped)
    }

    /// Forgets every example but keeps the labels.
    pub async fn reset_examples(&self) {
        let mut inner = self.core.inner.lock().await;
        self.core.transition(&mut inner, SessionState::Idle);
        self.core.training.lock().await.reset();
        info!("All training examples cleared");
    }

    pub async fn labels(&self) -> Vec<String> {
        self.core.training.lock().await.store().labels().to_vec()
    }

    /// Example counts per label, for display.
    pub async fn label_counts(&self) -> BTreeMap<String, usize> {
        self.core.training.lock().await.label_counts()
    }

    // --- recording ------------------------------------------------------

    /// `Idle -> Recording(label)`. Frames are collected every `record_interval`.
    pub async fn start_recording(&self, label: &str) -> Result<(), SessionError> {
        let label = label.trim();
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        if !inner.state.is_idle() {
            return Err(SessionError::InvalidTransition {
                from: inner.state.clone(),
                to: "recording",
            });
        }
        if !inner.camera_open() {
            return Err(SessionError::NoActiveCamera);
        }

        let training = core.training.lock().await;
        let store = training.store();
        if !store.contains(label) {
            return Err(SessionError::UnknownLabel(label.to_string()));
        }
        if store.is_full(label) {
            return Err(SessionError::CapacityExceeded {
                label: label.to_string(),
                cap: store.cap(),
            });
        }

        let collection = match core.config.collection {
            CollectionPolicy::Manual => None,
            CollectionPolicy::RoundRobin { samples_per_label } => {
                let labels = store.labels();
                let start = labels.iter().position(|l| l == label).unwrap_or(0);
                let queue = labels[start + 1..]
                    .iter()
                    .chain(labels[..start].iter())
                    .cloned()
                    .collect();
                Some(RoundRobin {
                    queue,
                    per_label: samples_per_label,
                    collected: 0,
                })
            }
        };
        drop(training);

        core.transition(&mut inner, SessionState::Recording(label.to_string()));
        inner.collection = collection;
        core.start_loop(&mut inner, LoopKind::Recording);
        Ok(())
    }

    /// `Recording -> Idle`, then straight into `Predicting` when
    /// `auto_predict` is set and two labels are trained. Returns the resulting state.
    pub async fn stop_recording(&self) -> Result<SessionState, SessionError> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        if !inner.state.is_recording() {
            return Err(SessionError::InvalidTransition {
                from: inner.state.clone(),
                to: "idle",
            });
        }
        let training = core.training.lock().await;
        Ok(core.finish_recording(&mut inner, &training))
    }

    // --- prediction -----------------------------------------------------

    /// `Idle -> Predicting`. Needs two labels with at least one example each.
    pub async fn start_predicting(&self) -> Result<(), SessionError> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        if !inner.state.is_idle() {
            return Err(SessionError::InvalidTransition {
                from: inner.state.clone(),
                to: "predicting",
            });
        }
        let trained = core.training.lock().await.trained_label_count();
        if trained < MIN_TRAINED_LABELS {
            return Err(SessionError::InsufficientTraining { trained });
        }
        if !inner.camera_open() {
            return Err(SessionError::NoActiveCamera);
        }

        core.transition(&mut inner, SessionState::Predicting);
        core.start_loop(&mut inner, LoopKind::Predicting);
        Ok(())
    }

    pub async fn stop_predicting(&self) -> Result<(), SessionError> {
        let mut inner = self.core.inner.lock().await;
        if !inner.state.is_predicting() {
            return Err(SessionError::InvalidTransition {
                from: inner.state.clone(),
                to: "idle",
            });
        }
        self.core.transition(&mut inner, SessionState::Idle);
        Ok(())
    }

    /// Stops whatever loop is running without any automatic follow-up. Returns the previous state.
    pub async fn stop(&self) -> SessionState {
        let mut inner = self.core.inner.lock().await;
        let previous = inner.state.clone();
        self.core.transition(&mut inner, SessionState::Idle);
        previous
    }

    // --- one-shot actions -------------------------------------------------

    /// Captures and classifies a single frame. Only while `Idle`.
    pub async fn classify_frame(&self) -> Result<Prediction, SessionError> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        core.require_idle(&inner, "classify")?;
        let vector = core.capture_and_embed(&mut inner).await?;
        let prediction = core.training.lock().await.classify(&vector)?;
        core.observers.prediction_ready(&prediction);
        Ok(prediction)
    }

    /// Captures a single frame and stores it as an example for `label`. Only while `Idle`.
    pub async fn capture_example(&self, label: &str) -> Result<usize, SessionError> {
        let label = label.trim();
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        core.require_idle(&inner, "capture")?;
        let vector = core.capture_and_embed(&mut inner).await?;
        let mut training = core.training.lock().await;
        let count = training.add_example(label, vector)?;
        core.observers.example_added(label, count);
        if count >= training.store().cap() {
            core.observers.capacity_reached(label, training.store().cap());
        }
        Ok(count)
    }

    // --- export -----------------------------------------------------------

    /// Serialises the examples as JSON. Needs two trained labels.
    pub async fn export_model(&self) -> Result<Vec<u8>, SessionError> {
        let training = self.core.training.lock().await;
        export::export_model(training.store()).map_err(insufficient)
    }

    pub async fn save_model(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let bytes = self.export_model().await?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, bytes).await?;
        info!("Model saved to {:?}", path);
        Ok(())
    }

    /// Replaces all labels and examples with an exported model. Only while `Idle`.
    pub async fn import_model(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let core = &self.core;
        let inner = core.inner.lock().await;
        core.require_idle(&inner, "import")?;
        let store = export::import_model(bytes)?;
        if let Some(dimension) = store.dimension() {
            let expected = core.embedder.dimension();
            if dimension != expected {
                return Err(SessionError::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
        }
        info!(
            "Imported model with {} labels and {} examples",
            store.labels().len(),
            store.total_examples()
        );
        core.training.lock().await.replace_store(store);
        Ok(())
    }
}

impl Core {
    fn open_locked(&self, inner: &mut Inner, facing: Facing) -> Result<(), SessionError> {
        let resolution = self.config.resolution;
        let camera = inner
            .camera
            .as_mut()
            .ok_or_else(|| SessionError::Device("No frame source configured".into()))?;

        match camera.open(facing, resolution) {
            Ok(()) => {
                inner.facing = facing;
                info!("Camera open ({} facing)", facing);
                Ok(())
            }
            Err(err) => {
                self.transition(inner, SessionState::Idle);
                let err = SessionError::from(err);
                warn!("Error accessing camera: {}", err);
                Err(err)
            }
        }
    }

    fn require_idle(&self, inner: &Inner, action: &'static str) -> Result<(), SessionError> {
        if inner.state.is_idle() {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: inner.state.clone(),
                to: action,
            })
        }
    }

    /// Moves to `to`, cancelling the active loop and invalidating in-flight cycles.
    fn transition(&self, inner: &mut Inner, to: SessionState) {
        if inner.state == to {
            return;
        }
        inner.generation += 1;
        if let Some(handle) = inner.active.take() {
            handle.cancel();
        }
        inner.failures = 0;
        inner.collection = None;
        let from = std::mem::replace(&mut inner.state, to);
        self.observers.state_changed(&from, &inner.state);
    }

    fn start_loop(self: &Arc<Self>, inner: &mut Inner, kind: LoopKind) {
        let weak: Weak<Core> = Arc::downgrade(self);
        let generation = inner.generation;
        let (period, backoff) = match kind {
            LoopKind::Recording => (self.config.record_interval(), self.config.record_interval()),
            LoopKind::Predicting => (self.config.predict_interval(), self.config.backoff_interval()),
        };

        let handle = LoopHandle::spawn(period, backoff, move || {
            let weak = weak.clone();
            async move {
                let Some(core) = weak.upgrade() else {
                    return Next::Stop;
                };
                match kind {
                    LoopKind::Recording => core.record_cycle(generation).await,
                    LoopKind::Predicting => core.predict_cycle(generation).await,
                }
            }
        });
        inner.active = Some(handle);
        debug!("{:?} loop started (generation {})", kind, generation);
    }

    /// Capture then embed. The frame is released before this returns, whatever the outcome.
    ///
    /// Providers that report [`EmbeddingProvider::is_blocking`] run on the
    /// blocking pool so inference does not stall the runtime's workers.
    async fn capture_and_embed(&self, inner: &mut Inner) -> Result<Array1<f32>, SessionError> {
        let camera = inner
            .camera
            .as_mut()
            .filter(|c| c.is_open())
            .ok_or(SessionError::NoActiveCamera)?;
        let mut frame = camera.capture(self.config.normalization)?;
        if self.config.mirror {
            frame.mirror_horizontally();
        }

        if !self.embedder.is_blocking() {
            return Ok(self.embedder.embed(&frame)?);
        }
        let embedder = Arc::clone(&self.embedder);
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&frame))
            .await
            .map_err(|e| SessionError::Embedding(format!("Embedding task failed: {}", e)))??;
        Ok(vector)
    }

    fn finish_recording(self: &Arc<Self>, inner: &mut Inner, training: &TrainingSet) -> SessionState {
        self.transition(inner, SessionState::Idle);
        let trained = training.trained_label_count();
        if self.config.auto_predict && trained >= MIN_TRAINED_LABELS && inner.camera_open() {
            info!("{} labels trained, starting predictions", trained);
            self.transition(inner, SessionState::Predicting);
            self.start_loop(inner, LoopKind::Predicting);
        }
        inner.state.clone()
    }

    /// Ends the active loop after a failure that retrying will not fix.
    fn abort(&self, inner: &mut Inner, err: SessionError) -> Next {
        self.transition(inner, SessionState::Idle);
        self.observers.error(err);
        Next::Stop
    }

    fn report_failure(&self, inner: &mut Inner, kind: LoopKind, err: &SessionError) {
        inner.failures += 1;
        self.observers.cycle_failed(&CycleFailure {
            kind,
            message: err.to_string(),
            consecutive: inner.failures,
        });
    }

    async fn record_cycle(self: &Arc<Self>, generation: u64) -> Next {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return Next::Stop;
        }
        let Some(label) = inner.state.recording_label().map(str::to_string) else {
            return Next::Stop;
        };

        let vector = match self.capture_and_embed(&mut inner).await {
            Ok(vector) => vector,
            Err(err) if err.is_transient() => {
                self.report_failure(&mut inner, LoopKind::Recording, &err);
                return Next::Continue;
            }
            Err(err) => return self.abort(&mut inner, err),
        };
        inner.failures = 0;

        let mut training = self.training.lock().await;
        let cap = training.store().cap();
        let full = match training.add_example(&label, vector) {
            Ok(count) => {
                self.observers.example_added(&label, count);
                count >= cap
            }
            Err(StoreError::CapacityExceeded { .. }) => true,
            Err(StoreError::UnknownLabel(_)) => {
                warn!("Label '{}' was deleted while recording, discarding frame", label);
                return self.abort(&mut inner, SessionError::UnknownLabel(label));
            }
            Err(err) => return self.abort(&mut inner, err.into()),
        };
        if full {
            self.observers.capacity_reached(&label, cap);
        }

        let advance = match inner.collection.as_mut() {
            None => {
                if !full {
                    return Next::Continue;
                }
                None
            }
            Some(round) => {
                round.collected += 1;
                if !full && round.collected < round.per_label {
                    return Next::Continue;
                }
                let store = training.store();
                let next = std::iter::from_fn(|| round.queue.pop_front())
                    .find(|candidate| store.contains(candidate) && !store.is_full(candidate));
                round.collected = 0;
                next
            }
        };

        match advance {
            Some(next) => {
                info!("Round-robin collection moving on to '{}'", next);
                let from = std::mem::replace(&mut inner.state, SessionState::Recording(next));
                self.observers.state_changed(&from, &inner.state);
                Next::Continue
            }
            None => {
                self.finish_recording(&mut inner, &training);
                Next::Stop
            }
        }
    }

    async fn predict_cycle(self: &Arc<Self>, generation: u64) -> Next {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || !inner.state.is_predicting() {
            return Next::Stop;
        }

        let vector = match self.capture_and_embed(&mut inner).await {
            Ok(vector) => vector,
            Err(err) if err.is_transient() => {
                self.report_failure(&mut inner, LoopKind::Predicting, &err);
                let limit = self.config.max_consecutive_failures;
                if inner.failures >= limit {
                    return self.abort(&mut inner, SessionError::TooManyFailures(limit));
                }
                return Next::Backoff;
            }
            Err(err) => return self.abort(&mut inner, err),
        };
        inner.failures = 0;

        let result = self.training.lock().await.classify(&vector);
        match result {
            Ok(prediction) => {
                self.observers.prediction_ready(&prediction);
                Next::Continue
            }
            Err(ClassifyError::NotTrained { trained }) => {
                info!("Only {} trained label(s) left, stopping predictions", trained);
                self.abort(&mut inner, SessionError::NotTrained)
            }
            Err(err) => self.abort(&mut inner, err.into()),
        }
    }
}
