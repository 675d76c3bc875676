//! Interactive image-classifier training: capture camera frames, turn them
//! into feature vectors, collect labelled examples, and classify live frames
//! with a k-nearest-neighbour vote.
//!
//! # Basic Usage
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use teachable::{Facing, PooledEmbedding, Session, SyntheticCamera};
//!
//! let camera = SyntheticCamera::new();
//! let scene = camera.control();
//!
//! let session = Session::builder()
//!     .with_frame_source(camera)
//!     .with_embedding(PooledEmbedding::default())
//!     .build()?;
//! session.open_camera(Facing::User).await?;
//! session.add_label("red").await?;
//! session.add_label("blue").await?;
//!
//! scene.set_scene([220, 20, 20]);
//! session.capture_example("red").await?;
//! scene.set_scene([20, 20, 220]);
//! session.capture_example("blue").await?;
//!
//! let prediction = session.classify_frame().await?;
//! assert_eq!(prediction.label, "blue");
//! # Ok(())
//! # }
//! ```
//!
//! # Sharing a training set
//!
//! Two sessions can record and predict at the same time on two different
//! cameras by sharing one training set:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use teachable::{PooledEmbedding, Session, SyntheticCamera};
//!
//! let recorder = Session::builder()
//!     .with_frame_source(SyntheticCamera::new())
//!     .with_embedding(PooledEmbedding::default())
//!     .build()?;
//! let predictor = Session::builder()
//!     .with_frame_source(SyntheticCamera::new())
//!     .with_embedding(PooledEmbedding::default())
//!     .with_training_set(recorder.training_set())
//!     .build()?;
//! # let _ = predictor;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod embedding;
pub mod export;
pub mod frame;
mod runtime;
pub mod session;
pub mod store;

pub use classifier::{ClassifyError, KnnClassifier, NearestNeighbor, Prediction, SharedTrainingSet, TrainingSet};
pub use config::{CollectionPolicy, ConfigError, SessionConfig};
pub use embedding::{EmbeddingError, EmbeddingProvider, OnnxEmbedding, OnnxEmbeddingConfig, PooledEmbedding, TensorLayout};
pub use export::{ExportError, ModelExport};
pub use frame::{
    Facing, Frame, FrameError, FrameSource, ImageFolderCamera, LiveFrames, Normalization, Resolution,
    SyntheticCamera, SyntheticControl,
};
pub use runtime::RuntimeConfig;
pub use session::{
    CycleFailure, EventChannel, LogObserver, LoopKind, Session, SessionBuilder, SessionError, SessionEvent,
    SessionObserver, SessionState,
};
pub use store::{Example, ExampleStore, StoreError};

pub fn init_logger() {
    env_logger::init();
}
