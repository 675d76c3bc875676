//! Feature extraction: frame in, fixed-length vector out.

use ndarray::{Array1, Array4};

use crate::frame::Frame;

mod onnx;
mod pooled;

pub use onnx::{OnnxEmbedding, OnnxEmbeddingConfig, TensorLayout};
pub use pooled::PooledEmbedding;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbeddingError {
    /// The backend failed to load or initialise.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// A single inference failed. Transient.
    #[error("Embedding inference failed: {0}")]
    Inference(String),
    #[error("Unexpected tensor shape: {0}")]
    Shape(String),
}

impl From<ort::Error> for EmbeddingError {
    fn from(err: ort::Error) -> Self {
        EmbeddingError::Inference(err.to_string())
    }
}

/// Maps a normalised image tensor to a feature vector.
///
/// Every vector returned by one provider has the same length, [`dimension`](Self::dimension).
/// The session treats the provider as a black box.
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, frame: &Frame) -> Result<Array1<f32>, EmbeddingError>;

    /// `true` when [`embed`](Self::embed) is heavy enough to belong on the blocking thread pool.
    fn is_blocking(&self) -> bool {
        false
    }
}

/// Nearest-neighbour resampling of an NHWC batch-of-one tensor.
pub(crate) fn resample_nearest(tensor: &Array4<f32>, height: usize, width: usize) -> Array4<f32> {
    let shape = tensor.shape();
    let (src_h, src_w, channels) = (shape[1], shape[2], shape[3]);
    if src_h == height && src_w == width {
        return tensor.clone();
    }
    Array4::from_shape_fn((1, height, width, channels), |(_, y, x, c)| {
        let sy = (y * src_h / height).min(src_h.saturating_sub(1));
        let sx = (x * src_w / width).min(src_w.saturating_sub(1));
        tensor[[0, sy, sx, c]]
    })
}
