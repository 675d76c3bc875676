use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{error, info};
use ndarray::{Array1, Array4};
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use super::{resample_nearest, EmbeddingError, EmbeddingProvider};
use crate::classifier::utils::normalize_vector;
use crate::frame::Frame;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Memory layout the network expects for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`, as produced by the frame sources.
    #[default]
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

#[derive(Debug, Clone)]
pub struct OnnxEmbeddingConfig {
    /// Name of the image input. Defaults to the model's first input.
    pub input_name: Option<String>,
    pub input_height: usize,
    pub input_width: usize,
    pub layout: TensorLayout,
    pub runtime: RuntimeConfig,
}

impl Default for OnnxEmbeddingConfig {
    fn default() -> Self {
        Self {
            input_name: None,
            input_height: 224,
            input_width: 224,
            layout: TensorLayout::Nhwc,
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Image embedding backed by an ONNX feature-extraction network (e.g. a
/// MobileNet with its classification head removed).
///
/// Frames are resampled to the configured input size, run through the model,
/// and the first output is flattened and L2-normalised.
pub struct OnnxEmbedding {
    model_path: PathBuf,
    session: Session,
    input_name: String,
    config: OnnxEmbeddingConfig,
    dimension: usize,
}

impl OnnxEmbedding {
    /// Loads the model and infers the embedding size with a blank frame.
    ///
    /// # Errors
    /// `EmbeddingError::Unavailable` if the file is missing, the session
    /// cannot be created, or the model has no inputs/outputs.
    pub fn load(model_path: impl AsRef<Path>, config: OnnxEmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_path = model_path.as_ref().to_path_buf();
        if !model_path.exists() {
            return Err(EmbeddingError::Unavailable(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }
        if config.input_height == 0 || config.input_width == 0 {
            return Err(EmbeddingError::Unavailable("Model input size cannot be zero".into()));
        }

        let session = create_session_builder(&config.runtime)
            .and_then(|builder| builder.commit_from_file(&model_path))
            .map_err(|e| {
                error!("Failed to load embedding model {:?}: {}", model_path, e);
                EmbeddingError::Unavailable(format!("Failed to load model: {}", e))
            })?;

        Self::validate_model(&session)?;
        let input_name = match &config.input_name {
            Some(name) => name.clone(),
            None => session.inputs[0].name.clone(),
        };
        info!("Embedding model loaded from {:?} (input '{}')", model_path, input_name);

        let mut provider = Self {
            model_path,
            session,
            input_name,
            config,
            dimension: 0,
        };

        let blank = Frame::new(Array4::zeros((1, provider.config.input_height, provider.config.input_width, 3)));
        let sample = provider
            .run(&blank)
            .map_err(|e| EmbeddingError::Unavailable(format!("Model test inference failed: {}", e)))?;
        provider.dimension = sample.len();
        info!("Inferred embedding size from model: {}", provider.dimension);

        Ok(provider)
    }

    /// Loads the model on the blocking thread pool.
    pub async fn load_async(model_path: PathBuf, config: OnnxEmbeddingConfig) -> Result<Self, EmbeddingError> {
        tokio::task::spawn_blocking(move || Self::load(model_path, config))
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("Model loading task failed: {}", e)))?
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn validate_model(session: &Session) -> Result<(), EmbeddingError> {
        if session.inputs.is_empty() {
            return Err(EmbeddingError::Unavailable("Model must have an image input".into()));
        }
        if session.outputs.is_empty() {
            return Err(EmbeddingError::Unavailable(
                "Model must have at least 1 output for embeddings".into(),
            ));
        }
        Ok(())
    }

    fn run(&self, frame: &Frame) -> Result<Array1<f32>, EmbeddingError> {
        let resized = resample_nearest(frame.tensor(), self.config.input_height, self.config.input_width);
        let input_dyn = match self.config.layout {
            TensorLayout::Nhwc => resized.into_dyn(),
            TensorLayout::Nchw => resized.permuted_axes([0, 3, 1, 2]).into_dyn(),
        };
        let input = input_dyn.as_standard_layout().into_owned();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            self.input_name.as_str(),
            Tensor::from_array(input)
                .map_err(|e| EmbeddingError::Inference(format!("Failed to create input tensor: {}", e)))?,
        );

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| EmbeddingError::Inference(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        let embedding: Array1<f32> = output_tensor.iter().cloned().collect();
        if embedding.is_empty() {
            return Err(EmbeddingError::Shape("Model produced an empty embedding".into()));
        }
        Ok(normalize_vector(&embedding))
    }
}

impl fmt::Debug for OnnxEmbedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxEmbedding")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl EmbeddingProvider for OnnxEmbedding {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn embed(&self, frame: &Frame) -> Result<Array1<f32>, EmbeddingError> {
        let embedding = self.run(frame)?;
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::Shape(format!(
                "Embedding length changed from {} to {}",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}
