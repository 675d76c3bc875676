use std::sync::Arc;

use log::{info, warn};

use super::events::{LogObserver, Observers, SessionObserver};
use super::{Session, SessionError};
use crate::classifier::{KnnClassifier, NearestNeighbor, SharedTrainingSet, TrainingSet};
use crate::config::SessionConfig;
use crate::embedding::EmbeddingProvider;
use crate::frame::FrameSource;
use crate::store::ExampleStore;

/// A builder for constructing a [`Session`] with a fluent interface.
///
/// Only the embedding provider is mandatory. Without a frame source the
/// session can still manage labels and import/export models, but every
/// camera operation fails with a device error.
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    frame_source: Option<Box<dyn FrameSource>>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    classifier: Option<Box<dyn NearestNeighbor>>,
    training: Option<SharedTrainingSet>,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_frame_source(mut self, source: impl FrameSource + 'static) -> Self {
        self.frame_source = Some(Box::new(source));
        self
    }

    pub fn with_embedding(mut self, provider: impl EmbeddingProvider + 'static) -> Self {
        self.embedding = Some(Arc::new(provider));
        self
    }

    /// Uses a provider that is already shared with other sessions.
    pub fn with_shared_embedding(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self
    }

    /// Replaces the default k-NN classifier. Ignored when a shared training set is supplied.
    pub fn with_classifier(mut self, classifier: impl NearestNeighbor + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Records into and predicts from a training set owned by another session.
    pub fn with_training_set(mut self, training: SharedTrainingSet) -> Self {
        self.training = Some(training);
        self
    }

    /// Adds an observer. With none registered, events go to the log.
    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    /// * `Config` if the configuration is invalid
    /// * `ProviderUnavailable` if no embedding provider was given or it reports no output
    pub fn build(self) -> Result<Session, SessionError> {
        self.config.validate()?;

        let embedder = self.embedding.ok_or_else(|| {
            SessionError::ProviderUnavailable("No embedding provider configured".into())
        })?;
        if embedder.dimension() == 0 {
            return Err(SessionError::ProviderUnavailable(
                "Embedding provider reports a zero-length output".into(),
            ));
        }

        let training = match self.training {
            Some(shared) => {
                if self.classifier.is_some() {
                    warn!("Custom classifier ignored: session uses a shared training set");
                }
                shared
            }
            None => {
                let classifier = self
                    .classifier
                    .unwrap_or_else(|| Box::new(KnnClassifier::new(self.config.k)));
                TrainingSet::new(ExampleStore::new(self.config.max_examples_per_label), classifier)
                    .into_shared()
            }
        };

        let observers: Vec<Arc<dyn SessionObserver>> = if self.observers.is_empty() {
            vec![Arc::new(LogObserver)]
        } else {
            self.observers
        };

        info!(
            "Session ready (embedding size {}, cap {} per label)",
            embedder.dimension(),
            self.config.max_examples_per_label
        );
        Ok(Session::from_parts(
            self.config,
            self.frame_source,
            embedder,
            training,
            Observers::new(observers),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::PooledEmbedding;
    use crate::frame::SyntheticCamera;

    #[test]
    fn test_build_without_embedding_fails() {
        let result = SessionBuilder::new().with_frame_source(SyntheticCamera::new()).build();
        assert!(matches!(result, Err(SessionError::ProviderUnavailable(_))));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = SessionConfig {
            max_examples_per_label: 0,
            ..SessionConfig::default()
        };
        let result = SessionBuilder::new()
            .with_config(config)
            .with_embedding(PooledEmbedding::default())
            .build();
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_uses_configured_cap() {
        let config = SessionConfig {
            max_examples_per_label: 7,
            ..SessionConfig::default()
        };
        let session = SessionBuilder::new()
            .with_config(config)
            .with_embedding(PooledEmbedding::default())
            .build()
            .unwrap();
        assert_eq!(session.training_set().lock().await.store().cap(), 7);
    }

    #[tokio::test]
    async fn test_sessions_share_training_set() {
        let first = SessionBuilder::new()
            .with_embedding(PooledEmbedding::default())
            .build()
            .unwrap();
        let second = SessionBuilder::new()
            .with_embedding(PooledEmbedding::default())
            .with_training_set(first.training_set())
            .build()
            .unwrap();

        first.add_label("cat").await.unwrap();
        assert_eq!(second.labels().await, vec!["cat".to_string()]);
    }
}
