use std::collections::BTreeMap;

use ndarray::Array1;
use serde::Serialize;

mod knn;
mod training_set;
pub(crate) mod utils;

pub use knn::KnnClassifier;
pub use training_set::{SharedTrainingSet, TrainingSet};

/// Minimum number of labels with at least one example before anything can be classified.
pub const MIN_TRAINED_LABELS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier is not trained: {trained} label(s) have examples, at least 2 required")]
    NotTrained { trained: usize },
    #[error("Vector has {actual} dimensions, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result of classifying one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Label with the highest confidence.
    pub label: String,
    /// Confidence for every trained label, each in `[0, 1]`, summing to 1.
    pub confidences: BTreeMap<String, f32>,
}

impl Prediction {
    pub fn confidence(&self, label: &str) -> Option<f32> {
        self.confidences.get(label).copied()
    }

    /// Labels sorted by descending confidence.
    pub fn ranked(&self) -> Vec<(&str, f32)> {
        let mut ranked: Vec<(&str, f32)> = self
            .confidences
            .iter()
            .map(|(label, &confidence)| (label.as_str(), confidence))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// Similarity-vote classifier over labelled feature vectors.
///
/// Implementations are derived state: the owner replays examples into them
/// and clears them wholesale, they are never un-trained incrementally.
pub trait NearestNeighbor: Send {
    fn add_example(&mut self, label: &str, vector: &Array1<f32>);

    fn clear(&mut self);

    /// Number of distinct labels holding at least one example.
    fn num_classes(&self) -> usize;

    fn classify(&self, vector: &Array1<f32>) -> Result<Prediction, ClassifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_orders_by_confidence() {
        let prediction = Prediction {
            label: "dog".into(),
            confidences: BTreeMap::from([
                ("cat".to_string(), 0.25),
                ("dog".to_string(), 0.75),
            ]),
        };
        assert_eq!(prediction.ranked(), vec![("dog", 0.75), ("cat", 0.25)]);
        assert_eq!(prediction.confidence("cat"), Some(0.25));
        assert_eq!(prediction.confidence("bird"), None);
    }
}
