use std::collections::{BTreeMap, HashMap};

use ndarray::Array1;

use super::utils::{cosine_similarity, normalize_vector};
use super::{ClassifyError, NearestNeighbor, Prediction, MIN_TRAINED_LABELS};

/// k-nearest-neighbour vote over cosine similarity.
///
/// Each of the `k` most similar stored examples casts one vote for its label;
/// a label's confidence is its share of the votes. Labels that received no
/// vote still appear with confidence 0. Ties go to the label holding the
/// single most similar neighbour.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    examples: Vec<(String, Array1<f32>)>,
    counts: HashMap<String, usize>,
}

impl KnnClassifier {
    pub const DEFAULT_K: usize = 3;

    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            examples: Vec::new(),
            counts: HashMap::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    fn dimension(&self) -> Option<usize> {
        self.examples.first().map(|(_, v)| v.len())
    }
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_K)
    }
}

impl NearestNeighbor for KnnClassifier {
    fn add_example(&mut self, label: &str, vector: &Array1<f32>) {
        *self.counts.entry(label.to_string()).or_insert(0) += 1;
        self.examples.push((label.to_string(), normalize_vector(vector)));
    }

    fn clear(&mut self) {
        self.examples.clear();
        self.counts.clear();
    }

    fn num_classes(&self) -> usize {
        self.counts.values().filter(|&&count| count > 0).count()
    }

    fn classify(&self, vector: &Array1<f32>) -> Result<Prediction, ClassifyError> {
        let trained = self.num_classes();
        if trained < MIN_TRAINED_LABELS {
            return Err(ClassifyError::NotTrained { trained });
        }
        if let Some(expected) = self.dimension() {
            if expected != vector.len() {
                return Err(ClassifyError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let query = normalize_vector(vector);
        let mut neighbours: Vec<(f32, &str)> = self
            .examples
            .iter()
            .map(|(label, example)| (cosine_similarity(&query, example), label.as_str()))
            .collect();
        neighbours.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let k = self.k.min(neighbours.len());
        let mut tally: BTreeMap<&str, (usize, f32)> = self
            .counts
            .keys()
            .map(|label| (label.as_str(), (0, f32::NEG_INFINITY)))
            .collect();
        for &(similarity, label) in neighbours.iter().take(k) {
            let entry = tally.entry(label).or_insert((0, f32::NEG_INFINITY));
            entry.0 += 1;
            entry.1 = entry.1.max(similarity);
        }

        let best = tally
            .iter()
            .max_by(|a, b| {
                a.1 .0
                    .cmp(&b.1 .0)
                    .then(a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
            })
            .map(|(label, _)| label.to_string())
            .unwrap_or_default();

        let confidences = tally
            .into_iter()
            .map(|(label, (votes, _))| (label.to_string(), votes as f32 / k as f32))
            .collect();

        Ok(Prediction {
            label: best,
            confidences,
        })
    }
}
