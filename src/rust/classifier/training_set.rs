use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use ndarray::Array1;
use tokio::sync::Mutex;

use super::{ClassifyError, KnnClassifier, NearestNeighbor, Prediction};
use crate::store::{ExampleStore, StoreError};

/// A training set shared by every session that records into or predicts from it.
pub type SharedTrainingSet = Arc<Mutex<TrainingSet>>;

/// The example store together with the classifier derived from it.
///
/// All mutation goes through here so the classifier never drifts from the
/// store: inserts feed both, and anything that removes examples rebuilds the
/// classifier from what is left.
pub struct TrainingSet {
    store: ExampleStore,
    classifier: Box<dyn NearestNeighbor>,
}

impl TrainingSet {
    pub fn new(store: ExampleStore, classifier: Box<dyn NearestNeighbor>) -> Self {
        let mut set = Self { store, classifier };
        set.rebuild();
        set
    }

    pub fn with_cap(cap: usize) -> Self {
        Self::new(ExampleStore::new(cap), Box::new(KnnClassifier::default()))
    }

    pub fn into_shared(self) -> SharedTrainingSet {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &ExampleStore {
        &self.store
    }

    pub fn add_label(&mut self, label: &str) -> Result<(), StoreError> {
        self.store.add_label(label)
    }

    /// Removes a label and rebuilds the classifier from the remaining examples.
    pub fn remove_label(&mut self, label: &str) -> Result<usize, StoreError> {
        let dropped = self.store.remove_label(label)?;
        info!("Removed label '{}' ({} examples), rebuilding classifier", label, dropped);
        self.rebuild();
        Ok(dropped)
    }

    /// Stores an example and trains the classifier on it. Nothing changes on error.
    pub fn add_example(&mut self, label: &str, vector: Array1<f32>) -> Result<usize, StoreError> {
        let label = label.trim();
        let count = self.store.add_example(label, vector.clone())?;
        self.classifier.add_example(label, &vector);
        Ok(count)
    }

    /// Drops all examples, keeping the labels.
    pub fn reset(&mut self) {
        self.store.clear_examples();
        self.classifier.clear();
    }

    /// Swaps in a new store, e.g. one loaded from an export.
    pub fn replace_store(&mut self, store: ExampleStore) {
        self.store = store;
        self.rebuild();
    }

    pub fn classify(&self, vector: &Array1<f32>) -> Result<Prediction, ClassifyError> {
        self.classifier.classify(vector)
    }

    pub fn trained_label_count(&self) -> usize {
        self.store.trained_labels().len()
    }

    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        self.store.label_counts()
    }

    fn rebuild(&mut self) {
        self.classifier.clear();
        for example in self.store.examples() {
            self.classifier.add_example(example.label(), example.vector());
        }
        debug!(
            "Classifier rebuilt from {} examples across {} labels",
            self.store.total_examples(),
            self.classifier.num_classes()
        );
    }
}

impl Default for TrainingSet {
    fn default() -> Self {
        Self::new(ExampleStore::default(), Box::new(KnnClassifier::default()))
    }
}

impl std::fmt::Debug for TrainingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingSet")
            .field("store", &self.store)
            .field("classes", &self.classifier.num_classes())
            .finish()
    }
}
