//! Labelled feature vectors with a per-label capacity bound.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array1;

/// Default per-label cap.
pub const DEFAULT_MAX_EXAMPLES_PER_LABEL: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Label cannot be empty")]
    InvalidLabel,
    #[error("Label '{0}' already exists")]
    DuplicateLabel(String),
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),
    #[error("Label '{label}' already holds the maximum of {cap} examples")]
    CapacityExceeded { label: String, cap: usize },
    #[error("Vector has {actual} dimensions, store holds {expected}-dimensional vectors")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One labelled feature vector. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    label: String,
    vector: Array1<f32>,
}

impl Example {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vector(&self) -> &Array1<f32> {
        &self.vector
    }
}

/// Every label has an entry, possibly empty; examples never outlive their label.
///
/// Labels are trimmed on every entry point, so `" cat"` and `"cat"` name the same label.
#[derive(Debug, Clone)]
pub struct ExampleStore {
    cap: usize,
    order: Vec<String>,
    examples: HashMap<String, Vec<Example>>,
}

impl ExampleStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: Vec::new(),
            examples: HashMap::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Registers a new, initially empty label. Surrounding whitespace is trimmed.
    pub fn add_label(&mut self, label: &str) -> Result<(), StoreError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(StoreError::InvalidLabel);
        }
        if self.examples.contains_key(label) {
            return Err(StoreError::DuplicateLabel(label.to_string()));
        }
        self.order.push(label.to_string());
        self.examples.insert(label.to_string(), Vec::new());
        Ok(())
    }

    /// Deletes a label and all of its examples, returning how many examples were dropped.
    pub fn remove_label(&mut self, label: &str) -> Result<usize, StoreError> {
        let label = label.trim();
        let removed = self
            .examples
            .remove(label)
            .ok_or_else(|| StoreError::UnknownLabel(label.to_string()))?;
        self.order.retain(|l| l != label);
        Ok(removed.len())
    }

    /// Appends an example and returns the label's new count.
    ///
    /// The label is re-validated on every call, so an insert racing a
    /// deletion fails with `UnknownLabel` instead of resurrecting the label.
    pub fn add_example(&mut self, label: &str, vector: Array1<f32>) -> Result<usize, StoreError> {
        let label = label.trim();
        let expected = self.dimension();
        let cap = self.cap;
        let examples = self
            .examples
            .get_mut(label)
            .ok_or_else(|| StoreError::UnknownLabel(label.to_string()))?;

        if examples.len() >= cap {
            return Err(StoreError::CapacityExceeded {
                label: label.to_string(),
                cap,
            });
        }
        if let Some(expected) = expected {
            if expected != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        examples.push(Example {
            label: label.to_string(),
            vector,
        });
        Ok(examples.len())
    }

    /// Drops every example but keeps the labels.
    pub fn clear_examples(&mut self) {
        for examples in self.examples.values_mut() {
            examples.clear();
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.examples.contains_key(label.trim())
    }

    pub fn count(&self, label: &str) -> Option<usize> {
        self.examples.get(label.trim()).map(Vec::len)
    }

    pub fn is_full(&self, label: &str) -> bool {
        self.count(label).map(|n| n >= self.cap).unwrap_or(false)
    }

    /// Labels in creation order.
    pub fn labels(&self) -> &[String] {
        &self.order
    }

    /// Labels holding at least one example, in creation order.
    pub fn trained_labels(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|label| self.count(label).unwrap_or(0) > 0)
            .map(String::as_str)
            .collect()
    }

    /// Per-label example counts, for display only.
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        self.examples
            .iter()
            .map(|(label, examples)| (label.clone(), examples.len()))
            .collect()
    }

    pub fn total_examples(&self) -> usize {
        self.examples.values().map(Vec::len).sum()
    }

    /// Length of the stored vectors, once any example exists.
    pub fn dimension(&self) -> Option<usize> {
        self.examples
            .values()
            .find_map(|examples| examples.first())
            .map(|example| example.vector.len())
    }

    /// All examples of a label, in insertion order.
    pub fn examples_for(&self, label: &str) -> Option<&[Example]> {
        self.examples.get(label.trim()).map(Vec::as_slice)
    }

    /// Every example, grouped by label in creation order.
    pub fn examples(&self) -> impl Iterator<Item = &Example> {
        self.order
            .iter()
            .filter_map(|label| self.examples.get(label))
            .flatten()
    }
}

impl Default for ExampleStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXAMPLES_PER_LABEL)
    }
}
