//! JSON serialisation of an [`ExampleStore`].
//!
//! The document maps each label to its list of feature vectors, which is
//! everything needed to rebuild a classifier:
//!
//! ```json
//! { "version": 1, "dimension": 3, "cap": 100,
//!   "classes": { "cat": [[0.1, 0.2, 0.3]], "dog": [[0.3, 0.2, 0.1]] } }
//! ```

use std::collections::BTreeMap;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::classifier::MIN_TRAINED_LABELS;
use crate::store::{ExampleStore, StoreError};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Export needs at least 2 trained labels, found {trained}")]
    InsufficientTraining { trained: usize },
    #[error("Malformed model document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported model format version {0}")]
    UnsupportedVersion(u32),
    #[error("Invalid model contents: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelExport {
    pub version: u32,
    pub dimension: usize,
    pub cap: usize,
    pub classes: BTreeMap<String, Vec<Vec<f32>>>,
}

impl ModelExport {
    pub fn from_store(store: &ExampleStore) -> Result<Self, ExportError> {
        let trained = store.trained_labels().len();
        if trained < MIN_TRAINED_LABELS {
            return Err(ExportError::InsufficientTraining { trained });
        }

        let classes = store
            .labels()
            .iter()
            .map(|label| {
                let vectors = store
                    .examples_for(label)
                    .unwrap_or_default()
                    .iter()
                    .map(|example| example.vector().to_vec())
                    .collect();
                (label.clone(), vectors)
            })
            .collect();

        Ok(Self {
            version: FORMAT_VERSION,
            dimension: store.dimension().unwrap_or(0),
            cap: store.cap(),
            classes,
        })
    }

    /// Rebuilds a store. Labels come back in alphabetical order.
    pub fn into_store(self) -> Result<ExampleStore, ExportError> {
        if self.version != FORMAT_VERSION {
            return Err(ExportError::UnsupportedVersion(self.version));
        }
        let cap = self
            .classes
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(self.cap);

        let mut store = ExampleStore::new(cap);
        for (label, vectors) in self.classes {
            store.add_label(&label)?;
            for vector in vectors {
                if vector.len() != self.dimension {
                    return Err(StoreError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    }
                    .into());
                }
                store.add_example(&label, Array1::from(vector))?;
            }
        }
        Ok(store)
    }
}

/// Serialises the store to JSON bytes.
pub fn export_model(store: &ExampleStore) -> Result<Vec<u8>, ExportError> {
    let document = ModelExport::from_store(store)?;
    Ok(serde_json::to_vec(&document)?)
}

pub fn import_model(bytes: &[u8]) -> Result<ExampleStore, ExportError> {
    let document: ModelExport = serde_json::from_slice(bytes)?;
    document.into_store()
}
