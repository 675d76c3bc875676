use ndarray::{s, Array1};

use super::{EmbeddingError, EmbeddingProvider};
use crate::classifier::utils::normalize_vector;
use crate::frame::Frame;

/// Colour-layout embedding: the mean of each channel over a `grid x grid`
/// partition of the frame, L2-normalised.
///
/// Cheap and deterministic. Used when no ONNX network is configured.
#[derive(Debug, Clone)]
pub struct PooledEmbedding {
    grid: usize,
}

impl PooledEmbedding {
    pub fn new(grid: usize) -> Result<Self, EmbeddingError> {
        if grid == 0 {
            return Err(EmbeddingError::Unavailable("Pooling grid must be at least 1x1".into()));
        }
        Ok(Self { grid })
    }

    fn cell_bounds(&self, index: usize, extent: usize) -> (usize, usize) {
        let start = index * extent / self.grid;
        let end = ((index + 1) * extent / self.grid).max(start + 1).min(extent);
        (start, end)
    }
}

impl Default for PooledEmbedding {
    fn default() -> Self {
        Self { grid: 4 }
    }
}

impl EmbeddingProvider for PooledEmbedding {
    fn dimension(&self) -> usize {
        self.grid * self.grid * 3
    }

    fn embed(&self, frame: &Frame) -> Result<Array1<f32>, EmbeddingError> {
        let tensor = frame.tensor();
        let shape = tensor.shape();
        if shape[3] != 3 {
            return Err(EmbeddingError::Shape(format!("Expected 3 channels, got {}", shape[3])));
        }
        let (height, width) = (shape[1], shape[2]);
        if height < self.grid || width < self.grid {
            return Err(EmbeddingError::Shape(format!(
                "Frame {}x{} is smaller than the {}x{} pooling grid",
                width, height, self.grid, self.grid
            )));
        }

        let mut features = Vec::with_capacity(self.dimension());
        for gy in 0..self.grid {
            let (y0, y1) = self.cell_bounds(gy, height);
            for gx in 0..self.grid {
                let (x0, x1) = self.cell_bounds(gx, width);
                let cell = tensor.slice(s![0, y0..y1, x0..x1, ..]);
                let pixels = ((y1 - y0) * (x1 - x0)) as f32;
                for c in 0..3 {
                    features.push(cell.slice(s![.., .., c]).sum() / pixels);
                }
            }
        }

        Ok(normalize_vector(&Array1::from(features)))
    }
}
