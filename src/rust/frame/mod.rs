//! Camera frame capture.
//!
//! A [`FrameSource`] wraps one camera device. Frames come out already
//! normalised into an NHWC tensor of shape `[1, height, width, 3]`, which is
//! what the embedding providers consume.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

mod image_folder;
mod synthetic;

pub use image_folder::ImageFolderCamera;
pub use synthetic::{SyntheticCamera, SyntheticControl};

/// Which way the camera faces. `User` is the front camera, `Environment` the back one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    User,
    Environment,
}

impl Facing {
    pub fn flipped(self) -> Self {
        match self {
            Facing::User => Facing::Environment,
            Facing::Environment => Facing::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Facing::User => "user",
            Facing::Environment => "environment",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferred capture size. Devices may deliver something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Maps a pixel `p` in `[0, 255]` to `p / scale + offset`.
///
/// The default (`scale = 127`, `offset = -1`) centres intensities around zero
/// in roughly `[-1, 1]`, the range MobileNet-style feature extractors expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub scale: f32,
    pub offset: f32,
}

impl Normalization {
    /// Plain `[0, 1]` scaling.
    pub fn unit() -> Self {
        Self {
            scale: 255.0,
            offset: 0.0,
        }
    }

    #[inline]
    pub fn apply(&self, pixel: u8) -> f32 {
        pixel as f32 / self.scale + self.offset
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            scale: 127.0,
            offset: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// No camera granted access, or the device went away.
    #[error("Camera device error: {0}")]
    Device(String),
    /// A single frame could not be read. Transient.
    #[error("Frame capture error: {0}")]
    Capture(String),
    #[error("Camera is not open")]
    Closed,
}

/// Counts frames that have been captured but not yet dropped.
#[derive(Debug, Clone, Default)]
pub struct LiveFrames(Arc<AtomicUsize>);

impl LiveFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// One captured, normalised frame. The buffer is released when the frame drops.
#[derive(Debug)]
pub struct Frame {
    tensor: Array4<f32>,
    live: Option<LiveFrames>,
}

impl Frame {
    pub fn new(tensor: Array4<f32>) -> Self {
        Self { tensor, live: None }
    }

    /// Builds a frame from packed RGB8 pixels.
    pub fn from_rgb8(
        width: u32,
        height: u32,
        pixels: &[u8],
        normalization: Normalization,
    ) -> Result<Self, FrameError> {
        let (w, h) = (width as usize, height as usize);
        if pixels.len() != w * h * 3 {
            return Err(FrameError::Capture(format!(
                "Expected {} bytes for a {}x{} RGB frame, got {}",
                w * h * 3,
                width,
                height,
                pixels.len()
            )));
        }
        let values = pixels.iter().map(|&p| normalization.apply(p)).collect();
        let tensor = Array4::from_shape_vec((1, h, w, 3), values)
            .map_err(|e| FrameError::Capture(format!("Failed to shape frame tensor: {}", e)))?;
        Ok(Self::new(tensor))
    }

    /// Registers the frame with a live-frame counter until it is dropped.
    pub fn tracked(mut self, live: &LiveFrames) -> Self {
        if self.live.is_none() {
            live.0.fetch_add(1, Ordering::SeqCst);
            self.live = Some(live.clone());
        }
        self
    }

    /// Mirrors the frame left to right, as a selfie preview shows it.
    pub fn mirror_horizontally(&mut self) {
        self.tensor.invert_axis(Axis(2));
        self.tensor = self.tensor.as_standard_layout().into_owned();
    }

    pub fn tensor(&self) -> &Array4<f32> {
        &self.tensor
    }

    pub fn width(&self) -> usize {
        self.tensor.shape()[2]
    }

    pub fn height(&self) -> usize {
        self.tensor.shape()[1]
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.0.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A camera device.
///
/// Each instance has a single writer: the session that owns it. Opening an
/// already open source must fully close the previous device first.
pub trait FrameSource: Send {
    fn open(&mut self, facing: Facing, resolution: Resolution) -> Result<(), FrameError>;

    fn capture(&mut self, normalization: Normalization) -> Result<Frame, FrameError>;

    /// Releases the device. Safe to call on a closed source.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn facing(&self) -> Option<Facing>;
}
