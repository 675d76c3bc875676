use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use log::{info, warn};

use super::{Facing, Frame, FrameError, FrameSource, Normalization, Resolution};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Replays the images of a directory as a camera feed, looping forever.
///
/// If the directory has `user/` or `environment/` subdirectories, the one
/// matching the requested facing is used; otherwise the root is used for both.
#[derive(Debug)]
pub struct ImageFolderCamera {
    root: PathBuf,
    files: Vec<PathBuf>,
    resolution: Resolution,
    facing: Option<Facing>,
    cursor: usize,
}

impl ImageFolderCamera {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
            resolution: Resolution::default(),
            facing: None,
            cursor: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, FrameError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| FrameError::Device(format!("Cannot read {}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ImageFolderCamera {
    fn open(&mut self, facing: Facing, resolution: Resolution) -> Result<(), FrameError> {
        self.close();

        let facing_dir = self.root.join(facing.as_str());
        let dir = if facing_dir.is_dir() { facing_dir } else { self.root.clone() };
        let files = Self::list_images(&dir)?;
        if files.is_empty() {
            return Err(FrameError::Device(format!("No images found in {}", dir.display())));
        }

        info!("Image folder camera opened at {:?} ({} images)", dir, files.len());
        self.files = files;
        self.resolution = resolution;
        self.facing = Some(facing);
        self.cursor = 0;
        Ok(())
    }

    fn capture(&mut self, normalization: Normalization) -> Result<Frame, FrameError> {
        if self.facing.is_none() || self.files.is_empty() {
            return Err(FrameError::Closed);
        }

        let path = &self.files[self.cursor % self.files.len()];
        self.cursor = self.cursor.wrapping_add(1);

        let image = image::open(path).map_err(|e| {
            warn!("Failed to decode {:?}: {}", path, e);
            FrameError::Capture(format!("Failed to decode {}: {}", path.display(), e))
        })?;
        let Resolution { width, height } = self.resolution;
        let rgb = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();
        Frame::from_rgb8(width, height, rgb.as_raw(), normalization)
    }

    fn close(&mut self) {
        if self.facing.take().is_some() {
            self.files.clear();
            info!("Image folder camera closed");
        }
    }

    fn is_open(&self) -> bool {
        self.facing.is_some()
    }

    fn facing(&self) -> Option<Facing> {
        self.facing
    }
}
