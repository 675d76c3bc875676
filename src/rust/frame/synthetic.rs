use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use super::{Facing, Frame, FrameError, FrameSource, LiveFrames, Normalization, Resolution};

#[derive(Debug)]
struct ControlState {
    scene: [u8; 3],
    fail_next: usize,
    deny_access: bool,
    revoked: bool,
    opened: Vec<Facing>,
    closes: usize,
}

/// Remote control for a [`SyntheticCamera`], usable while the camera is owned by a session.
#[derive(Debug, Clone)]
pub struct SyntheticControl {
    state: Arc<Mutex<ControlState>>,
    live: LiveFrames,
}

impl SyntheticControl {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the colour the camera is "looking at".
    pub fn set_scene(&self, rgb: [u8; 3]) {
        self.lock().scene = rgb;
    }

    /// The next `count` captures fail with a transient capture error.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Subsequent `open` calls fail as if permission was refused.
    pub fn deny_access(&self, deny: bool) {
        self.lock().deny_access = deny;
    }

    /// Simulates the device being unplugged or its permission revoked.
    pub fn revoke(&self) {
        self.lock().revoked = true;
    }

    /// Facings passed to every successful `open`, in order.
    pub fn open_history(&self) -> Vec<Facing> {
        self.lock().opened.clone()
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Frames captured from this camera that have not been dropped yet.
    pub fn live_frames(&self) -> usize {
        self.live.count()
    }
}

/// In-process camera that renders a solid scene colour with a faint
/// per-frame texture. Drives the demo binary and the test-suite.
#[derive(Debug)]
pub struct SyntheticCamera {
    control: SyntheticControl,
    open: Option<(Facing, Resolution)>,
    frame_counter: u64,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        let state = ControlState {
            scene: [128, 128, 128],
            fail_next: 0,
            deny_access: false,
            revoked: false,
            opened: Vec::new(),
            closes: 0,
        };
        Self {
            control: SyntheticControl {
                state: Arc::new(Mutex::new(state)),
                live: LiveFrames::new(),
            },
            open: None,
            frame_counter: 0,
        }
    }

    pub fn control(&self) -> SyntheticControl {
        self.control.clone()
    }

    fn render(&self, scene: [u8; 3], resolution: Resolution) -> Vec<u8> {
        let (w, h) = (resolution.width as usize, resolution.height as usize);
        let mut pixels = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let grain = ((x + y + self.frame_counter as usize) % 8) as u8;
                for channel in scene {
                    pixels.push(channel.saturating_add(grain));
                }
            }
        }
        pixels
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for SyntheticCamera {
    fn open(&mut self, facing: Facing, resolution: Resolution) -> Result<(), FrameError> {
        self.close();
        let mut state = self.control.lock();
        if state.deny_access {
            return Err(FrameError::Device("Permission to use the camera was denied".into()));
        }
        state.revoked = false;
        state.opened.push(facing);
        drop(state);

        info!(
            "Synthetic camera opened ({} facing, {}x{})",
            facing, resolution.width, resolution.height
        );
        self.open = Some((facing, resolution));
        Ok(())
    }

    fn capture(&mut self, normalization: Normalization) -> Result<Frame, FrameError> {
        let (_, resolution) = self.open.ok_or(FrameError::Closed)?;

        let scene = {
            let mut state = self.control.lock();
            if state.revoked {
                return Err(FrameError::Closed);
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(FrameError::Capture("No frame available".into()));
            }
            state.scene
        };

        self.frame_counter = self.frame_counter.wrapping_add(1);
        let pixels = self.render(scene, resolution);
        let frame = Frame::from_rgb8(resolution.width, resolution.height, &pixels, normalization)?;
        debug!("Synthetic frame {} captured", self.frame_counter);
        Ok(frame.tracked(&self.control.live))
    }

    fn close(&mut self) {
        if self.open.take().is_some() {
            self.control.lock().closes += 1;
            info!("Synthetic camera closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.is_some() && !self.control.lock().revoked
    }

    fn facing(&self) -> Option<Facing> {
        self.open.map(|(facing, _)| facing)
    }
}
