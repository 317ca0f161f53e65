//! Camera boundary.
//!
//! Raw capture is external; the pipeline only needs a pull-based frame
//! source. `Ok(None)` is the clean end of stream; errors are treated as
//! unrecoverable stream termination by the caller.

use std::collections::VecDeque;

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("capture failed: {0}")]
    Capture(String),
}

pub trait Camera: Send {
    /// Pull the next frame, or `Ok(None)` once the stream ends.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CameraError>;

    /// Release the capture device. Called once during shutdown.
    fn release(&mut self);
}

/// Replays a fixed list of frames, then ends the stream.
#[derive(Debug, Default)]
pub struct SequenceCamera {
    frames: VecDeque<RgbImage>,
    released: bool,
}

impl SequenceCamera {
    pub fn new(frames: impl IntoIterator<Item = RgbImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Camera for SequenceCamera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        Ok(self.frames.pop_front())
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_sequence_camera_drains_then_ends() {
        let frame = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let mut camera = SequenceCamera::new([frame.clone(), frame]);

        assert!(camera.next_frame().unwrap().is_some());
        assert!(camera.next_frame().unwrap().is_some());
        assert!(camera.next_frame().unwrap().is_none());

        camera.release();
        assert!(camera.is_released());
    }
}
