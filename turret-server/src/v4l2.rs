//! V4L2 webcam capture (Linux, `v4l2-camera` feature).
//!
//! Requests MJPG from the device and decodes each buffer to RGB before
//! handing it to the control loop. Most USB webcams deliver MJPG at full
//! frame rate where raw YUYV cannot.

use image::{ImageFormat, RgbImage};
use scarecrow::{Camera, CameraError};
use tracing::info;
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

pub struct V4l2Camera {
    device: Device,
    stream: Option<MmapStream<'static>>,
}

impl V4l2Camera {
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        let device = Device::with_path(path)
            .map_err(|e| CameraError::Capture(format!("open {path}: {e}")))?;

        let mut format = device
            .format()
            .map_err(|e| CameraError::Capture(format!("query format: {e}")))?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"MJPG");
        let applied = device
            .set_format(&format)
            .map_err(|e| CameraError::Capture(format!("set format: {e}")))?;
        if &applied.fourcc.repr != b"MJPG" {
            return Err(CameraError::Capture(format!(
                "device refused MJPG, offered {}",
                applied.fourcc
            )));
        }
        info!(path, width = applied.width, height = applied.height, "camera opened");

        Ok(Self {
            device,
            stream: None,
        })
    }
}

impl Camera for V4l2Camera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        if self.stream.is_none() {
            let stream = MmapStream::new(&self.device, Type::VideoCapture)
                .map_err(|e| CameraError::Capture(format!("start stream: {e}")))?;
            self.stream = Some(stream);
        }
        let stream = self.stream.as_mut().unwrap();

        let (buf, _meta) = stream
            .next()
            .map_err(|e| CameraError::Capture(format!("dequeue: {e}")))?;
        let decoded = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
            .map_err(|e| CameraError::Capture(format!("decode MJPG: {e}")))?;
        Ok(Some(decoded.to_rgb8()))
    }

    fn release(&mut self) {
        self.stream.take();
        info!("camera released");
    }
}
