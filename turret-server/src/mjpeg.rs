//! MJPEG streaming over `multipart/x-mixed-replace`.
//!
//! A bridge thread drains the engine's frame store, JPEG-encodes each frame
//! once, and broadcasts the bytes to every connected client. Slow clients
//! miss frames rather than lagging the control loop; the browser just shows
//! the next one that arrives.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use image::RgbImage;
use scarecrow::FrameStore;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Boundary marker; unique enough to never appear in JPEG data.
const MJPEG_BOUNDARY: &str = "turret_frame_9a4e71c0";

/// Fan-out point between the store bridge and HTTP subscribers.
pub struct MjpegBroadcaster {
    tx: broadcast::Sender<Bytes>,
}

impl MjpegBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish encoded JPEG bytes; returns the active subscriber count.
    pub fn publish(&self, jpeg: Bytes) -> usize {
        self.tx.send(jpeg).unwrap_or(0)
    }

    pub fn subscribe(&self) -> MjpegSubscriber {
        MjpegSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MjpegBroadcaster {
    fn default() -> Self {
        Self::new(4)
    }
}

pub struct MjpegSubscriber {
    rx: broadcast::Receiver<Bytes>,
}

impl MjpegSubscriber {
    /// Stream frames to one client as a multipart response.
    pub fn into_response(self) -> Response {
        let stream = BroadcastStream::new(self.rx).filter_map(|result| match result {
            Ok(jpeg) => {
                let head = format!(
                    "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                    jpeg.len()
                );
                let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
                part.extend_from_slice(head.as_bytes());
                part.extend_from_slice(&jpeg);
                part.extend_from_slice(b"\r\n");
                Some(Ok::<_, std::convert::Infallible>(Bytes::from(part)))
            }
            // Lagged or closed: drop this frame and keep streaming.
            Err(_) => None,
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
            )
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| {
                Response::new(Body::from("stream unavailable"))
            })
    }
}

/// Encode an RGB frame as JPEG at the given quality.
pub fn encode_rgb_jpeg(frame: &RgbImage, quality: u8) -> Option<Bytes> {
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder.encode_image(frame).ok()?;
    Some(Bytes::from(jpeg))
}

/// Drain the frame store and feed the broadcaster until the store stops.
///
/// Runs on its own thread: `get_latest` blocks between frames, so the
/// bridge consumes nothing while the feed is idle.
pub fn run_store_bridge(store: Arc<FrameStore>, broadcaster: Arc<MjpegBroadcaster>, quality: u8) {
    let mut last_seen = 0.0;
    while let Some(record) = store.get_latest(last_seen) {
        last_seen = record.timestamp;
        if broadcaster.subscriber_count() == 0 {
            continue;
        }
        match encode_rgb_jpeg(&record.frame, quality) {
            Some(jpeg) => {
                broadcaster.publish(jpeg);
            }
            None => warn!("frame JPEG encode failed"),
        }
    }
    info!("stream bridge stopped");
}
