//! Latest-frame publication and fire-event clip retention.
//!
//! Two independent jobs share this type because they share the frame flow:
//! a single-slot broadcast of the newest annotated frame (Mutex + Condvar,
//! any number of stream consumers), and a trailing ring of recent frames
//! exported as a short clip when a firing event triggers. The slot lock and
//! the clip lock are never held together, so frame publication is never
//! serialized behind trimming or export work.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::task::StoppableTask;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("clip I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("clip encode: {0}")]
    Encode(String),
}

/// One published frame with its store-relative timestamp (seconds).
#[derive(Clone)]
pub struct FrameRecord {
    pub frame: Arc<RgbImage>,
    pub timestamp: f64,
}

/// Container writer for exported clips. Implementations pick the format;
/// the store picks the file name and frame rate.
pub trait ClipSink: Send + Sync {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn write_clip(&self, frames: &[FrameRecord], fps: f64, path: &Path)
        -> Result<(), ClipError>;
}

struct Slot {
    latest: Option<FrameRecord>,
    running: bool,
}

struct ClipRing {
    frames: VecDeque<FrameRecord>,
    save_pending: bool,
}

/// Thread-safe latest-frame slot plus the fire-event clip ring.
pub struct FrameStore {
    slot: Mutex<Slot>,
    available: Condvar,
    clip: Mutex<ClipRing>,
    save_task: Mutex<Option<StoppableTask>>,
    sink: Box<dyn ClipSink>,
    config: StoreConfig,
    origin: Instant,
}

impl FrameStore {
    pub fn new(config: StoreConfig, sink: Box<dyn ClipSink>) -> Self {
        Self {
            slot: Mutex::new(Slot {
                latest: None,
                running: true,
            }),
            available: Condvar::new(),
            clip: Mutex::new(ClipRing {
                frames: VecDeque::new(),
                save_pending: false,
            }),
            save_task: Mutex::new(None),
            sink,
            config,
            origin: Instant::now(),
        }
    }

    /// Publish a frame: stamp it, wake every waiting consumer, and feed the
    /// clip ring. Ignored after `stop`.
    pub fn update(&self, frame: RgbImage) {
        let record = FrameRecord {
            frame: Arc::new(frame),
            timestamp: self.now_secs(),
        };
        {
            let Ok(mut slot) = self.slot.lock() else {
                return;
            };
            if !slot.running {
                return;
            }
            slot.latest = Some(record.clone());
        }
        self.available.notify_all();

        if let Ok(mut ring) = self.clip.lock() {
            let cutoff = record.timestamp - self.config.snapshot_window_secs / 2.0;
            ring.frames.push_back(record);
            // A pending save owns the pre-trigger half of the window;
            // trimming resumes after export.
            if !ring.save_pending {
                while ring
                    .frames
                    .front()
                    .is_some_and(|record| record.timestamp < cutoff)
                {
                    ring.frames.pop_front();
                }
            }
        }
    }

    /// Block until a frame newer than `last_seen` exists, then return it.
    ///
    /// Returns `None` once the store has stopped and nothing newer remains;
    /// a final newer frame published before the stop is still delivered.
    /// Timestamps returned to any one caller are strictly increasing.
    pub fn get_latest(&self, last_seen: f64) -> Option<FrameRecord> {
        let mut slot = self.slot.lock().ok()?;
        loop {
            match &slot.latest {
                Some(record) if record.timestamp > last_seen => return Some(record.clone()),
                _ if !slot.running => return None,
                _ => slot = self.available.wait(slot).ok()?,
            }
        }
    }

    /// Schedule a clip export at `now + snapshot_window/2` so the clip
    /// straddles the trigger. Re-triggering before the deadline re-arms the
    /// timer; rapid events coalesce into one clip.
    pub fn save(self: &Arc<Self>) {
        self.cancel_save_task();
        if let Ok(mut ring) = self.clip.lock() {
            ring.save_pending = true;
        }

        let deadline = Instant::now() + self.config.snapshot_window() / 2;
        let poll = self.config.save_poll();
        let store = Arc::clone(self);
        let task = StoppableTask::spawn(move |flag| {
            while !flag.is_raised() {
                if Instant::now() >= deadline {
                    store.export_clip();
                    return;
                }
                std::thread::sleep(poll);
            }
        });
        if let Ok(mut save_task) = self.save_task.lock() {
            *save_task = Some(task);
        }
    }

    /// Stop the store: wake all waiters, cancel a pending save. Permanent.
    pub fn stop(&self) {
        self.cancel_save_task();
        if let Ok(mut slot) = self.slot.lock() {
            slot.running = false;
        }
        self.available.notify_all();
        info!("frame store stopped");
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().map(|slot| slot.running).unwrap_or(false)
    }

    /// Seconds since store creation; the timestamp domain of all records.
    pub fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn cancel_save_task(&self) {
        let task = self
            .save_task
            .lock()
            .ok()
            .and_then(|mut save_task| save_task.take());
        if let Some(task) = task {
            task.cancel_and_join();
        }
    }

    fn export_clip(&self) {
        let frames: Vec<FrameRecord> = {
            let Ok(mut ring) = self.clip.lock() else {
                return;
            };
            ring.save_pending = false;
            ring.frames.iter().cloned().collect()
        };

        if frames.len() < 2 {
            warn!(frames = frames.len(), "clip skipped, not enough frames");
            return;
        }
        let span = frames[frames.len() - 1].timestamp - frames[0].timestamp;
        if span <= 0.0 {
            warn!(span, "clip skipped, degenerate timestamp span");
            return;
        }
        let fps = frames.len() as f64 / span;

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name = format!("fire_event_{stamp}.{}", self.sink.extension());
        let path = self.config.clip_dir.join(&name);
        if let Err(err) = std::fs::create_dir_all(&self.config.clip_dir) {
            warn!(%err, "clip directory not writable");
            return;
        }
        match self.sink.write_clip(&frames, fps, &path) {
            Ok(()) => info!(%name, frames = frames.len(), fps, "clip exported"),
            Err(err) => warn!(%err, %name, "clip export failed"),
        }
    }

    /// Directory clips are exported into.
    pub fn clip_dir(&self) -> &PathBuf {
        &self.config.clip_dir
    }
}
