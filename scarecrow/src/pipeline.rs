//! Per-frame orchestration of the whole control system.
//!
//! One sequential loop: pull a frame, detect, track, actuate, publish, then
//! yield to the thermal governor. Background work (thermal sampling, patrol
//! glides, clip timers) belongs to the components; the loop itself never
//! spawns anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::actuation::ActuationController;
use crate::camera::{Camera, CameraError};
use crate::config::TurretConfig;
use crate::detect::{partition_detections, Detector};
use crate::overlay;
use crate::store::FrameStore;
use crate::thermal::{ThermalGovernor, ThermalSnapshot};
use crate::tracker::{FireControlState, TargetTracker};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The camera died mid-stream. Shutdown has already run.
    #[error("camera stream failed: {0}")]
    Camera(#[from] CameraError),
}

/// Point-in-time view of the loop for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: FireControlState,
    pub pan: f64,
    pub tilt: f64,
    pub dx: f64,
    pub dy: f64,
    pub firing_events: usize,
    pub frames_processed: u64,
    pub thermal: ThermalSnapshot,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: FireControlState::Idle,
            pan: 0.0,
            tilt: 0.0,
            dx: 0.0,
            dy: 0.0,
            firing_events: 0,
            frames_processed: 0,
            thermal: ThermalSnapshot::default(),
        }
    }
}

/// Shared, lock-guarded snapshot refreshed once per frame.
pub type StatusBoard = Arc<Mutex<StatusSnapshot>>;

/// Owns every component for the lifetime of the control loop.
pub struct ControlPipeline {
    camera: Box<dyn Camera>,
    detector: Box<dyn Detector>,
    tracker: TargetTracker,
    controller: ActuationController,
    governor: ThermalGovernor,
    store: Arc<FrameStore>,
    config: TurretConfig,
    stop: Arc<AtomicBool>,
    board: StatusBoard,
    frames: u64,
}

impl ControlPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TurretConfig,
        camera: Box<dyn Camera>,
        detector: Box<dyn Detector>,
        controller: ActuationController,
        governor: ThermalGovernor,
        store: Arc<FrameStore>,
        stop: Arc<AtomicBool>,
        board: StatusBoard,
    ) -> Self {
        let tracker = TargetTracker::new(config.tracker.clone());
        Self {
            camera,
            detector,
            tracker,
            controller,
            governor,
            store,
            config,
            stop,
            board,
            frames: 0,
        }
    }

    /// Run until the camera ends, the stop flag is raised, or the stream
    /// errors. The shutdown sequence runs exactly once on every exit path.
    pub fn run(mut self) -> Result<(), PipelineError> {
        info!("control loop starting");
        let result = loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("stop requested");
                break Ok(());
            }
            match self.camera.next_frame() {
                Ok(Some(frame)) => self.process(frame),
                Ok(None) => {
                    info!("camera stream ended");
                    break Ok(());
                }
                Err(err) => {
                    error!(%err, "camera stream failed");
                    break Err(PipelineError::Camera(err));
                }
            }
            self.governor.throttle();
        };
        self.shutdown();
        result
    }

    fn process(&mut self, frame: image::RgbImage) {
        let now = Instant::now();
        let (width, height) = frame.dimensions();

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                warn!(%err, "detector failed, frame skipped");
                return;
            }
        };
        let mut annotated = detections.annotated;
        let partition = partition_detections(&self.config.classes, detections.items);

        let report = self.tracker.process_frame(
            &partition.targets,
            partition.aversion_present,
            width,
            height,
            now,
        );
        match &report.command {
            Some(command) => self.controller.track(command, now),
            None => self.controller.patrol(now),
        }
        if report.fire_rising {
            self.store.save();
        }

        self.frames += 1;
        let snapshot = self.snapshot();
        overlay::draw_hud(&mut annotated, &hud_line(&snapshot));
        self.store.update(annotated);

        if let Ok(mut board) = self.board.lock() {
            *board = snapshot;
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        let (pan, tilt) = self.controller.angles();
        let (dx, dy) = self.tracker.last_offsets();
        StatusSnapshot {
            state: self.tracker.state(),
            pan,
            tilt,
            dx,
            dy,
            firing_events: self.tracker.firing_events().len(),
            frames_processed: self.frames,
            thermal: self.governor.snapshot(),
        }
    }

    fn shutdown(&mut self) {
        info!(frames = self.frames, "shutting down");
        self.store.stop();
        self.controller.cleanup();
        self.camera.release();
        self.governor.stop();
    }
}

fn hud_line(snapshot: &StatusSnapshot) -> String {
    format!(
        "{:?} PAN {:.1} TILT {:.1} DX {:.2} DY {:.2}",
        snapshot.state, snapshot.pan, snapshot.tilt, snapshot.dx, snapshot.dy
    )
}
