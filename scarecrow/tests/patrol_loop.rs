//! Whole-pipeline tests for idle patrol and aversion suppression.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use scarecrow::config::{
    ActuationConfig, ScanPoint, StoreConfig, ThermalConfig, TurretConfig,
};
use scarecrow::{
    ActuationController, Camera, CameraError, ClipError, ClipSink, ControlPipeline, Detection,
    Detections, Detector, DetectError, FrameRecord, FrameStore, SequenceCamera, StatusSnapshot,
    ThermalGovernor,
};
use scarecrow::BoundingBox;
use hardware::{ActuatorCommand, ScriptedProbe, SimActuator};

struct PacedCamera {
    inner: SequenceCamera,
    delay: Duration,
}

impl Camera for PacedCamera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        std::thread::sleep(self.delay);
        self.inner.next_frame()
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

struct ScriptedDetector {
    script: std::collections::VecDeque<Vec<Detection>>,
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detections, DetectError> {
        Ok(Detections {
            annotated: frame.clone(),
            items: self.script.pop_front().unwrap_or_default(),
        })
    }
}

struct NullSink;

impl ClipSink for NullSink {
    fn extension(&self) -> &'static str {
        "avi"
    }

    fn write_clip(
        &self,
        _frames: &[FrameRecord],
        _fps: f64,
        _path: &Path,
    ) -> Result<(), ClipError> {
        Ok(())
    }
}

fn patrol_config(clip_dir: &Path) -> TurretConfig {
    TurretConfig {
        actuation: ActuationConfig {
            tracking_pause_secs: 0.0,
            scan_interval_secs: 0.04,
            sweep_steps: 4,
            jitter_deg: 1.0,
            scan_points: vec![
                ScanPoint {
                    pan: 40.0,
                    tilt: 95.0,
                },
                ScanPoint {
                    pan: 140.0,
                    tilt: 95.0,
                },
            ],
            ..ActuationConfig::default()
        },
        thermal: ThermalConfig {
            check_interval_secs: 0.005,
            ..ThermalConfig::default()
        },
        store: StoreConfig {
            snapshot_window_secs: 0.1,
            save_poll_secs: 0.005,
            clip_dir: clip_dir.to_path_buf(),
        },
        ..TurretConfig::default()
    }
}

fn run_pipeline(
    config: TurretConfig,
    script: std::collections::VecDeque<Vec<Detection>>,
    frame_count: usize,
    frame_size: (u32, u32),
) -> (hardware::CommandJournal, StatusSnapshot) {
    let frames: Vec<RgbImage> = (0..frame_count)
        .map(|_| RgbImage::from_pixel(frame_size.0, frame_size.1, Rgb([30, 60, 30])))
        .collect();
    let camera = PacedCamera {
        inner: SequenceCamera::new(frames),
        delay: Duration::from_millis(10),
    };
    let backend = SimActuator::new();
    let journal = backend.journal();
    let controller =
        ActuationController::new(config.actuation.clone(), Box::new(backend)).unwrap();
    let governor = ThermalGovernor::start(
        config.thermal.clone(),
        Box::new(ScriptedProbe::constant(45.0)),
    );
    let store = Arc::new(FrameStore::new(config.store.clone(), Box::new(NullSink)));
    let board = Arc::new(Mutex::new(StatusSnapshot::default()));

    let pipeline = ControlPipeline::new(
        config,
        Box::new(camera),
        Box::new(ScriptedDetector { script }),
        controller,
        governor,
        store,
        Arc::new(AtomicBool::new(false)),
        Arc::clone(&board),
    );
    pipeline.run().unwrap();

    let snapshot = board.lock().unwrap().clone();
    (journal, snapshot)
}

#[test]
fn test_patrol_sweeps_between_waypoints_without_firing() {
    let dir = tempfile::tempdir().unwrap();
    let config = patrol_config(dir.path());

    let (journal, snapshot) = run_pipeline(
        config,
        std::collections::VecDeque::new(),
        30,
        (64, 48),
    );
    let commands = journal.lock().unwrap();

    // The sweep issued servo motion toward both sides of the scan table.
    let pans: Vec<f64> = commands
        .iter()
        .filter_map(|cmd| match cmd {
            ActuatorCommand::Angles { pan, .. } => Some(*pan),
            _ => None,
        })
        .collect();
    assert!(pans.iter().any(|pan| *pan < 60.0), "no sweep toward 40");
    assert!(pans.iter().any(|pan| *pan > 120.0), "no sweep toward 140");

    // Relay never energized while patrolling.
    assert!(!commands.contains(&ActuatorCommand::Relay(true)));
    drop(commands);
    assert_eq!(snapshot.firing_events, 0);
}

#[test]
fn test_aversion_presence_blocks_firing_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = patrol_config(dir.path());

    let bird = Detection {
        class_name: "bird".to_string(),
        confidence: 0.9,
        bbox: BoundingBox::new(272.0, 204.0, 368.0, 276.0),
    };
    let person = Detection {
        class_name: "person".to_string(),
        confidence: 0.9,
        bbox: BoundingBox::new(10.0, 200.0, 110.0, 400.0),
    };

    // A protected class stands next to an otherwise engageable target on
    // every frame: the relay must never energize.
    let script: std::collections::VecDeque<Vec<Detection>> =
        (0..20).map(|_| vec![bird.clone(), person.clone()]).collect();

    let (journal, snapshot) = run_pipeline(config, script, 20, (640, 480));
    let commands = journal.lock().unwrap();
    assert!(!commands.contains(&ActuatorCommand::Relay(true)));
    drop(commands);
    assert_eq!(snapshot.firing_events, 0);
}
