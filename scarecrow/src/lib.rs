//! SCARECROW - deterrent turret control engine.
//!
//! Turns per-frame object detections into physical actuation decisions:
//! select a target, aim the pan/tilt mount, gate the sprayer relay behind
//! safety interlocks, patrol when idle, throttle the loop under thermal
//! load, and keep a short annotated clip around every firing event.
//!
//! The engine is deliberately single-threaded per frame; the only background
//! activities are the thermal sampler, the patrol smoothing glide, and the
//! debounced clip-save timer, each a [`task::StoppableTask`].

pub mod actuation;
pub mod camera;
pub mod config;
pub mod detect;
pub mod overlay;
pub mod pipeline;
pub mod range;
pub mod store;
pub mod task;
pub mod thermal;
pub mod tracker;

pub use actuation::{ActuationController, ActuationError};
pub use camera::{Camera, CameraError, SequenceCamera};
pub use config::TurretConfig;
pub use detect::{BoundingBox, Detection, Detections, Detector, DetectError};
pub use pipeline::{ControlPipeline, PipelineError, StatusBoard, StatusSnapshot};
pub use store::{ClipError, ClipSink, FrameRecord, FrameStore};
pub use thermal::{ThermalGovernor, ThermalSnapshot};
pub use tracker::{FireControlState, FiringEvent, TargetTracker, TrackCommand, TrackReport};
