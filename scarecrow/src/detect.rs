//! Detection boundary types.
//!
//! The inference engine lives outside this crate; anything that can look at
//! an RGB frame and produce labeled boxes plugs in through [`Detector`].
//! Implementations return the frame with their own box annotations burned
//! in, plus the raw detections for the tracker.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassPolicy;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The inference backend failed on this frame.
    #[error("detector backend: {0}")]
    Backend(String),
}

/// Axis-aligned box in pixel coordinates, origin top-left, y down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Bottom edge of the box (largest y).
    pub fn lower_edge(&self) -> f32 {
        self.y2
    }
}

/// One labeled detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detector output for one frame.
pub struct Detections {
    /// Input frame with the detector's box annotations applied.
    pub annotated: RgbImage,
    /// Raw detections, unfiltered.
    pub items: Vec<Detection>,
}

/// Pluggable inference boundary.
pub trait Detector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detections, DetectError>;
}

/// Detections split by the class policy for one frame.
#[derive(Debug, Clone, Default)]
pub struct FramePartition {
    /// Engageable detections, in original order.
    pub targets: Vec<Detection>,
    /// True when any protected-class detection was present.
    pub aversion_present: bool,
}

/// Apply the class policy: drop low-confidence detections, split the rest
/// into engageable targets and protected sightings.
pub fn partition_detections(policy: &ClassPolicy, items: Vec<Detection>) -> FramePartition {
    let mut partition = FramePartition::default();
    for detection in items {
        if detection.confidence < policy.min_confidence {
            continue;
        }
        if policy
            .aversion_classes
            .iter()
            .any(|c| c == &detection.class_name)
        {
            partition.aversion_present = true;
        } else if policy
            .target_classes
            .iter()
            .any(|c| c == &detection.class_name)
        {
            partition.targets.push(detection);
        }
    }
    partition
}
