//! Distance estimation and the attack-angle table.
//!
//! Range comes from apparent box size against the known physical size of
//! the target species, through an affine model fitted against tape-measure
//! calibration runs. The attack table then maps calibrated distance to the
//! tilt needed to arc the spray onto the target.

use crate::config::TrackerConfig;
use crate::detect::BoundingBox;

/// Fitted size-to-distance model. Output in millimeters.
#[derive(Debug, Clone)]
pub struct SizeCalibration {
    k1: f64,
    k2: f64,
    known_width_mm: f64,
    known_height_mm: f64,
}

impl SizeCalibration {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            k1: config.range_k1,
            k2: config.range_k2,
            known_width_mm: config.target_width_mm,
            known_height_mm: config.target_height_mm,
        }
    }

    /// Estimate target distance from its box, averaging the width-based and
    /// height-based estimates. `None` for degenerate boxes.
    pub fn estimate_distance(
        &self,
        bbox: &BoundingBox,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<f64> {
        let width_frac = f64::from(bbox.width()) / f64::from(frame_width);
        let height_frac = f64::from(bbox.height()) / f64::from(frame_height);
        if width_frac <= 0.0 || height_frac <= 0.0 {
            return None;
        }
        let x_dist = (self.k1 * self.known_width_mm) / width_frac - self.k2;
        let y_dist = (self.k1 * self.known_height_mm) / height_frac - self.k2;
        Some((x_dist + y_dist) / 2.0)
    }
}

/// Monotonic distance (mm) to tilt (deg) lookup with linear interpolation.
///
/// Distances short of the first entry need no elevation at all; distances
/// past the last entry are out of range and yield no angle.
#[derive(Debug, Clone)]
pub struct AttackAngleTable {
    entries: Vec<(f64, f64)>,
}

impl AttackAngleTable {
    pub fn new(mut entries: Vec<(f64, f64)>) -> Self {
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { entries }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.attack_table.clone())
    }

    /// Tilt angle for `distance_mm`, or `None` beyond calibrated range.
    pub fn lookup(&self, distance_mm: f64) -> Option<f64> {
        let (first, last) = (self.entries.first()?, self.entries.last()?);
        if distance_mm < first.0 {
            return Some(0.0);
        }
        if distance_mm > last.0 {
            return None;
        }
        for pair in self.entries.windows(2) {
            let (d0, a0) = pair[0];
            let (d1, a1) = pair[1];
            if distance_mm <= d1 {
                let t = (distance_mm - d0) / (d1 - d0);
                return Some(a0 + (a1 - a0) * t);
            }
        }
        Some(last.1)
    }
}
