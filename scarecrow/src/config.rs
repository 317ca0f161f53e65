//! Engine configuration.
//!
//! Every tuned constant in the control system lives here, grouped per
//! component. Defaults reproduce the calibrated field rig; a JSON file can
//! override any section. Time-valued fields are plain `f64` seconds in the
//! file and converted to `Duration` at the call site via the `*_duration`
//! helpers.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One patrol waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub pan: f64,
    pub tilt: f64,
}

/// Targeting and fire-permission tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Horizontal field of view, degrees.
    pub fov_horizontal: f64,
    /// Vertical field of view, degrees.
    pub fov_vertical: f64,
    /// Scale on the computed aim deltas. The half-FOV conversion plus this
    /// factor were tuned in the field to stop the mount hunting; treat as
    /// empirical, not geometry.
    pub dampen_factor: f64,
    /// Horizontal tolerance within which the target counts as centered.
    pub dead_zone_deg: f64,
    /// Longest continuous burst before a forced cooldown.
    pub max_fire_secs: f64,
    /// Cooldown length once a burst hits the limit.
    pub cool_down_secs: f64,
    /// How long an aversion sighting keeps suppressing fire.
    pub aversion_timeout_secs: f64,
    /// Physical target width, millimeters (distance estimation).
    pub target_width_mm: f64,
    /// Physical target height, millimeters.
    pub target_height_mm: f64,
    /// Distance-model gain. Fitted against ranging tape measurements.
    pub range_k1: f64,
    /// Distance-model offset, millimeters. Fitted, not physical.
    pub range_k2: f64,
    /// Calibrated distance (mm) to tilt angle (deg) table, ascending.
    pub attack_table: Vec<(f64, f64)>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fov_horizontal: 60.0,
            fov_vertical: 40.0,
            dampen_factor: 1.0,
            dead_zone_deg: 2.0,
            max_fire_secs: 5.0,
            cool_down_secs: 15.0,
            aversion_timeout_secs: 5.0,
            target_width_mm: 400.0,
            target_height_mm: 350.0,
            range_k1: 0.9,
            range_k2: 100.0,
            attack_table: vec![(2000.0, 100.0), (2600.0, 110.0), (3100.0, 120.0)],
        }
    }
}

impl TrackerConfig {
    pub fn max_fire_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_fire_secs)
    }

    pub fn cool_down_duration(&self) -> Duration {
        Duration::from_secs_f64(self.cool_down_secs)
    }

    pub fn aversion_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.aversion_timeout_secs)
    }
}

/// Servo mount and patrol tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActuationConfig {
    /// Pan axis limits, degrees.
    pub pan_limits: (f64, f64),
    /// Tilt axis limits, degrees.
    pub tilt_limits: (f64, f64),
    /// Resting pan angle.
    pub rest_pan: f64,
    /// Resting tilt angle. Attack elevations are measured against this.
    pub rest_tilt: f64,
    /// Patrol waypoints, visited cyclically.
    pub scan_points: Vec<ScanPoint>,
    /// Seconds between waypoint advances; also the glide duration.
    pub scan_interval_secs: f64,
    /// How long after losing a target before patrol motion resumes.
    pub tracking_pause_secs: f64,
    /// Uniform jitter applied to each waypoint, degrees.
    pub jitter_deg: f64,
    /// Interpolation steps per glide.
    pub sweep_steps: u32,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            pan_limits: (0.0, 180.0),
            tilt_limits: (0.0, 180.0),
            rest_pan: 90.0,
            rest_tilt: 90.0,
            scan_points: vec![
                ScanPoint {
                    pan: 30.0,
                    tilt: 95.0,
                },
                ScanPoint {
                    pan: 75.0,
                    tilt: 100.0,
                },
                ScanPoint {
                    pan: 120.0,
                    tilt: 95.0,
                },
                ScanPoint {
                    pan: 165.0,
                    tilt: 100.0,
                },
            ],
            scan_interval_secs: 4.0,
            tracking_pause_secs: 2.0,
            jitter_deg: 3.0,
            sweep_steps: 25,
        }
    }
}

impl ActuationConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval_secs)
    }

    pub fn tracking_pause(&self) -> Duration {
        Duration::from_secs_f64(self.tracking_pause_secs)
    }
}

/// Thermal governor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermalConfig {
    /// Average at or above this fully halts the loop.
    pub max_temp: f64,
    /// Center of the comfortable operating band.
    pub stable_temp: f64,
    /// Full width of the band around `stable_temp`.
    pub stable_window: f64,
    /// Seconds between probe samples.
    pub check_interval_secs: f64,
    /// Moving-average window length, samples.
    pub moving_avg_window: usize,
    /// First throttle value applied when warming, seconds.
    pub starting_throttle_secs: f64,
    /// Multiplier per rising step.
    pub throttle_up_factor: f64,
    /// Divisor per falling step.
    pub throttle_down_divisor: f64,
    /// Poll period while halted on the overheat latch, seconds.
    pub halt_poll_secs: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            max_temp: 80.0,
            stable_temp: 70.0,
            stable_window: 3.0,
            check_interval_secs: 1.0,
            moving_avg_window: 3,
            starting_throttle_secs: 0.1,
            throttle_up_factor: 1.3,
            throttle_down_divisor: 1.1,
            halt_poll_secs: 1.0,
        }
    }
}

impl ThermalConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval_secs)
    }

    pub fn halt_poll(&self) -> Duration {
        Duration::from_secs_f64(self.halt_poll_secs)
    }
}

/// Frame store and clip retention tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Total clip span, seconds; half lands before the trigger, half after.
    pub snapshot_window_secs: f64,
    /// Save-timer poll period, seconds.
    pub save_poll_secs: f64,
    /// Directory exported clips are written into.
    pub clip_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_window_secs: 10.0,
            save_poll_secs: 0.5,
            clip_dir: PathBuf::from("clips"),
        }
    }
}

impl StoreConfig {
    pub fn snapshot_window(&self) -> Duration {
        Duration::from_secs_f64(self.snapshot_window_secs)
    }

    pub fn save_poll(&self) -> Duration {
        Duration::from_secs_f64(self.save_poll_secs)
    }
}

/// Which detection classes to engage, which to protect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassPolicy {
    pub target_classes: Vec<String>,
    pub aversion_classes: Vec<String>,
    /// Detections under this confidence are discarded before tracking.
    pub min_confidence: f32,
}

impl Default for ClassPolicy {
    fn default() -> Self {
        Self {
            target_classes: vec!["bird".to_string(), "chicken".to_string()],
            aversion_classes: vec![
                "person".to_string(),
                "cat".to_string(),
                "dog".to_string(),
            ],
            min_confidence: 0.5,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TurretConfig {
    pub tracker: TrackerConfig,
    pub actuation: ActuationConfig,
    pub thermal: ThermalConfig,
    pub store: StoreConfig,
    pub classes: ClassPolicy,
}

impl TurretConfig {
    /// Load from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write as pretty-printed JSON, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turret.json");

        let config = TurretConfig::default();
        config.save_to_file(&path).unwrap();
        let loaded = TurretConfig::load_from_file(&path).unwrap();

        assert_eq!(loaded.tracker.attack_table, config.tracker.attack_table);
        assert_eq!(loaded.actuation.scan_points, config.actuation.scan_points);
        assert_eq!(loaded.classes.target_classes, config.classes.target_classes);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: TurretConfig =
            serde_json::from_str(r#"{"tracker": {"dead_zone_deg": 4.5}}"#).unwrap();
        assert_eq!(parsed.tracker.dead_zone_deg, 4.5);
        assert_eq!(parsed.tracker.fov_horizontal, 60.0);
        assert_eq!(parsed.thermal.max_temp, 80.0);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = serde_json::from_str::<TurretConfig>(r#"{"trakcer": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let thermal = ThermalConfig::default();
        assert_eq!(thermal.check_interval(), Duration::from_secs(1));
        let tracker = TrackerConfig::default();
        assert_eq!(tracker.cool_down_duration(), Duration::from_secs(15));
    }
}
