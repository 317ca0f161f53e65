//! Temperature probes for the thermal governor.
//!
//! The governor only needs one number at a time, so the trait is a single
//! blocking read. `ThermalZoneProbe` reads the kernel's sysfs thermal zone
//! (the CPU/SoC temperature on the Pi rig); `ScriptedProbe` replays a canned
//! sequence for tests and bench runs.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default zone on the deployment rig (SoC temperature, millidegrees C).
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparseable probe reading {raw:?}")]
    Parse { raw: String },

    /// Scripted probe ran out of samples.
    #[error("probe exhausted")]
    Exhausted,
}

/// Source of temperature samples, degrees Celsius.
pub trait TemperatureProbe: Send {
    fn read_celsius(&mut self) -> Result<f64, ProbeError>;
}

/// Sysfs thermal zone reader.
///
/// Zone files hold an integer in millidegrees Celsius with a trailing
/// newline; the path is configurable so tests point it at a temp file.
#[derive(Debug, Clone)]
pub struct ThermalZoneProbe {
    path: PathBuf,
}

impl ThermalZoneProbe {
    pub fn new() -> Self {
        Self::with_path(DEFAULT_THERMAL_ZONE)
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for ThermalZoneProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl TemperatureProbe for ThermalZoneProbe {
    fn read_celsius(&mut self) -> Result<f64, ProbeError> {
        let raw = fs::read_to_string(&self.path)?;
        let trimmed = raw.trim();
        let millidegrees: f64 = trimmed.parse().map_err(|_| ProbeError::Parse {
            raw: trimmed.to_string(),
        })?;
        Ok(millidegrees / 1000.0)
    }
}

/// Replays a fixed sample sequence, holding the final value forever.
///
/// An empty sequence reads as [`ProbeError::Exhausted`].
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    samples: VecDeque<f64>,
}

impl ScriptedProbe {
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    /// Probe that always reads `celsius`.
    pub fn constant(celsius: f64) -> Self {
        Self::new([celsius])
    }
}

impl TemperatureProbe for ScriptedProbe {
    fn read_celsius(&mut self) -> Result<f64, ProbeError> {
        match self.samples.len() {
            0 => Err(ProbeError::Exhausted),
            1 => Ok(self.samples[0]),
            _ => Ok(self.samples.pop_front().unwrap_or(0.0)),
        }
    }
}
