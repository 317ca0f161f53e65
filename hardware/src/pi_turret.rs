//! Raspberry Pi turret rig: sysfs PWM servos plus a gpiod relay line.
//!
//! The deployment rig drives both servos from the Pi's hardware PWM block
//! (`dtoverlay=pwm-2chan`, GPIO 12/13) and the firing relay from GPIO 17.
//! Servo timing is the common hobby-servo contract: 50 Hz frame, 500 us to
//! 2500 us pulse across 0 to 180 degrees.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gpiod::{Chip, Lines, Options, Output};
use tracing::{debug, info, warn};

use crate::actuator::{ActuatorBackend, ActuatorError};

const PWM_PERIOD_NS: u64 = 20_000_000;
const MIN_PULSE_NS: u64 = 500_000;
const MAX_PULSE_NS: u64 = 2_500_000;
const ANGLE_MIN: f64 = 0.0;
const ANGLE_MAX: f64 = 180.0;

/// Wiring description for the Pi rig.
#[derive(Debug, Clone)]
pub struct PiTurretConfig {
    /// Sysfs PWM chip directory.
    pub pwm_chip: PathBuf,
    /// PWM channel for the pan servo (GPIO 12 under pwm-2chan).
    pub pan_channel: u32,
    /// PWM channel for the tilt servo (GPIO 13 under pwm-2chan).
    pub tilt_channel: u32,
    /// GPIO character device for the relay.
    pub gpio_chip: String,
    /// Relay line offset (active high).
    pub relay_line: u32,
}

impl Default for PiTurretConfig {
    fn default() -> Self {
        Self {
            pwm_chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
            pan_channel: 0,
            tilt_channel: 1,
            gpio_chip: "gpiochip0".to_string(),
            relay_line: 17,
        }
    }
}

/// Map an angle in degrees onto a pulse width in nanoseconds.
fn pulse_ns_for_angle(angle: f64) -> Result<u64, ActuatorError> {
    if !(ANGLE_MIN..=ANGLE_MAX).contains(&angle) {
        return Err(ActuatorError::AngleRange {
            angle,
            min: ANGLE_MIN,
            max: ANGLE_MAX,
        });
    }
    let span = (MAX_PULSE_NS - MIN_PULSE_NS) as f64;
    Ok(MIN_PULSE_NS + (span * angle / ANGLE_MAX) as u64)
}

/// One exported sysfs PWM channel.
#[derive(Debug)]
struct PwmServo {
    channel_dir: PathBuf,
}

impl PwmServo {
    /// Export the channel if needed and program the servo frame period.
    fn export(chip: &Path, channel: u32) -> io::Result<Self> {
        let channel_dir = chip.join(format!("pwm{channel}"));
        if !channel_dir.exists() {
            fs::write(chip.join("export"), channel.to_string())?;
        }
        fs::write(channel_dir.join("period"), PWM_PERIOD_NS.to_string())?;
        Ok(Self { channel_dir })
    }

    fn set_pulse_ns(&self, pulse_ns: u64) -> io::Result<()> {
        fs::write(self.channel_dir.join("duty_cycle"), pulse_ns.to_string())
    }

    fn set_enabled(&self, enabled: bool) -> io::Result<()> {
        let flag = if enabled { "1" } else { "0" };
        fs::write(self.channel_dir.join("enable"), flag)
    }
}

/// Pan/tilt/relay backend for the Raspberry Pi rig.
pub struct PiTurret {
    config: PiTurretConfig,
    pan: Option<PwmServo>,
    tilt: Option<PwmServo>,
    relay: Option<Lines<Output>>,
}

impl PiTurret {
    pub fn new(config: PiTurretConfig) -> Self {
        Self {
            config,
            pan: None,
            tilt: None,
            relay: None,
        }
    }

    fn servo(&self, servo: &Option<PwmServo>) -> Result<&PwmServo, ActuatorError> {
        servo.as_ref().ok_or(ActuatorError::NotInitialized)
    }
}

impl ActuatorBackend for PiTurret {
    fn initialize(&mut self) -> Result<(), ActuatorError> {
        let pan = PwmServo::export(&self.config.pwm_chip, self.config.pan_channel)
            .map_err(|e| ActuatorError::Init(format!("pan PWM: {e}")))?;
        let tilt = PwmServo::export(&self.config.pwm_chip, self.config.tilt_channel)
            .map_err(|e| ActuatorError::Init(format!("tilt PWM: {e}")))?;

        let chip = Chip::new(&self.config.gpio_chip)
            .map_err(|e| ActuatorError::Init(format!("gpio chip: {e}")))?;
        let opts = Options::output([self.config.relay_line])
            .values([false])
            .consumer("scarecrow-relay");
        let relay = chip
            .request_lines(opts)
            .map_err(|e| ActuatorError::Init(format!("relay line: {e}")))?;

        // Center before enabling so the first frame is already sane.
        let neutral = pulse_ns_for_angle(90.0)?;
        pan.set_pulse_ns(neutral)?;
        tilt.set_pulse_ns(neutral)?;
        pan.set_enabled(true)?;
        tilt.set_enabled(true)?;

        self.pan = Some(pan);
        self.tilt = Some(tilt);
        self.relay = Some(relay);
        info!(
            chip = %self.config.pwm_chip.display(),
            relay_line = self.config.relay_line,
            "pi turret initialized"
        );
        Ok(())
    }

    fn set_servo_angles(&mut self, pan: f64, tilt: f64) -> Result<(), ActuatorError> {
        let pan_pulse = pulse_ns_for_angle(pan)?;
        let tilt_pulse = pulse_ns_for_angle(tilt)?;
        self.servo(&self.pan)?.set_pulse_ns(pan_pulse)?;
        self.servo(&self.tilt)?.set_pulse_ns(tilt_pulse)?;
        debug!(pan, tilt, "servo angles set");
        Ok(())
    }

    fn set_relay(&mut self, on: bool) -> Result<(), ActuatorError> {
        let relay = self.relay.as_ref().ok_or(ActuatorError::NotInitialized)?;
        relay.set_values([on])?;
        debug!(on, "relay set");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ActuatorError> {
        if let Some(relay) = self.relay.take() {
            if let Err(e) = relay.set_values([false]) {
                warn!(error = %e, "relay release failed");
            }
        }
        for servo in [self.pan.take(), self.tilt.take()].into_iter().flatten() {
            if let Err(e) = servo.set_enabled(false) {
                warn!(error = %e, "PWM disable failed");
            }
        }
        info!("pi turret shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_width_endpoints() {
        assert_eq!(pulse_ns_for_angle(0.0).unwrap(), 500_000);
        assert_eq!(pulse_ns_for_angle(180.0).unwrap(), 2_500_000);
        assert_eq!(pulse_ns_for_angle(90.0).unwrap(), 1_500_000);
    }

    #[test]
    fn test_pulse_width_rejects_out_of_range() {
        assert!(matches!(
            pulse_ns_for_angle(-1.0),
            Err(ActuatorError::AngleRange { .. })
        ));
        assert!(matches!(
            pulse_ns_for_angle(180.5),
            Err(ActuatorError::AngleRange { .. })
        ));
    }
}
