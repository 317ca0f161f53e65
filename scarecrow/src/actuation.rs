//! Servo aiming, patrol scanning, and relay gating.
//!
//! The controller owns the actuator backend and all aim state behind one
//! mutex so the control loop and the patrol glide thread never command the
//! rig concurrently. Every angle write is clamped to the configured axis
//! limits before it reaches the backend.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ActuationConfig, ScanPoint};
use crate::task::StoppableTask;
use crate::tracker::TrackCommand;
use hardware::{ActuatorBackend, ActuatorError};

#[derive(Debug, Error)]
pub enum ActuationError {
    /// The backend could not be brought up. Fatal at construction.
    #[error("actuator backend init: {0}")]
    Init(#[source] ActuatorError),
}

/// Backend handle plus the aim state the glide thread shares.
struct Rig {
    backend: Box<dyn ActuatorBackend>,
    pan: f64,
    tilt: f64,
    relay: bool,
}

impl Rig {
    /// Clamp and push both angles; backend errors are the caller's to log.
    fn command_angles(
        &mut self,
        config: &ActuationConfig,
        pan: f64,
        tilt: f64,
    ) -> Result<(), ActuatorError> {
        let pan = clamp_axis(pan, config.pan_limits);
        let tilt = clamp_axis(tilt, config.tilt_limits);
        self.backend.set_servo_angles(pan, tilt)?;
        self.pan = pan;
        self.tilt = tilt;
        Ok(())
    }

    fn command_relay(&mut self, on: bool) -> Result<(), ActuatorError> {
        if self.relay != on {
            self.backend.set_relay(on)?;
            self.relay = on;
        }
        Ok(())
    }
}

fn clamp_axis(angle: f64, (low, high): (f64, f64)) -> f64 {
    angle.clamp(low, high)
}

/// Owns the turret rig: tracking moves, idle patrol, exactly-once cleanup.
pub struct ActuationController {
    config: ActuationConfig,
    rig: Arc<Mutex<Rig>>,
    sweep: Option<StoppableTask>,
    scan_cursor: usize,
    last_tracked: Option<Instant>,
    last_scan_step: Option<Instant>,
    pre_attack_tilt: Option<f64>,
    cleaned_up: bool,
}

impl ActuationController {
    /// Initialize the backend and move to the rest position.
    ///
    /// A backend that cannot initialize is unusable; this is the one fatal
    /// error in the component.
    pub fn new(
        config: ActuationConfig,
        mut backend: Box<dyn ActuatorBackend>,
    ) -> Result<Self, ActuationError> {
        backend.initialize().map_err(ActuationError::Init)?;
        let mut rig = Rig {
            backend,
            pan: config.rest_pan,
            tilt: config.rest_tilt,
            relay: false,
        };
        if let Err(err) = rig.command_angles(&config, config.rest_pan, config.rest_tilt) {
            warn!(%err, "rest position not reached at startup");
        }
        info!(pan = rig.pan, tilt = rig.tilt, "actuation controller up");
        Ok(Self {
            config,
            rig: Arc::new(Mutex::new(rig)),
            sweep: None,
            scan_cursor: 0,
            last_tracked: None,
            last_scan_step: None,
            pre_attack_tilt: None,
            cleaned_up: false,
        })
    }

    /// Apply one tracking command.
    ///
    /// Per-frame failures (non-finite deltas, backend I/O) degrade to a
    /// no-op frame; the previous rig state stands.
    pub fn track(&mut self, command: &TrackCommand, now: Instant) {
        if self.cleaned_up {
            return;
        }
        if !command.dx.is_finite() || !command.dy.is_finite() {
            warn!(dx = command.dx, dy = command.dy, "malformed aim delta dropped");
            return;
        }
        self.cancel_sweep();
        self.last_tracked = Some(now);

        let Ok(mut rig) = self.rig.lock() else {
            return;
        };
        let pan = rig.pan + command.dx;
        let mut tilt = rig.tilt + command.dy;

        if command.fire {
            if let Some(attack) = command.attack_tilt {
                if attack > self.config.rest_tilt {
                    // Remember the tracking tilt once per attack episode.
                    if self.pre_attack_tilt.is_none() {
                        self.pre_attack_tilt = Some(tilt);
                    }
                    tilt = attack;
                }
            }
        }

        if let Err(err) = rig.command_angles(&self.config, pan, tilt) {
            warn!(%err, "servo command failed, frame skipped");
            return;
        }
        if let Err(err) = rig.command_relay(command.fire) {
            warn!(%err, "relay command failed");
        }
        debug!(pan = rig.pan, tilt = rig.tilt, fire = command.fire, "tracking");
    }

    /// Idle behavior for a frame with no target.
    pub fn patrol(&mut self, now: Instant) {
        if self.cleaned_up {
            return;
        }
        {
            let Ok(mut rig) = self.rig.lock() else {
                return;
            };
            if let Err(err) = rig.command_relay(false) {
                warn!(%err, "relay release failed");
            }
            // Undo an attack elevation before any scanning resumes.
            if let Some(previous) = self.pre_attack_tilt.take() {
                let pan = rig.pan;
                if let Err(err) = rig.command_angles(&self.config, pan, previous) {
                    warn!(%err, "tilt restore failed");
                }
                return;
            }
        }

        if let Some(tracked) = self.last_tracked {
            if now.duration_since(tracked) < self.config.tracking_pause() {
                return;
            }
        }
        if let Some(stepped) = self.last_scan_step {
            if now.duration_since(stepped) < self.config.scan_interval() {
                return;
            }
        }
        if self.config.scan_points.is_empty() {
            return;
        }

        let waypoint = self.config.scan_points[self.scan_cursor % self.config.scan_points.len()];
        self.scan_cursor = (self.scan_cursor + 1) % self.config.scan_points.len();
        self.last_scan_step = Some(now);
        self.start_sweep(waypoint);
    }

    /// Glide from the current position to a jittered waypoint on a
    /// cancellable background thread. Any prior glide is joined first.
    fn start_sweep(&mut self, waypoint: ScanPoint) {
        self.cancel_sweep();

        let mut rng = rand::rng();
        let jitter = self.config.jitter_deg;
        let target_pan = clamp_axis(
            waypoint.pan + rng.random_range(-jitter..=jitter),
            self.config.pan_limits,
        );
        let target_tilt = clamp_axis(
            waypoint.tilt + rng.random_range(-jitter..=jitter),
            self.config.tilt_limits,
        );

        let steps = self.config.sweep_steps.max(1);
        let pause = self.config.scan_interval() / steps;
        let rig = Arc::clone(&self.rig);
        let config = self.config.clone();
        debug!(target_pan, target_tilt, "patrol sweep started");

        self.sweep = Some(StoppableTask::spawn(move |flag| {
            let (start_pan, start_tilt) = match rig.lock() {
                Ok(rig) => (rig.pan, rig.tilt),
                Err(_) => return,
            };
            for step in 1..=steps {
                if flag.is_raised() {
                    return;
                }
                let t = f64::from(step) / f64::from(steps);
                let pan = start_pan + (target_pan - start_pan) * t;
                let tilt = start_tilt + (target_tilt - start_tilt) * t;
                if let Ok(mut rig) = rig.lock() {
                    if let Err(err) = rig.command_angles(&config, pan, tilt) {
                        warn!(%err, "sweep step failed");
                        return;
                    }
                }
                std::thread::sleep(pause);
            }
        }));
    }

    fn cancel_sweep(&mut self) {
        if let Some(sweep) = self.sweep.take() {
            sweep.cancel_and_join();
        }
    }

    /// Release the rig: sweep joined, relay off, backend shut down.
    /// Safe to call more than once; only the first call acts.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.cancel_sweep();
        if let Ok(mut rig) = self.rig.lock() {
            if let Err(err) = rig.command_relay(false) {
                warn!(%err, "relay release failed during cleanup");
            }
            if let Err(err) = rig.backend.shutdown() {
                warn!(%err, "backend shutdown failed");
            }
        }
        info!("actuation controller released");
    }

    /// Current pan/tilt as last commanded.
    pub fn angles(&self) -> (f64, f64) {
        self.rig
            .lock()
            .map(|rig| (rig.pan, rig.tilt))
            .unwrap_or((0.0, 0.0))
    }

    pub fn relay(&self) -> bool {
        self.rig.lock().map(|rig| rig.relay).unwrap_or(false)
    }
}

impl Drop for ActuationController {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hardware::{ActuatorCommand, SimActuator};
    use std::time::Duration;

    fn command(dx: f64, dy: f64) -> TrackCommand {
        TrackCommand {
            dx,
            dy,
            fire: false,
            attack_tilt: None,
        }
    }

    fn controller(config: ActuationConfig) -> (ActuationController, hardware::CommandJournal) {
        let backend = SimActuator::new();
        let journal = backend.journal();
        let controller = ActuationController::new(config, Box::new(backend)).unwrap();
        (controller, journal)
    }

    #[test]
    fn test_init_failure_is_fatal() {
        let mut backend = SimActuator::new();
        backend.set_failing(true);
        let result = ActuationController::new(ActuationConfig::default(), Box::new(backend));
        assert!(matches!(result, Err(ActuationError::Init(_))));
    }

    #[test]
    fn test_extreme_deltas_clamp_to_limits() {
        let (mut controller, _journal) = controller(ActuationConfig::default());
        controller.track(&command(100.0, -100.0), Instant::now());
        let (pan, tilt) = controller.angles();
        assert_relative_eq!(pan, 180.0);
        assert_relative_eq!(tilt, 0.0);

        controller.track(&command(-500.0, 500.0), Instant::now());
        let (pan, tilt) = controller.angles();
        assert_relative_eq!(pan, 0.0);
        assert_relative_eq!(tilt, 180.0);
    }

    #[test]
    fn test_non_finite_delta_is_a_noop_frame() {
        let (mut controller, _journal) = controller(ActuationConfig::default());
        let before = controller.angles();
        controller.track(&command(f64::NAN, 1.0), Instant::now());
        assert_eq!(controller.angles(), before);
    }

    #[test]
    fn test_fire_intent_gates_relay() {
        let (mut controller, _journal) = controller(ActuationConfig::default());
        let mut cmd = command(0.0, 0.0);
        cmd.fire = true;
        controller.track(&cmd, Instant::now());
        assert!(controller.relay());

        cmd.fire = false;
        controller.track(&cmd, Instant::now());
        assert!(!controller.relay());
    }

    #[test]
    fn test_attack_tilt_override_and_restore() {
        let (mut controller, _journal) = controller(ActuationConfig::default());
        let mut cmd = command(0.0, 2.0);
        cmd.fire = true;
        cmd.attack_tilt = Some(110.0);
        controller.track(&cmd, Instant::now());
        let (_, tilt) = controller.angles();
        assert_relative_eq!(tilt, 110.0);

        // Patrol after losing the target restores the pre-attack tilt and
        // drops the relay before any scanning.
        controller.patrol(Instant::now());
        let (_, tilt) = controller.angles();
        assert_relative_eq!(tilt, 92.0);
        assert!(!controller.relay());
    }

    #[test]
    fn test_attack_tilt_below_rest_is_ignored() {
        let (mut controller, _journal) = controller(ActuationConfig::default());
        let mut cmd = command(0.0, 0.0);
        cmd.fire = true;
        cmd.attack_tilt = Some(45.0);
        controller.track(&cmd, Instant::now());
        let (_, tilt) = controller.angles();
        assert_relative_eq!(tilt, 90.0);
    }

    #[test]
    fn test_patrol_waits_out_tracking_pause() {
        let config = ActuationConfig {
            tracking_pause_secs: 10.0,
            ..ActuationConfig::default()
        };
        let (mut controller, journal) = controller(config);
        let now = Instant::now();
        controller.track(&command(1.0, 0.0), now);
        let commands_after_track = journal.lock().unwrap().len();

        // Target just lost: no scan motion inside the pause window.
        controller.patrol(now + Duration::from_secs(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(journal.lock().unwrap().len(), commands_after_track);

        // Past the pause the sweep starts issuing angle commands.
        controller.patrol(now + Duration::from_secs(11));
        std::thread::sleep(Duration::from_millis(50));
        assert!(journal.lock().unwrap().len() > commands_after_track);
    }

    #[test]
    fn test_sweep_lands_within_jitter_of_waypoint() {
        let config = ActuationConfig {
            tracking_pause_secs: 0.0,
            scan_interval_secs: 0.05,
            sweep_steps: 5,
            jitter_deg: 3.0,
            scan_points: vec![ScanPoint {
                pan: 30.0,
                tilt: 95.0,
            }],
            ..ActuationConfig::default()
        };
        let (mut controller, _journal) = controller(config);
        controller.patrol(Instant::now());
        std::thread::sleep(Duration::from_millis(120));
        let (pan, tilt) = controller.angles();
        assert!((pan - 30.0).abs() <= 3.0 + 1e-9, "pan {pan}");
        assert!((tilt - 95.0).abs() <= 3.0 + 1e-9, "tilt {tilt}");
    }

    #[test]
    fn test_tracking_cancels_sweep_in_flight() {
        let config = ActuationConfig {
            tracking_pause_secs: 0.0,
            scan_interval_secs: 1.0,
            sweep_steps: 100,
            ..ActuationConfig::default()
        };
        let (mut controller, journal) = controller(config);
        controller.patrol(Instant::now());
        std::thread::sleep(Duration::from_millis(30));

        controller.track(&command(1.0, 1.0), Instant::now());
        let len_after_track = journal.lock().unwrap().len();
        // Joined sweep issues nothing further.
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(journal.lock().unwrap().len(), len_after_track);
    }

    #[test]
    fn test_cleanup_is_exactly_once() {
        let (mut controller, journal) = controller(ActuationConfig::default());
        controller.cleanup();
        controller.cleanup();
        drop(controller);
        let shutdowns = journal
            .lock()
            .unwrap()
            .iter()
            .filter(|cmd| matches!(cmd, ActuatorCommand::Shutdown))
            .count();
        assert_eq!(shutdowns, 1);
    }

    /// Backend that works at init, then fails every servo command once told.
    struct FlakyBackend {
        fail: Arc<std::sync::atomic::AtomicBool>,
        inner: SimActuator,
    }

    impl ActuatorBackend for FlakyBackend {
        fn initialize(&mut self) -> Result<(), hardware::ActuatorError> {
            self.inner.initialize()
        }

        fn set_servo_angles(&mut self, pan: f64, tilt: f64) -> Result<(), hardware::ActuatorError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(hardware::ActuatorError::Io(std::io::Error::other(
                    "servo bus fault",
                )));
            }
            self.inner.set_servo_angles(pan, tilt)
        }

        fn set_relay(&mut self, on: bool) -> Result<(), hardware::ActuatorError> {
            self.inner.set_relay(on)
        }

        fn shutdown(&mut self) -> Result<(), hardware::ActuatorError> {
            self.inner.shutdown()
        }
    }

    #[test]
    fn test_backend_fault_mid_frame_keeps_state() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let backend = FlakyBackend {
            fail: Arc::clone(&fail),
            inner: SimActuator::new(),
        };
        let mut controller =
            ActuationController::new(ActuationConfig::default(), Box::new(backend)).unwrap();
        controller.track(&command(5.0, 5.0), Instant::now());
        let before = controller.angles();

        // A failing frame leaves the rig state where it was.
        fail.store(true, std::sync::atomic::Ordering::SeqCst);
        controller.track(&command(5.0, 5.0), Instant::now());
        assert_eq!(controller.angles(), before);

        fail.store(false, std::sync::atomic::Ordering::SeqCst);
        controller.track(&command(5.0, 5.0), Instant::now());
        assert_ne!(controller.angles(), before);
    }
}
