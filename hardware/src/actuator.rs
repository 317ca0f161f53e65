//! Actuator backend trait and the simulator implementation.
//!
//! A backend owns the physical (or simulated) pan/tilt servo pair and the
//! firing relay. Backend selection is explicit configuration by the caller;
//! nothing in this crate sniffs the platform at runtime.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

/// Errors raised by actuator backends.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// Backend could not be brought up (missing device, permission, wiring).
    #[error("actuator initialization failed: {0}")]
    Init(String),

    /// A command was issued before `initialize` succeeded.
    #[error("actuator used before initialization")]
    NotInitialized,

    /// The underlying device rejected or failed a command.
    #[error("actuator I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A commanded angle was not representable on the device.
    #[error("angle {angle:.1} outside device range {min:.1}..{max:.1}")]
    AngleRange { angle: f64, min: f64, max: f64 },
}

/// Two-axis turret rig with a firing relay.
///
/// Angles are in degrees, `0.0..=180.0` on both axes. Implementations keep
/// the relay de-energized until explicitly commanded and must tolerate
/// `shutdown` being called more than once.
pub trait ActuatorBackend: Send {
    /// Bring the rig up: configure outputs, center the servos, force the
    /// relay off.
    fn initialize(&mut self) -> Result<(), ActuatorError>;

    /// Command both servo angles in one call.
    fn set_servo_angles(&mut self, pan: f64, tilt: f64) -> Result<(), ActuatorError>;

    /// Energize (`true`) or release (`false`) the firing relay.
    fn set_relay(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Release the rig: relay off, outputs dropped.
    fn shutdown(&mut self) -> Result<(), ActuatorError>;
}

/// One command as observed by [`SimActuator`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCommand {
    Initialize,
    Angles { pan: f64, tilt: f64 },
    Relay(bool),
    Shutdown,
}

/// Journal of commands a [`SimActuator`] has received.
///
/// Cloning the handle is cheap; tests keep one and inspect it after the
/// controller under test has been dropped.
pub type CommandJournal = Arc<Mutex<Vec<ActuatorCommand>>>;

/// Recording backend for tests and simulation runs.
///
/// Every command is appended to a shared journal. `set_failing(true)` makes
/// subsequent commands return an I/O error, for exercising the caller's
/// error path.
#[derive(Debug, Default)]
pub struct SimActuator {
    journal: CommandJournal,
    initialized: bool,
    failing: bool,
    pan: f64,
    tilt: f64,
    relay: bool,
}

impl SimActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the command journal.
    pub fn journal(&self) -> CommandJournal {
        Arc::clone(&self.journal)
    }

    /// Make every subsequent command fail with an I/O error.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Last commanded angles.
    pub fn angles(&self) -> (f64, f64) {
        (self.pan, self.tilt)
    }

    /// Current relay state.
    pub fn relay(&self) -> bool {
        self.relay
    }

    fn record(&self, command: ActuatorCommand) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(command);
        }
    }

    fn check(&self) -> Result<(), ActuatorError> {
        if self.failing {
            return Err(ActuatorError::Io(std::io::Error::other(
                "simulated actuator fault",
            )));
        }
        if !self.initialized {
            return Err(ActuatorError::NotInitialized);
        }
        Ok(())
    }
}

impl ActuatorBackend for SimActuator {
    fn initialize(&mut self) -> Result<(), ActuatorError> {
        if self.failing {
            return Err(ActuatorError::Init("simulated init fault".to_string()));
        }
        self.initialized = true;
        self.relay = false;
        self.record(ActuatorCommand::Initialize);
        debug!("sim actuator initialized");
        Ok(())
    }

    fn set_servo_angles(&mut self, pan: f64, tilt: f64) -> Result<(), ActuatorError> {
        self.check()?;
        self.pan = pan;
        self.tilt = tilt;
        self.record(ActuatorCommand::Angles { pan, tilt });
        Ok(())
    }

    fn set_relay(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.check()?;
        self.relay = on;
        self.record(ActuatorCommand::Relay(on));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ActuatorError> {
        self.initialized = false;
        self.relay = false;
        self.record(ActuatorCommand::Shutdown);
        debug!("sim actuator shut down");
        Ok(())
    }
}
