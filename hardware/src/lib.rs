//! Hardware backends for the turret rig.
//!
//! The control engine talks to physical equipment through two small traits:
//! [`ActuatorBackend`] for the pan/tilt servos plus the firing relay, and
//! [`TemperatureProbe`] for the thermal governor's sample source. Simulator
//! implementations ship unconditionally so the full control loop runs on any
//! development machine; the Raspberry Pi backend is compiled in with the
//! `pi-turret` feature on Linux.

pub mod actuator;
pub mod thermal;

#[cfg(all(target_os = "linux", feature = "pi-turret"))]
pub mod pi_turret;

pub use actuator::{ActuatorBackend, ActuatorCommand, ActuatorError, CommandJournal, SimActuator};
pub use thermal::{ProbeError, ScriptedProbe, TemperatureProbe, ThermalZoneProbe};

#[cfg(all(target_os = "linux", feature = "pi-turret"))]
pub use pi_turret::PiTurret;
