//! Thermal governor.
//!
//! A background sampler feeds probe readings into a moving average and
//! adjusts a shared throttle with hysteresis; the control loop calls
//! [`ThermalGovernor::throttle`] once per frame as its only backpressure
//! point. Averages at or above `max_temp` set an overheat latch that halts
//! the loop outright until the rig cools.
//!
//! The adjustment rules live in [`ThermalModel`], a pure step function, so
//! the progression tests run without threads or clocks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ThermalConfig;
use crate::task::StoppableTask;
use hardware::TemperatureProbe;

/// Moving-average window plus hysteresis throttle rules.
///
/// `observe` is called once per probe sample. Throttle changes only compare
/// the fresh average against the previous one, so a single noisy reading
/// cannot flip the direction.
#[derive(Debug)]
pub struct ThermalModel {
    config: ThermalConfig,
    window: VecDeque<f64>,
    previous_avg: Option<f64>,
    throttle_secs: Option<f64>,
    overheated: bool,
}

impl ThermalModel {
    pub fn new(config: ThermalConfig) -> Self {
        let capacity = config.moving_avg_window.max(1);
        Self {
            config,
            window: VecDeque::with_capacity(capacity),
            previous_avg: None,
            throttle_secs: None,
            overheated: false,
        }
    }

    /// Fold one sample in and apply the transition rules.
    pub fn observe(&mut self, celsius: f64) {
        if self.window.len() == self.config.moving_avg_window.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(celsius);
        let avg = self.window.iter().sum::<f64>() / self.window.len() as f64;

        if avg >= self.config.max_temp {
            if !self.overheated {
                error!(avg, max = self.config.max_temp, "overheat latch set, halting");
                self.overheated = true;
            }
        } else if self.overheated {
            info!(avg, "overheat latch cleared");
            self.overheated = false;
        }

        if let Some(previous) = self.previous_avg {
            let half_band = self.config.stable_window / 2.0;
            if avg >= previous && avg > self.config.stable_temp + half_band {
                let next = match self.throttle_secs {
                    None => self.config.starting_throttle_secs,
                    Some(current) => current * self.config.throttle_up_factor,
                };
                info!(avg, throttle_secs = next, "increasing throttle");
                self.throttle_secs = Some(next);
            } else if avg <= previous && avg < self.config.stable_temp - half_band {
                if let Some(current) = self.throttle_secs {
                    let next = current / self.config.throttle_down_divisor;
                    if next < self.config.starting_throttle_secs {
                        info!(avg, "throttle released");
                        self.throttle_secs = None;
                    } else {
                        info!(avg, throttle_secs = next, "reducing throttle");
                        self.throttle_secs = Some(next);
                    }
                }
            }
        }
        self.previous_avg = Some(avg);
    }

    pub fn throttle_secs(&self) -> Option<f64> {
        self.throttle_secs
    }

    pub fn is_overheated(&self) -> bool {
        self.overheated
    }

    pub fn average(&self) -> Option<f64> {
        self.previous_avg
    }
}

/// Point-in-time governor state for the status surface.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ThermalSnapshot {
    pub average_celsius: Option<f64>,
    pub throttle_secs: Option<f64>,
    pub overheated: bool,
}

/// Background-sampled governor handle.
///
/// The sampler thread is the sole writer of the shared model; `throttle`
/// callers only take the lock long enough to read the current verdict.
pub struct ThermalGovernor {
    model: Arc<Mutex<ThermalModel>>,
    config: ThermalConfig,
    sampler: Option<StoppableTask>,
}

impl ThermalGovernor {
    /// Spawn the sampler thread over `probe`.
    pub fn start(config: ThermalConfig, mut probe: Box<dyn TemperatureProbe>) -> Self {
        let model = Arc::new(Mutex::new(ThermalModel::new(config.clone())));
        let shared = Arc::clone(&model);
        let interval = config.check_interval();
        let sampler = StoppableTask::spawn(move |flag| {
            while !flag.is_raised() {
                match probe.read_celsius() {
                    Ok(celsius) => {
                        if let Ok(mut model) = shared.lock() {
                            model.observe(celsius);
                        }
                    }
                    Err(err) => warn!(%err, "temperature sample skipped"),
                }
                std::thread::sleep(interval);
            }
        });
        Self {
            model,
            config,
            sampler: Some(sampler),
        }
    }

    /// Block for as long as the thermal state demands.
    ///
    /// Halts in a polled loop while the overheat latch is set, then sleeps
    /// the current throttle duration if one is in force. Never fails, never
    /// retries anything; delay is the only effect.
    pub fn throttle(&self) {
        loop {
            let overheated = self
                .model
                .lock()
                .map(|model| model.is_overheated())
                .unwrap_or(false);
            if !overheated {
                break;
            }
            std::thread::sleep(self.config.halt_poll());
        }
        let throttle = self
            .model
            .lock()
            .ok()
            .and_then(|model| model.throttle_secs());
        if let Some(secs) = throttle {
            std::thread::sleep(Duration::from_secs_f64(secs));
        }
    }

    pub fn snapshot(&self) -> ThermalSnapshot {
        self.model
            .lock()
            .map(|model| ThermalSnapshot {
                average_celsius: model.average(),
                throttle_secs: model.throttle_secs(),
                overheated: model.is_overheated(),
            })
            .unwrap_or_default()
    }

    /// Cancel and join the sampler. Idempotent.
    pub fn stop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel_and_join();
        }
    }
}

impl Drop for ThermalGovernor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hardware::ScriptedProbe;

    fn model() -> ThermalModel {
        ThermalModel::new(ThermalConfig::default())
    }

    #[test]
    fn test_first_sample_never_adjusts() {
        let mut model = model();
        model.observe(85.0);
        assert!(model.throttle_secs().is_none());
    }

    #[test]
    fn test_rising_averages_compound_throttle() {
        let mut model = model();
        // Averages: 72, 74, 76, 78 -- rising and above 71.5 from the second on.
        model.observe(72.0);
        model.observe(76.0);
        assert_relative_eq!(model.throttle_secs().unwrap(), 0.1);
        model.observe(80.0);
        assert_relative_eq!(model.throttle_secs().unwrap(), 0.13);
        model.observe(78.0);
        assert_relative_eq!(model.throttle_secs().unwrap(), 0.169, epsilon = 1e-9);
    }

    #[test]
    fn test_falling_averages_release_throttle() {
        let mut model = model();
        model.observe(72.0);
        model.observe(76.0);
        model.observe(80.0);
        assert_relative_eq!(model.throttle_secs().unwrap(), 0.13);

        // Cold samples drag the average below 68.5 and keep it falling.
        for _ in 0..4 {
            model.observe(50.0);
        }
        assert!(model.throttle_secs().is_none());
    }

    #[test]
    fn test_stable_band_holds_throttle() {
        let mut model = model();
        model.observe(72.0);
        model.observe(76.0);
        assert_relative_eq!(model.throttle_secs().unwrap(), 0.1);

        // Averages easing into the 68.5..71.5 band adjust nothing.
        model.observe(70.0); // avg 72.67, falling but above the band
        model.observe(69.0); // avg 71.67, falling, above the band
        model.observe(70.0); // avg 69.67, falling, inside the band
        assert_relative_eq!(model.throttle_secs().unwrap(), 0.1);
    }

    #[test]
    fn test_overheat_latch_is_edge_triggered() {
        let mut model = model();
        model.observe(82.0);
        assert!(model.is_overheated());
        model.observe(84.0);
        assert!(model.is_overheated());
        // Average (82+84+60)/3 = 75.33: below max, latch clears.
        model.observe(60.0);
        assert!(!model.is_overheated());
    }

    #[test]
    fn test_cool_rig_never_throttles() {
        let mut model = model();
        for sample in [50.0, 51.0, 52.0, 53.0] {
            model.observe(sample);
        }
        assert!(model.throttle_secs().is_none());
        assert!(!model.is_overheated());
    }

    #[test]
    fn test_governor_throttle_returns_when_cool() {
        let config = ThermalConfig {
            check_interval_secs: 0.005,
            halt_poll_secs: 0.005,
            ..ThermalConfig::default()
        };
        let mut governor =
            ThermalGovernor::start(config, Box::new(ScriptedProbe::constant(45.0)));
        std::thread::sleep(Duration::from_millis(25));
        // Cool probe: no latch, no throttle; returns immediately.
        governor.throttle();
        let snapshot = governor.snapshot();
        assert!(!snapshot.overheated);
        assert!(snapshot.throttle_secs.is_none());
        governor.stop();
    }

    #[test]
    fn test_governor_halts_until_latch_clears() {
        let config = ThermalConfig {
            check_interval_secs: 0.005,
            halt_poll_secs: 0.002,
            moving_avg_window: 1,
            ..ThermalConfig::default()
        };
        // Hot for a few samples, then cold forever.
        let probe = ScriptedProbe::new([85.0, 85.0, 85.0, 85.0, 40.0]);
        let mut governor = ThermalGovernor::start(config, Box::new(probe));
        std::thread::sleep(Duration::from_millis(10));
        assert!(governor.snapshot().overheated);

        // Blocks across the hot samples, returns once the latch clears.
        governor.throttle();
        assert!(!governor.snapshot().overheated);
        governor.stop();
    }
}
