//! Target selection and fire control.
//!
//! Consumes the per-frame detection partition and turns it into an aim
//! command: which way to move, whether firing is allowed, and what tilt
//! override (if any) arcs the spray onto the target. All timing decisions
//! take an explicit `now` so the interlocks are testable with fabricated
//! clocks.

use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::detect::Detection;
use crate::range::{AttackAngleTable, SizeCalibration};

/// One completed burst, appended when firing stops.
#[derive(Debug, Clone, Copy)]
pub struct FiringEvent {
    /// Wall-clock time the burst ended.
    pub at: SystemTime,
    pub duration: Duration,
}

/// Observability snapshot of the fire-control machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FireControlState {
    /// No frame processed yet.
    Idle,
    /// No target in view.
    Patrolling,
    /// Target in view, interlocks not all satisfied.
    Tracking,
    Firing,
    /// Burst limit hit; waiting out the cooldown window.
    Cooldown,
}

/// Aim command for the actuation controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackCommand {
    /// Pan delta, degrees. Positive pans toward the frame's left half.
    pub dx: f64,
    /// Tilt delta, degrees.
    pub dy: f64,
    pub fire: bool,
    /// Tilt override from the attack table, when the target is in range.
    pub attack_tilt: Option<f64>,
}

/// Per-frame tracker output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackReport {
    /// `None` when no target was selected this frame (caller patrols).
    pub command: Option<TrackCommand>,
    /// True on the frame firing started (clip trigger).
    pub fire_rising: bool,
}

impl TrackReport {
    fn idle() -> Self {
        Self {
            command: None,
            fire_rising: false,
        }
    }
}

/// Fire-permission state machine plus aim math.
pub struct TargetTracker {
    config: TrackerConfig,
    calibration: SizeCalibration,
    attack_table: AttackAngleTable,
    state: FireControlState,
    fire_started: Option<Instant>,
    cooldown_until: Option<Instant>,
    last_aversion: Option<Instant>,
    events: Vec<FiringEvent>,
    last_dx: f64,
    last_dy: f64,
}

impl TargetTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let calibration = SizeCalibration::from_config(&config);
        let attack_table = AttackAngleTable::from_config(&config);
        Self {
            config,
            calibration,
            attack_table,
            state: FireControlState::Idle,
            fire_started: None,
            cooldown_until: None,
            last_aversion: None,
            events: Vec::new(),
            last_dx: 0.0,
            last_dy: 0.0,
        }
    }

    /// Process one frame's target-class detections.
    ///
    /// `aversion_present` is the class-policy verdict for this frame; any
    /// sighting refreshes the suppression window regardless of targeting.
    pub fn process_frame(
        &mut self,
        targets: &[Detection],
        aversion_present: bool,
        frame_width: u32,
        frame_height: u32,
        now: Instant,
    ) -> TrackReport {
        if aversion_present {
            self.last_aversion = Some(now);
        }

        let Some(target) = Self::select_target(targets, frame_width, frame_height) else {
            self.end_burst(now);
            self.set_state(FireControlState::Patrolling);
            return TrackReport::idle();
        };

        let (dx, dy) = self.angular_offsets(target, frame_width, frame_height);
        self.last_dx = dx;
        self.last_dy = dy;

        let attack_tilt = self
            .calibration
            .estimate_distance(&target.bbox, frame_width, frame_height)
            .and_then(|distance| self.attack_table.lookup(distance));

        let permitted = self.permitted_to_fire(now);
        let on_target = self.on_target(target, dx, frame_height);
        let close_enough = attack_tilt.is_some();
        let fire = permitted && on_target && close_enough;

        let fire_rising = fire && self.fire_started.is_none();
        if fire_rising {
            self.fire_started = Some(now);
            info!(class = %target.class_name, dx, dy, "firing started");
        }
        if !fire {
            self.end_burst(now);
        }

        self.set_state(if fire {
            FireControlState::Firing
        } else if self.in_cooldown(now) {
            FireControlState::Cooldown
        } else {
            FireControlState::Tracking
        });

        debug!(
            class = %target.class_name,
            dx,
            dy,
            permitted,
            on_target,
            close_enough,
            suppressed = self.aversion_active(now),
            "aim assessment"
        );

        TrackReport {
            command: Some(TrackCommand {
                dx,
                dy,
                fire,
                attack_tilt,
            }),
            fire_rising,
        }
    }

    pub fn state(&self) -> FireControlState {
        self.state
    }

    /// Completed bursts, oldest first.
    pub fn firing_events(&self) -> &[FiringEvent] {
        &self.events
    }

    /// Aim offsets from the last frame with a target.
    pub fn last_offsets(&self) -> (f64, f64) {
        (self.last_dx, self.last_dy)
    }

    /// Nearest-to-center selection; ties fall to the earlier detection.
    fn select_target<'a>(
        targets: &'a [Detection],
        frame_width: u32,
        frame_height: u32,
    ) -> Option<&'a Detection> {
        let frame_cx = f64::from(frame_width) / 2.0;
        let frame_cy = f64::from(frame_height) / 2.0;
        targets.iter().min_by(|a, b| {
            let da = center_distance(a, frame_cx, frame_cy);
            let db = center_distance(b, frame_cx, frame_cy);
            da.total_cmp(&db)
        })
    }

    /// Pixel offsets to degrees. The half-FOV scaling plus the dampening
    /// factor were tuned on the rig to stop the mount hunting.
    fn angular_offsets(
        &self,
        target: &Detection,
        frame_width: u32,
        frame_height: u32,
    ) -> (f64, f64) {
        let (cx, cy) = target.bbox.center();
        let offset_x = f64::from(frame_width) / 2.0 - f64::from(cx);
        let offset_y = f64::from(frame_height) / 2.0 - f64::from(cy);
        let dx = self.config.dampen_factor * (offset_x / f64::from(frame_width))
            * (self.config.fov_horizontal / 2.0);
        let dy = self.config.dampen_factor * (offset_y / f64::from(frame_height))
            * (self.config.fov_vertical / 2.0);
        (dx, dy)
    }

    /// Safety interlocks: burst limit, cooldown window, aversion sighting.
    fn permitted_to_fire(&mut self, now: Instant) -> bool {
        if let Some(started) = self.fire_started {
            if now.duration_since(started) > self.config.max_fire_duration() {
                self.cooldown_until = Some(now + self.config.cool_down_duration());
                info!(
                    cool_down_secs = self.config.cool_down_secs,
                    "burst limit hit, cooldown armed"
                );
                return false;
            }
        }
        if self.in_cooldown(now) {
            return false;
        }
        !self.aversion_active(now)
    }

    /// Centered horizontally and close enough that the whole target is in
    /// frame (a lower edge above the vertical midline means the target is
    /// partially visible and too far to engage).
    fn on_target(&self, target: &Detection, dx: f64, frame_height: u32) -> bool {
        dx.abs() < self.config.dead_zone_deg
            && f64::from(target.bbox.lower_edge()) > f64::from(frame_height) / 2.0
    }

    fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    fn aversion_active(&self, now: Instant) -> bool {
        self.last_aversion
            .is_some_and(|seen| now.duration_since(seen) < self.config.aversion_timeout())
    }

    /// Close out an in-flight burst, if one is open.
    fn end_burst(&mut self, now: Instant) {
        let Some(started) = self.fire_started.take() else {
            return;
        };
        let duration = now.duration_since(started);
        self.events.push(FiringEvent {
            at: SystemTime::now(),
            duration,
        });
        info!(duration_secs = duration.as_secs_f64(), "firing stopped");
    }

    fn set_state(&mut self, next: FireControlState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "fire control transition");
            self.state = next;
        }
    }
}

fn center_distance(detection: &Detection, frame_cx: f64, frame_cy: f64) -> f64 {
    let (cx, cy) = detection.bbox.center();
    (f64::from(cx) - frame_cx).hypot(f64::from(cy) - frame_cy)
}
