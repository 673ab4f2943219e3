use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use curling_core::math::{heading_degrees, map_to_range};
use curling_core::player::PlayerColor;
use curling_core::state::StoneState;

use crate::config::StoneTuning;
use crate::physics::RigidBody;
use crate::sheet::Sheet;

/// Handle yaw, in degrees, a stone settles at in the hack for its spin.
const HANDLE_ANGLE_DEGREES: f32 = 45.0;

/// Fixed calibration from power-meter fill (0..1) to delivery speed (m/s).
pub fn shot_velocity(power: f32) -> f32 {
    1.36579 * power + 1.72579
}

/// Raised by [`CurlingStone::fixed_update`] for the match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoneSignal {
    /// The delivery push ended at the close hog line. Raised once per stone.
    CrossedCloseHogLine,
}

/// One stone's physical and lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurlingStone {
    pub color: PlayerColor,
    state: StoneState,
    pub body: RigidBody,
    spin_clockwise: bool,
    shot_velocity: f32,
    aim: Vec3,
    has_been_spun: bool,
    crossed_close_hog: bool,
    curling_factor: f32,
    above_sweep_threshold: bool,
    being_swept: bool,
    look_rotation_y: f32,
    dissolve_elapsed: f32,
    tuning: StoneTuning,
}

impl CurlingStone {
    pub fn new(color: PlayerColor, position: Vec3, rotation: Quat, tuning: &StoneTuning) -> Self {
        Self {
            color,
            state: StoneState::InHack,
            body: RigidBody::new(position, rotation, tuning),
            spin_clockwise: true,
            shot_velocity: 0.0,
            aim: Vec3::Z,
            has_been_spun: false,
            crossed_close_hog: false,
            curling_factor: tuning.default_curling_factor,
            above_sweep_threshold: false,
            being_swept: false,
            look_rotation_y: 0.0,
            dissolve_elapsed: 0.0,
            tuning: *tuning,
        }
    }

    pub fn state(&self) -> StoneState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.body.position
    }

    pub fn rotation(&self) -> Quat {
        self.body.rotation
    }

    pub fn spin_clockwise(&self) -> bool {
        self.spin_clockwise
    }

    pub fn curling_factor(&self) -> f32 {
        self.curling_factor
    }

    pub fn is_being_swept(&self) -> bool {
        self.being_swept
    }

    pub fn is_above_sweep_threshold(&self) -> bool {
        self.above_sweep_threshold
    }

    /// Heading of travel in degrees; where a sweeping broom is drawn.
    pub fn look_rotation_y(&self) -> f32 {
        self.look_rotation_y
    }

    /// Fade progress in `[0, 1]` while dissolving.
    pub fn dissolve_progress(&self) -> f32 {
        map_to_range(self.dissolve_elapsed, 0.0, self.tuning.dissolve_secs, 0.0, 1.0)
    }

    /// Move to `next` if that is forward in the lifecycle. Returns whether it moved.
    pub fn advance_state(&mut self, next: StoneState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        match next {
            StoneState::Dissolving => self.begin_dissolve(),
            StoneState::OutOfBounds => {
                self.begin_dissolve();
                self.state = StoneState::OutOfBounds;
            },
            _ => self.state = next,
        }
        true
    }

    pub fn set_spin_clockwise(&mut self, clockwise: bool) {
        self.spin_clockwise = clockwise;
    }

    /// Release the stone from the hack toward `aim` with the given meter power.
    pub fn shoot(&mut self, power: f32, aim: Vec3) -> bool {
        if self.state != StoneState::InHack {
            return false;
        }
        self.state = StoneState::InMotion;
        self.shot_velocity = shot_velocity(power);
        self.aim = Vec3::new(aim.x, 0.0, aim.z).normalize_or(Vec3::Z);
        true
    }

    pub fn can_be_swept(&self, sweeper: PlayerColor) -> bool {
        self.color == sweeper && self.state.is_in_play() && self.above_sweep_threshold
    }

    pub fn start_sweeping(&mut self, sweeper: PlayerColor) -> bool {
        if !self.can_be_swept(sweeper) {
            return false;
        }
        self.set_swept(true);
        true
    }

    pub fn stop_sweeping(&mut self) {
        self.set_swept(false);
    }

    /// Mirror a sweep decision made elsewhere.
    pub fn set_swept(&mut self, swept: bool) {
        self.being_swept = swept;
        self.body.ice_friction = if swept {
            self.tuning.sweeping_friction
        } else {
            self.tuning.default_friction
        };
    }

    /// Drive the stone for one physics step. Runs on the master only, before
    /// the physics world is stepped.
    pub fn fixed_update(&mut self, dt: f32, sheet: &Sheet) -> Option<StoneSignal> {
        let mut signal = None;

        if self.state == StoneState::InMotion {
            let z = self.body.position.z;
            if !sheet.past_close_hog_line(self.body.position) {
                self.body.velocity = self.aim * self.shot_velocity;
            }
            if let Some(progress) = sheet.handle_spin_progress(z) {
                let degrees = progress * HANDLE_ANGLE_DEGREES;
                self.body.rotation = handle_rotation(self.spin_clockwise, degrees);
            }
            if sheet.past_close_hog_line(self.body.position) {
                if !self.has_been_spun {
                    self.has_been_spun = true;
                    let direction = if self.spin_clockwise { 1.0 } else { -1.0 };
                    self.body
                        .add_torque(Vec3::new(0.0, self.tuning.spin_torque * direction, 0.0));
                }
                if !self.crossed_close_hog {
                    self.crossed_close_hog = true;
                    signal = Some(StoneSignal::CrossedCloseHogLine);
                }
            }

            self.curling_factor = if self.being_swept {
                (self.curling_factor - self.tuning.curl_decay_per_sec * dt)
                    .max(self.tuning.min_curling_factor)
            } else {
                (self.curling_factor + self.tuning.curl_recovery_per_sec * dt)
                    .min(self.tuning.default_curling_factor)
            };
            let side = if self.spin_clockwise { Vec3::X } else { Vec3::NEG_X };
            self.body.add_force(side * (self.curling_factor * dt));
        }

        let speed = self.body.speed();
        self.body.angular_drag = if speed < self.tuning.angular_drag_threshold {
            self.tuning.increased_angular_drag
        } else {
            self.tuning.default_angular_drag
        };

        self.above_sweep_threshold = speed > self.tuning.sweeping_threshold;
        if self.above_sweep_threshold {
            self.look_rotation_y = heading_degrees(self.body.velocity);
        }

        signal
    }

    /// Whether the stone still counts as moving. Past the close hog line a
    /// stopped stone either comes to rest (beyond the far hog line) or is
    /// removed from play (short of it). Runs on the master only.
    pub fn check_if_moving(&mut self, sheet: &Sheet) -> bool {
        if !self.state.is_in_play() {
            return false;
        }
        if !sheet.past_close_hog_line(self.body.position) {
            return true;
        }
        if self.body.speed() >= self.tuning.moving_threshold {
            return true;
        }
        if sheet.short_of_far_hog_line(self.body.position) {
            self.dissolve();
        } else if self.state == StoneState::InMotion {
            self.state = StoneState::AtRest;
        }
        false
    }

    /// Per-frame presentation update, run on every participant against the
    /// pose it displays. Returns true on the frame the stone is found out of
    /// bounds and starts dissolving.
    pub fn update(&mut self, dt: f32, sheet: &Sheet) -> bool {
        match self.state {
            StoneState::InHack => {
                let target = handle_rotation(self.spin_clockwise, HANDLE_ANGLE_DEGREES);
                let t = (dt * self.tuning.handle_ease_rate).clamp(0.0, 1.0);
                self.body.rotation = self.body.rotation.slerp(target, t);
            },
            StoneState::Dissolving => {
                self.dissolve_elapsed += dt;
                if self.dissolve_progress() >= 1.0 {
                    self.state = StoneState::OutOfBounds;
                }
            },
            _ => {},
        }

        if sheet.is_out_of_bounds(self.body.position) && self.state.is_in_play() {
            self.dissolve();
            return true;
        }
        false
    }

    /// Take the stone out of play. It fades for `dissolve_secs`, then is inert.
    pub fn dissolve(&mut self) {
        if self.state.can_advance_to(StoneState::Dissolving) {
            self.begin_dissolve();
        }
    }

    fn begin_dissolve(&mut self) {
        self.state = StoneState::Dissolving;
        self.dissolve_elapsed = 0.0;
        self.body.kinematic = true;
        self.body.stop();
        self.set_swept(false);
        self.above_sweep_threshold = false;
    }

    /// Display a pose computed elsewhere (snapshot playback on remotes).
    pub fn apply_pose(&mut self, position: Vec3, rotation: Quat) {
        self.body.position = position;
        self.body.rotation = rotation;
    }

    /// Mirror motion flags carried alongside a snapshot.
    pub fn apply_motion_flags(&mut self, look_rotation_y: f32, above_sweep_threshold: bool) {
        self.look_rotation_y = look_rotation_y;
        self.above_sweep_threshold = above_sweep_threshold;
    }

    /// Put the stone down at `position`, at rest. Debug shortcut.
    pub fn place_for_testing(&mut self, position: Vec3) {
        self.body.position = position;
        self.body.stop();
        self.state = StoneState::AtRest;
    }
}

fn handle_rotation(clockwise: bool, degrees: f32) -> Quat {
    let yaw = if clockwise { -degrees } else { degrees };
    Quat::from_rotation_y(yaw.to_radians())
}
