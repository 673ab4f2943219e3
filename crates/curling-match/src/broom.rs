use glam::Vec3;
use serde::{Deserialize, Serialize};

use curling_core::player::{PlayerColor, PlayerId};

/// Half-width of the strip the broom can be placed on.
pub const BROOM_X_RANGE: f32 = 2.28;
/// Depth of the strip the broom sits on, just short of the button.
pub const BROOM_Z: f32 = 17.3735;
/// How far the accuracy line swings either side of the broom.
pub const MOVING_LINE_RANGE: f32 = 1.43;
/// Swing speed of the accuracy line (metres per second).
pub const MOVING_LINE_SPEED: f32 = 5.0;
/// Smallest down-sheet component a normalized aim may have.
pub const MIN_FORWARD_AIM: f32 = 0.01;

/// Whether `aim` sends a stone toward the far end of the sheet.
pub fn aims_down_sheet(aim: Vec3) -> bool {
    Vec3::new(aim.x, 0.0, aim.z).normalize_or_zero().z > MIN_FORWARD_AIM
}

/// A player's aiming device: a target marker on the far end of the sheet
/// plus the swinging accuracy line used to capture the final aim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AimingBroom {
    owner: PlayerId,
    color: Option<PlayerColor>,
    position: Vec3,
    enabled: bool,
    line_offset: f32,
    line_direction: f32,
}

impl AimingBroom {
    pub fn new(owner: PlayerId) -> Self {
        Self {
            owner,
            color: None,
            position: Vec3::new(0.0, 0.0, BROOM_Z),
            enabled: false,
            line_offset: 0.0,
            line_direction: 1.0,
        }
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Colour of the owner, known once the match has started.
    pub fn color(&self) -> Option<PlayerColor> {
        self.color
    }

    pub fn set_color(&mut self, color: PlayerColor) {
        self.color = Some(color);
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn line_offset(&self) -> f32 {
        self.line_offset
    }

    /// Place the broom across the sheet at `x`, clamped to the strip.
    pub fn move_to(&mut self, x: f32) -> Vec3 {
        self.position = Vec3::new(x.clamp(-BROOM_X_RANGE, BROOM_X_RANGE), 0.0, BROOM_Z);
        self.position
    }

    /// Mirror a placement resolved by the master.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Swing the accuracy line back and forth while `swinging`; otherwise
    /// park it on the broom.
    pub fn update(&mut self, dt: f32, swinging: bool) {
        if !swinging {
            self.line_offset = 0.0;
            self.line_direction = 1.0;
            return;
        }
        self.line_offset += self.line_direction * MOVING_LINE_SPEED * dt;
        if self.line_offset >= MOVING_LINE_RANGE {
            self.line_offset = MOVING_LINE_RANGE;
            self.line_direction = -1.0;
        } else if self.line_offset <= -MOVING_LINE_RANGE {
            self.line_offset = -MOVING_LINE_RANGE;
            self.line_direction = 1.0;
        }
    }

    /// Planar unit vector from `spawn` to where the accuracy line currently is.
    pub fn aiming_vector(&self, spawn: Vec3) -> Vec3 {
        Vec3::new(
            self.position.x + self.line_offset - spawn.x,
            0.0,
            self.position.z - spawn.z,
        )
        .normalize_or(Vec3::Z)
    }
}
