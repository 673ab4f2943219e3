use glam::Vec3;
use serde::{Deserialize, Serialize};

use curling_core::math::planar_distance;

/// Scoring target at the far end of the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct House {
    pub center: Vec3,
    /// House radius plus one stone radius (12 ft circle, 5.5 in). A stone
    /// whose centre is this close or closer counts.
    pub max_scoring_distance: f32,
}

impl Default for House {
    fn default() -> Self {
        Self {
            center: Vec3::new(0.0, 0.0, 17.375),
            max_scoring_distance: 1.9685,
        }
    }
}

impl House {
    pub fn distance_to_center(&self, position: Vec3) -> f32 {
        planar_distance(self.center, position)
    }

    pub fn contains(&self, position: Vec3) -> bool {
        self.distance_to_center(position) <= self.max_scoring_distance
    }
}

/// Lines and limits of the sheet, in metres. Play runs toward +Z with the
/// centre line at x = 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sheet {
    /// Where stones spawn for delivery.
    pub hack_position: Vec3,
    /// The handle starts unwinding here during delivery.
    pub start_handle_spin_z: f32,
    /// Delivery push ends and spin is imparted here.
    pub close_hog_line_z: f32,
    /// A stopped stone must be past this line to stay in play.
    pub far_hog_line_z: f32,
    /// Beyond this a stone is out of play.
    pub far_back_line_z: f32,
    /// Side boundary, symmetric about the centre line.
    pub x_limit: f32,
    pub house: House,
}

impl Default for Sheet {
    fn default() -> Self {
        Self {
            hack_position: Vec3::new(0.0, 0.0, -21.03),
            start_handle_spin_z: -14.138_38,
            close_hog_line_z: -11.1239,
            far_hog_line_z: 11.124,
            far_back_line_z: 19.389,
            x_limit: 2.2,
            house: House::default(),
        }
    }
}

impl Sheet {
    pub fn is_out_of_bounds(&self, position: Vec3) -> bool {
        position.z > self.far_back_line_z
            || position.x < -self.x_limit
            || position.x > self.x_limit
    }

    pub fn past_close_hog_line(&self, position: Vec3) -> bool {
        position.z > self.close_hog_line_z
    }

    pub fn short_of_far_hog_line(&self, position: Vec3) -> bool {
        position.z < self.far_hog_line_z
    }

    /// Fraction of the handle wind-down completed, `None` outside the zone
    /// between the handle-spin line and the close hog line.
    pub fn handle_spin_progress(&self, z: f32) -> Option<f32> {
        if z > self.start_handle_spin_z && z < self.close_hog_line_z {
            Some((self.close_hog_line_z - z) / (self.close_hog_line_z - self.start_handle_spin_z))
        } else {
            None
        }
    }
}
