use serde::{Deserialize, Serialize};

use curling_core::net::snapshot::SnapshotConfig;

use crate::sheet::Sheet;

/// Turn pacing and session-level switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Grace period after every stone has stopped, before the next shot (seconds).
    pub next_shot_delay_secs: f32,
    /// Grace period after both players are ready, before the next end (seconds).
    pub next_end_delay_secs: f32,
    /// Physics step (seconds).
    pub fixed_timestep: f32,
    /// Shuffle colours (and so who throws first) at match start.
    pub randomize_colors: bool,
    /// Seed for the colour shuffle. Unset means OS entropy.
    pub color_seed: Option<u64>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            next_shot_delay_secs: 3.0,
            next_end_delay_secs: 2.0,
            fixed_timestep: 0.02,
            randomize_colors: false,
            color_seed: None,
        }
    }
}

/// Physical tuning of a stone and its contact with the ice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoneTuning {
    /// Curl strength when not swept.
    pub default_curling_factor: f32,
    /// Floor the curling factor decays toward while swept.
    pub min_curling_factor: f32,
    /// Curling factor lost per second while swept.
    pub curl_decay_per_sec: f32,
    /// Curling factor regained per second while not swept.
    pub curl_recovery_per_sec: f32,
    /// Ice friction coefficient.
    pub default_friction: f32,
    /// Ice friction coefficient under a sweeping broom.
    pub sweeping_friction: f32,
    /// Friction coefficient of the stone's running band; combined with the ice by averaging.
    pub stone_friction: f32,
    /// Yaw torque imparted once at the close hog line (N·m).
    pub spin_torque: f32,
    /// Below this speed the stone uses the increased angular drag.
    pub angular_drag_threshold: f32,
    pub default_angular_drag: f32,
    pub increased_angular_drag: f32,
    /// Minimum speed at which a stone can be swept.
    pub sweeping_threshold: f32,
    /// Below this speed a stone past the close hog line has stopped.
    pub moving_threshold: f32,
    /// Length of the fade when a stone leaves play (seconds).
    pub dissolve_secs: f32,
    /// Rate at which the handle eases toward its spin angle in the hack (1/s).
    pub handle_ease_rate: f32,
    pub mass: f32,
    pub radius: f32,
    /// Coefficient of restitution for stone-on-stone hits.
    pub restitution: f32,
}

impl Default for StoneTuning {
    fn default() -> Self {
        Self {
            default_curling_factor: 10.0,
            min_curling_factor: 5.0,
            curl_decay_per_sec: 5.0,
            curl_recovery_per_sec: 10.0,
            default_friction: 0.005,
            sweeping_friction: 0.00465,
            stone_friction: 0.015,
            spin_torque: 10.0,
            angular_drag_threshold: 0.1,
            default_angular_drag: 0.05,
            increased_angular_drag: 1.0,
            sweeping_threshold: 0.005,
            moving_threshold: 0.001,
            dissolve_secs: 2.0,
            handle_ease_rate: 10.0,
            mass: 19.96,
            radius: 0.1397,
            restitution: 0.85,
        }
    }
}

/// Everything a match needs to know up front.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub rules: RulesConfig,
    pub sheet: Sheet,
    pub stone: StoneTuning,
    pub sync: SnapshotConfig,
}

impl MatchConfig {
    /// Load config from environment or TOML file, falling back to defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("CURLING_MATCH_CONFIG")
            && let Some(config) = Self::from_file(&path)
        {
            return config;
        }
        if let Some(config) = Self::from_file("config/curling.toml") {
            return config;
        }
        Self::default()
    }

    /// Replace values a match cannot run with by their defaults, logging each.
    pub fn validate(&mut self) {
        let defaults = Self::default();
        if self.stone.dissolve_secs.is_nan() || self.stone.dissolve_secs <= 0.0 {
            tracing::warn!(
                dissolve_secs = self.stone.dissolve_secs,
                "stone.dissolve_secs must be positive, using default"
            );
            self.stone.dissolve_secs = defaults.stone.dissolve_secs;
        }
        if self.rules.fixed_timestep.is_nan() || self.rules.fixed_timestep <= 0.0 {
            tracing::warn!(
                fixed_timestep = self.rules.fixed_timestep,
                "rules.fixed_timestep must be positive, using default"
            );
            self.rules.fixed_timestep = defaults.rules.fixed_timestep;
        }
    }

    fn from_file(path: &str) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                Some(config)
            },
            Err(e) => {
                tracing::warn!(path, error = %e, "Ignoring malformed match config");
                None
            },
        }
    }
}
