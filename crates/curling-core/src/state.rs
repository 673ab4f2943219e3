use serde::{Deserialize, Serialize};

/// Number of ends played in a full match.
pub const NUM_ENDS_IN_MATCH: usize = 8;
/// Stones delivered per end (eight per team).
pub const NUM_STONES_IN_END: usize = 16;

/// Phase of the match. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    #[default]
    WaitingForPlayers,
    YourTurnDialogActive,
    PlacingBroom,
    AccuracyMeterActive,
    ShootingMeterActive,
    DeliveringStone,
    WaitingForStonesToStop,
    EndOfEnd,
}

impl GameState {
    /// States in which the shooter may still change the curl direction.
    pub fn is_pre_delivery(self) -> bool {
        matches!(
            self,
            Self::YourTurnDialogActive
                | Self::PlacingBroom
                | Self::AccuracyMeterActive
                | Self::ShootingMeterActive
        )
    }
}

/// Lifecycle of a single stone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoneState {
    /// Sitting in the hack, waiting for aim and power.
    #[default]
    InHack,
    /// Being delivered or still sliding.
    InMotion,
    /// In play and no longer moving.
    AtRest,
    /// Leaving play; the fade animation is running.
    Dissolving,
    /// Out of play for the rest of the end.
    OutOfBounds,
}

impl StoneState {
    pub const fn rank(self) -> u8 {
        match self {
            Self::InHack => 0,
            Self::InMotion => 1,
            Self::AtRest => 2,
            Self::Dissolving => 3,
            Self::OutOfBounds => 4,
        }
    }

    /// Stone states only ever move forward.
    pub const fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }

    /// Whether the stone still takes part in play (physics, sweeping, scoring).
    pub const fn is_in_play(self) -> bool {
        !matches!(self, Self::Dissolving | Self::OutOfBounds)
    }
}
