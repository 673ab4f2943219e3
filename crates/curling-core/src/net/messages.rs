use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::player::{PlayerColor, PlayerId};
use crate::state::{GameState, StoneState};

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Participant -> Master
    Command = 0x01,

    // Master -> All (match state)
    AssignColors = 0x10,
    SetGameState = 0x11,
    SetCurrentPlayer = 0x12,
    SetStoneIndex = 0x13,
    SetEndNumberAndHammer = 0x14,
    SetCurlDirection = 0x15,
    SetEndScore = 0x16,
    SetPlayersReady = 0x17,
    SetMatchComplete = 0x18,
    SetBroom = 0x19,
    SetAim = 0x1A,

    // Master -> All (stones)
    SpawnStone = 0x20,
    SetStoneSpin = 0x21,
    ShootStone = 0x22,
    SetStoneState = 0x23,
    SetSweeping = 0x24,
    DestroyStones = 0x25,
    PlaceStone = 0x26,

    // Master -> All (unreliable motion)
    StoneSnapshot = 0x30,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Command),
            0x10 => Some(Self::AssignColors),
            0x11 => Some(Self::SetGameState),
            0x12 => Some(Self::SetCurrentPlayer),
            0x13 => Some(Self::SetStoneIndex),
            0x14 => Some(Self::SetEndNumberAndHammer),
            0x15 => Some(Self::SetCurlDirection),
            0x16 => Some(Self::SetEndScore),
            0x17 => Some(Self::SetPlayersReady),
            0x18 => Some(Self::SetMatchComplete),
            0x19 => Some(Self::SetBroom),
            0x1A => Some(Self::SetAim),
            0x20 => Some(Self::SpawnStone),
            0x21 => Some(Self::SetStoneSpin),
            0x22 => Some(Self::ShootStone),
            0x23 => Some(Self::SetStoneState),
            0x24 => Some(Self::SetSweeping),
            0x25 => Some(Self::DestroyStones),
            0x26 => Some(Self::PlaceStone),
            0x30 => Some(Self::StoneSnapshot),
            _ => None,
        }
    }
}

/// A decision a seated player asks the master to carry out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerAction {
    DismissTurnDialog,
    PlaceBroom { position: Vec3 },
    SetAim { aim: Vec3 },
    Shoot { power: f32 },
    SetCurlDirection { clockwise: bool },
    StartSweeping { stone_index: usize },
    StopSweeping,
    ReadyForNextEnd,
}

// ---------------------------------------------------------------------------
// Participant -> Master
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMsg {
    pub player_id: PlayerId,
    pub action: PlayerAction,
}

// ---------------------------------------------------------------------------
// Master -> All
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignColorsMsg {
    pub red_player: PlayerId,
    pub blue_player: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetGameStateMsg {
    pub state: GameState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCurrentPlayerMsg {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStoneIndexMsg {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEndNumberAndHammerMsg {
    pub end: usize,
    pub hammer: PlayerColor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCurlDirectionMsg {
    pub clockwise: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEndScoreMsg {
    pub end: usize,
    pub red_points: u32,
    pub blue_points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPlayersReadyMsg {
    pub red_ready: bool,
    pub blue_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMatchCompleteMsg {
    pub red_total: u32,
    pub blue_total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBroomMsg {
    pub owner: PlayerId,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAimMsg {
    pub aim: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnStoneMsg {
    pub index: usize,
    pub color: PlayerColor,
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStoneSpinMsg {
    pub index: usize,
    pub clockwise: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShootStoneMsg {
    pub index: usize,
    pub power: f32,
    pub aim: Vec3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStoneStateMsg {
    pub index: usize,
    pub state: StoneState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSweepingMsg {
    pub index: usize,
    pub swept: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyStonesMsg {
    /// End whose stones are being cleared.
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceStoneMsg {
    pub index: usize,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoneSnapshotMsg {
    pub index: usize,
    /// Master clock at send time, in seconds.
    pub remote_time: f64,
    pub position: Vec3,
    pub rotation: Quat,
    pub look_rotation_y: f32,
    pub above_sweep_threshold: bool,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Every message exchanged between match participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchMessage {
    Command(CommandMsg),
    AssignColors(AssignColorsMsg),
    SetGameState(SetGameStateMsg),
    SetCurrentPlayer(SetCurrentPlayerMsg),
    SetStoneIndex(SetStoneIndexMsg),
    SetEndNumberAndHammer(SetEndNumberAndHammerMsg),
    SetCurlDirection(SetCurlDirectionMsg),
    SetEndScore(SetEndScoreMsg),
    SetPlayersReady(SetPlayersReadyMsg),
    SetMatchComplete(SetMatchCompleteMsg),
    SetBroom(SetBroomMsg),
    SetAim(SetAimMsg),
    SpawnStone(SpawnStoneMsg),
    SetStoneSpin(SetStoneSpinMsg),
    ShootStone(ShootStoneMsg),
    SetStoneState(SetStoneStateMsg),
    SetSweeping(SetSweepingMsg),
    DestroyStones(DestroyStonesMsg),
    PlaceStone(PlaceStoneMsg),
    StoneSnapshot(StoneSnapshotMsg),
}

impl MatchMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Command(_) => MessageType::Command,
            Self::AssignColors(_) => MessageType::AssignColors,
            Self::SetGameState(_) => MessageType::SetGameState,
            Self::SetCurrentPlayer(_) => MessageType::SetCurrentPlayer,
            Self::SetStoneIndex(_) => MessageType::SetStoneIndex,
            Self::SetEndNumberAndHammer(_) => MessageType::SetEndNumberAndHammer,
            Self::SetCurlDirection(_) => MessageType::SetCurlDirection,
            Self::SetEndScore(_) => MessageType::SetEndScore,
            Self::SetPlayersReady(_) => MessageType::SetPlayersReady,
            Self::SetMatchComplete(_) => MessageType::SetMatchComplete,
            Self::SetBroom(_) => MessageType::SetBroom,
            Self::SetAim(_) => MessageType::SetAim,
            Self::SpawnStone(_) => MessageType::SpawnStone,
            Self::SetStoneSpin(_) => MessageType::SetStoneSpin,
            Self::ShootStone(_) => MessageType::ShootStone,
            Self::SetStoneState(_) => MessageType::SetStoneState,
            Self::SetSweeping(_) => MessageType::SetSweeping,
            Self::DestroyStones(_) => MessageType::DestroyStones,
            Self::PlaceStone(_) => MessageType::PlaceStone,
            Self::StoneSnapshot(_) => MessageType::StoneSnapshot,
        }
    }

    /// Snapshots may be dropped in transit; everything else must arrive in order.
    pub fn is_reliable(&self) -> bool {
        !matches!(self, Self::StoneSnapshot(_))
    }
}
