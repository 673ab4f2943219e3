use serde::{Deserialize, Serialize};

use super::messages::{
    AssignColorsMsg, CommandMsg, DestroyStonesMsg, MatchMessage, MessageType, PlaceStoneMsg,
    SetAimMsg, SetBroomMsg, SetCurlDirectionMsg, SetCurrentPlayerMsg, SetEndNumberAndHammerMsg,
    SetEndScoreMsg, SetGameStateMsg, SetMatchCompleteMsg, SetPlayersReadyMsg, SetStoneIndexMsg,
    SetStoneSpinMsg, SetStoneStateMsg, SetSweepingMsg, ShootStoneMsg, SpawnStoneMsg,
    StoneSnapshotMsg,
};

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
    ChannelClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
            Self::ChannelClosed => write!(f, "transport channel closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `MatchMessage` to wire format.
pub fn encode_match_message(msg: &MatchMessage) -> Result<Vec<u8>, ProtocolError> {
    let ty = msg.message_type();
    match msg {
        MatchMessage::Command(m) => encode_message(ty, m),
        MatchMessage::AssignColors(m) => encode_message(ty, m),
        MatchMessage::SetGameState(m) => encode_message(ty, m),
        MatchMessage::SetCurrentPlayer(m) => encode_message(ty, m),
        MatchMessage::SetStoneIndex(m) => encode_message(ty, m),
        MatchMessage::SetEndNumberAndHammer(m) => encode_message(ty, m),
        MatchMessage::SetCurlDirection(m) => encode_message(ty, m),
        MatchMessage::SetEndScore(m) => encode_message(ty, m),
        MatchMessage::SetPlayersReady(m) => encode_message(ty, m),
        MatchMessage::SetMatchComplete(m) => encode_message(ty, m),
        MatchMessage::SetBroom(m) => encode_message(ty, m),
        MatchMessage::SetAim(m) => encode_message(ty, m),
        MatchMessage::SpawnStone(m) => encode_message(ty, m),
        MatchMessage::SetStoneSpin(m) => encode_message(ty, m),
        MatchMessage::ShootStone(m) => encode_message(ty, m),
        MatchMessage::SetStoneState(m) => encode_message(ty, m),
        MatchMessage::SetSweeping(m) => encode_message(ty, m),
        MatchMessage::DestroyStones(m) => encode_message(ty, m),
        MatchMessage::PlaceStone(m) => encode_message(ty, m),
        MatchMessage::StoneSnapshot(m) => encode_message(ty, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::EmptyMessage);
    };
    MessageType::from_byte(first).ok_or(ProtocolError::UnknownMessageType(first))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `MatchMessage`.
pub fn decode_match_message(data: &[u8]) -> Result<MatchMessage, ProtocolError> {
    let msg = match decode_message_type(data)? {
        MessageType::Command => MatchMessage::Command(decode_payload::<CommandMsg>(data)?),
        MessageType::AssignColors => {
            MatchMessage::AssignColors(decode_payload::<AssignColorsMsg>(data)?)
        },
        MessageType::SetGameState => {
            MatchMessage::SetGameState(decode_payload::<SetGameStateMsg>(data)?)
        },
        MessageType::SetCurrentPlayer => {
            MatchMessage::SetCurrentPlayer(decode_payload::<SetCurrentPlayerMsg>(data)?)
        },
        MessageType::SetStoneIndex => {
            MatchMessage::SetStoneIndex(decode_payload::<SetStoneIndexMsg>(data)?)
        },
        MessageType::SetEndNumberAndHammer => MatchMessage::SetEndNumberAndHammer(
            decode_payload::<SetEndNumberAndHammerMsg>(data)?,
        ),
        MessageType::SetCurlDirection => {
            MatchMessage::SetCurlDirection(decode_payload::<SetCurlDirectionMsg>(data)?)
        },
        MessageType::SetEndScore => {
            MatchMessage::SetEndScore(decode_payload::<SetEndScoreMsg>(data)?)
        },
        MessageType::SetPlayersReady => {
            MatchMessage::SetPlayersReady(decode_payload::<SetPlayersReadyMsg>(data)?)
        },
        MessageType::SetMatchComplete => {
            MatchMessage::SetMatchComplete(decode_payload::<SetMatchCompleteMsg>(data)?)
        },
        MessageType::SetBroom => MatchMessage::SetBroom(decode_payload::<SetBroomMsg>(data)?),
        MessageType::SetAim => MatchMessage::SetAim(decode_payload::<SetAimMsg>(data)?),
        MessageType::SpawnStone => {
            MatchMessage::SpawnStone(decode_payload::<SpawnStoneMsg>(data)?)
        },
        MessageType::SetStoneSpin => {
            MatchMessage::SetStoneSpin(decode_payload::<SetStoneSpinMsg>(data)?)
        },
        MessageType::ShootStone => {
            MatchMessage::ShootStone(decode_payload::<ShootStoneMsg>(data)?)
        },
        MessageType::SetStoneState => {
            MatchMessage::SetStoneState(decode_payload::<SetStoneStateMsg>(data)?)
        },
        MessageType::SetSweeping => {
            MatchMessage::SetSweeping(decode_payload::<SetSweepingMsg>(data)?)
        },
        MessageType::DestroyStones => {
            MatchMessage::DestroyStones(decode_payload::<DestroyStonesMsg>(data)?)
        },
        MessageType::PlaceStone => {
            MatchMessage::PlaceStone(decode_payload::<PlaceStoneMsg>(data)?)
        },
        MessageType::StoneSnapshot => {
            MatchMessage::StoneSnapshot(decode_payload::<StoneSnapshotMsg>(data)?)
        },
    };
    Ok(msg)
}
