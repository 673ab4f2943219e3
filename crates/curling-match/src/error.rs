use curling_core::net::protocol::ProtocolError;
use curling_core::player::PlayerId;
use curling_core::state::GameState;

/// Why a match operation was refused. A refused operation changes nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// Master-only operation invoked on a mirroring participant.
    NotAuthoritative,
    /// The player is not seated at this participant.
    NotLocalActor(PlayerId),
    NotYourTurn {
        player_id: PlayerId,
        current: Option<PlayerId>,
    },
    WrongState {
        expected: GameState,
        actual: GameState,
    },
    /// Both seats are already taken.
    PlayersFull,
    UnknownPlayer(PlayerId),
    /// A broom was registered for a player who never joined.
    UnknownBroomOwner(PlayerId),
    NotSweepable {
        stone_index: usize,
        sweeper: PlayerId,
    },
    NoSuchStone(usize),
    /// The aim does not point toward the far end of the sheet.
    AimNotDownSheet,
    MatchOver,
    Protocol(ProtocolError),
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAuthoritative => write!(f, "operation requires the session master"),
            Self::NotLocalActor(id) => write!(f, "player {id} is not seated here"),
            Self::NotYourTurn { player_id, current } => match current {
                Some(current) => write!(f, "player {player_id} acted on player {current}'s turn"),
                None => write!(f, "player {player_id} acted before the match started"),
            },
            Self::WrongState { expected, actual } => {
                write!(f, "expected state {expected:?}, match is in {actual:?}")
            },
            Self::PlayersFull => write!(f, "both players are already registered"),
            Self::UnknownPlayer(id) => write!(f, "unknown player {id}"),
            Self::UnknownBroomOwner(id) => write!(f, "broom owner {id} is not a registered player"),
            Self::NotSweepable {
                stone_index,
                sweeper,
            } => write!(f, "stone {stone_index} cannot be swept by player {sweeper}"),
            Self::NoSuchStone(index) => write!(f, "no stone at index {index}"),
            Self::AimNotDownSheet => write!(f, "aim must point down the sheet"),
            Self::MatchOver => write!(f, "the match is over"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for MatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for MatchError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offender() {
        let e = MatchError::NotYourTurn {
            player_id: 2,
            current: Some(1),
        };
        assert!(e.to_string().contains('2'));
        assert!(e.to_string().contains('1'));
        assert!(
            MatchError::NotSweepable {
                stone_index: 4,
                sweeper: 9
            }
            .to_string()
            .contains("stone 4")
        );
    }

    #[test]
    fn protocol_errors_convert_and_chain() {
        use std::error::Error;
        let e: MatchError = ProtocolError::EmptyMessage.into();
        assert!(matches!(e, MatchError::Protocol(_)));
        assert!(e.source().is_some());
        assert!(MatchError::MatchOver.source().is_none());
    }
}
