use crate::net::messages::MatchMessage;
use crate::net::protocol::ProtocolError;
use crate::player::PlayerId;

/// Who may decide what in this participant's copy of the match, and how its
/// decisions reach the others.
///
/// Exactly one participant per session is authoritative (the master). Only it
/// runs physics, timers and state advancement; everyone else mirrors what it
/// broadcasts.
pub trait Authority: Send {
    /// This participant is the session master.
    fn is_authoritative(&self) -> bool;

    /// `player_id` is seated at this participant (their input originates here).
    fn is_owned_by_local_actor(&self, player_id: PlayerId) -> bool;

    /// Master only: send a resolved state change to every other participant.
    fn broadcast(&mut self, msg: &MatchMessage) -> Result<(), ProtocolError>;

    /// Forward a command to the master for validation and execution.
    fn send_to_master(&mut self, msg: &MatchMessage) -> Result<(), ProtocolError>;
}

/// Single-process session: this participant is the master, seats every
/// player, and has nobody to talk to.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAuthority;

impl Authority for LocalAuthority {
    fn is_authoritative(&self) -> bool {
        true
    }

    fn is_owned_by_local_actor(&self, _player_id: PlayerId) -> bool {
        true
    }

    fn broadcast(&mut self, _msg: &MatchMessage) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn send_to_master(&mut self, _msg: &MatchMessage) -> Result<(), ProtocolError> {
        Ok(())
    }
}
