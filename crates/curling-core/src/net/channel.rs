use tokio::sync::mpsc;

use super::messages::MatchMessage;
use super::protocol::{ProtocolError, encode_match_message};
use crate::authority::Authority;
use crate::player::PlayerId;

/// Where an outbound message is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Every other participant.
    All,
    /// The session master.
    Master,
}

/// An encoded message waiting for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub route: Route,
    /// False for messages the link may drop (snapshots).
    pub reliable: bool,
    pub bytes: Vec<u8>,
}

/// Authority backed by a tokio channel. Messages are encoded with the wire
/// codec and queued for whatever task owns the receiving end.
#[derive(Debug)]
pub struct ChannelAuthority {
    is_master: bool,
    local_players: Vec<PlayerId>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelAuthority {
    pub fn new(is_master: bool, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            is_master,
            local_players: Vec::new(),
            tx,
        }
    }

    /// Convenience constructor returning the receiving end as well.
    pub fn channel(is_master: bool) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(is_master, tx), rx)
    }

    pub fn with_local_player(mut self, player_id: PlayerId) -> Self {
        self.seat_local_player(player_id);
        self
    }

    pub fn seat_local_player(&mut self, player_id: PlayerId) {
        if !self.local_players.contains(&player_id) {
            self.local_players.push(player_id);
        }
    }

    fn push(&self, route: Route, msg: &MatchMessage) -> Result<(), ProtocolError> {
        let bytes = encode_match_message(msg)?;
        self.tx
            .send(Outbound {
                route,
                reliable: msg.is_reliable(),
                bytes,
            })
            .map_err(|_| ProtocolError::ChannelClosed)
    }
}

impl Authority for ChannelAuthority {
    fn is_authoritative(&self) -> bool {
        self.is_master
    }

    fn is_owned_by_local_actor(&self, player_id: PlayerId) -> bool {
        self.local_players.contains(&player_id)
    }

    fn broadcast(&mut self, msg: &MatchMessage) -> Result<(), ProtocolError> {
        self.push(Route::All, msg)
    }

    fn send_to_master(&mut self, msg: &MatchMessage) -> Result<(), ProtocolError> {
        self.push(Route::Master, msg)
    }
}
