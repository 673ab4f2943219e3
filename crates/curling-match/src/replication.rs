//! How match state crosses the wire.
//!
//! The master resolves every change into an idempotent set message, applies it
//! to itself through the same path a mirror uses, and broadcasts it. Mirrors
//! apply whatever the master sends and forward their local players' commands.
//! Stone motion is the exception: it travels as unreliable snapshots that
//! mirrors buffer and play back slightly delayed.

use std::cmp::Ordering;

use curling_core::events::MatchEvent;
use curling_core::net::messages::{CommandMsg, MatchMessage, StoneSnapshotMsg};
use curling_core::net::protocol::decode_match_message;
use curling_core::net::snapshot::PoseSnapshot;
use curling_core::player::PlayerColor;
use curling_core::state::{GameState, NUM_ENDS_IN_MATCH};

use crate::scoring::stones_remaining;
use crate::stone::CurlingStone;
use crate::{GameManager, MatchError, StoneSlot};

impl GameManager {
    /// Decode bytes from the transport and apply them.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), MatchError> {
        let msg = decode_match_message(bytes).map_err(|e| {
            tracing::warn!(error = %e, len = bytes.len(), "Dropping undecodable message");
            MatchError::from(e)
        })?;
        self.apply(&msg)
    }

    /// Apply one message from another participant.
    ///
    /// Commands are only honoured by the master. Set messages are only
    /// honoured by mirrors; the master already applied its own.
    pub fn apply(&mut self, msg: &MatchMessage) -> Result<(), MatchError> {
        match msg {
            MatchMessage::Command(cmd) => self.handle_command(cmd),
            MatchMessage::StoneSnapshot(snapshot) => {
                self.receive_snapshot(snapshot);
                Ok(())
            },
            _ if self.is_master() => {
                tracing::warn!(kind = ?msg.message_type(), "Master ignores state pushed by a participant");
                Ok(())
            },
            _ => {
                self.apply_set(msg);
                Ok(())
            },
        }
    }

    fn handle_command(&mut self, cmd: &CommandMsg) -> Result<(), MatchError> {
        if !self.is_master() {
            tracing::warn!(player_id = cmd.player_id, "Command sent to a participant that is not the master");
            return Err(MatchError::NotAuthoritative);
        }
        if let Err(e) = self.validate(cmd.player_id, &cmd.action) {
            tracing::warn!(player_id = cmd.player_id, action = ?cmd.action, error = %e, "Rejected remote command");
            return Err(e);
        }
        tracing::debug!(player_id = cmd.player_id, action = ?cmd.action, "Remote command");
        self.execute(cmd.player_id, cmd.action.clone());
        Ok(())
    }

    fn receive_snapshot(&mut self, msg: &StoneSnapshotMsg) {
        if self.is_master() {
            return;
        }
        let clock = self.clock;
        let Some(slot) = self.stones.get_mut(msg.index) else {
            tracing::trace!(index = msg.index, "Snapshot for a stone not spawned here");
            return;
        };
        let accepted = slot.interpolator.receive(PoseSnapshot::new(
            msg.remote_time,
            clock,
            msg.position,
            msg.rotation,
        ));
        if accepted {
            slot.stone
                .apply_motion_flags(msg.look_rotation_y, msg.above_sweep_threshold);
        }
    }

    /// Master: apply a resolved change here, then send it to everyone else.
    pub(crate) fn publish(&mut self, msg: MatchMessage) {
        self.apply_set(&msg);
        self.broadcast(&msg);
    }

    pub(crate) fn broadcast(&mut self, msg: &MatchMessage) {
        if let Err(e) = self.authority.broadcast(msg) {
            tracing::error!(kind = ?msg.message_type(), error = %e, "Broadcast failed");
        }
    }

    fn stone_mut(&mut self, index: usize) -> Option<&mut CurlingStone> {
        let stone = self.stones.get_mut(index).map(|slot| &mut slot.stone);
        if stone.is_none() {
            tracing::warn!(index, "Update for a stone that does not exist");
        }
        stone
    }

    /// Idempotent set operations. Applying the same message twice leaves the
    /// match exactly as applying it once.
    fn apply_set(&mut self, msg: &MatchMessage) {
        match msg {
            MatchMessage::AssignColors(m) => {
                self.state.red_player = Some(m.red_player);
                self.state.blue_player = Some(m.blue_player);
                for broom in &mut self.brooms {
                    if broom.owner() == m.red_player {
                        broom.set_color(PlayerColor::Red);
                    } else if broom.owner() == m.blue_player {
                        broom.set_color(PlayerColor::Blue);
                    }
                }
                self.refresh_brooms();
            },
            MatchMessage::SetGameState(m) => {
                if self.state.game_state != m.state {
                    tracing::debug!(from = ?self.state.game_state, to = ?m.state, "Game state");
                    self.state.game_state = m.state;
                    self.next_shot_timer = None;
                    self.next_end_timer = None;
                    self.refresh_brooms();
                }
                self.events.publish(MatchEvent::GameStateChanged(m.state));
            },
            MatchMessage::SetCurrentPlayer(m) => {
                self.state.current_player = Some(m.player_id);
                self.refresh_brooms();
                self.events.publish(MatchEvent::CurrentPlayerChanged(m.player_id));
            },
            MatchMessage::SetStoneIndex(m) => {
                self.state.stone_index = m.index;
                let (red_remaining, blue_remaining) = stones_remaining(m.index, self.state.hammer);
                self.events.publish(MatchEvent::NextStoneSpawned {
                    red_remaining,
                    blue_remaining,
                });
            },
            MatchMessage::SetEndNumberAndHammer(m) => {
                self.state.end_number = m.end;
                self.state.hammer = m.hammer;
                self.events.publish(MatchEvent::EndNumberChanged {
                    end: m.end,
                    hammer: m.hammer,
                });
            },
            MatchMessage::SetCurlDirection(m) => {
                self.state.spin_clockwise = m.clockwise;
                self.events.publish(MatchEvent::CurlDirectionChanged(m.clockwise));
            },
            MatchMessage::SetEndScore(m) => {
                if !(1..=NUM_ENDS_IN_MATCH).contains(&m.end) {
                    tracing::warn!(end = m.end, "Score for an end outside the match");
                    return;
                }
                self.state.end_scores[m.end - 1] = (m.red_points, m.blue_points);
                let (red_total, blue_total) = self.state.totals();
                self.events.publish(MatchEvent::EndScored {
                    end: m.end,
                    red_points: m.red_points,
                    blue_points: m.blue_points,
                    red_total,
                    blue_total,
                });
            },
            MatchMessage::SetPlayersReady(m) => {
                self.state.red_ready = m.red_ready;
                self.state.blue_ready = m.blue_ready;
                self.events.publish(MatchEvent::PlayerReadyChanged {
                    red_ready: m.red_ready,
                    blue_ready: m.blue_ready,
                });
            },
            MatchMessage::SetMatchComplete(_) => {
                self.state.match_complete = true;
                let (red_total, blue_total) = self.state.totals();
                self.events.publish(MatchEvent::MatchComplete {
                    red_total,
                    blue_total,
                });
            },
            MatchMessage::SetBroom(m) => {
                if let Some(broom) = self.brooms.iter_mut().find(|b| b.owner() == m.owner) {
                    broom.set_position(m.position);
                }
            },
            MatchMessage::SetAim(m) => self.state.aim = m.aim,
            MatchMessage::SpawnStone(m) => {
                let mut stone =
                    CurlingStone::new(m.color, m.position, m.rotation, &self.config.stone);
                stone.set_spin_clockwise(self.state.spin_clockwise);
                let slot = StoneSlot::new(stone, &self.config.sync);
                match m.index.cmp(&self.stones.len()) {
                    Ordering::Less => self.stones[m.index] = slot,
                    Ordering::Equal => self.stones.push(slot),
                    Ordering::Greater => {
                        tracing::warn!(index = m.index, have = self.stones.len(), "Stone spawned out of order");
                    },
                }
            },
            MatchMessage::SetStoneSpin(m) => {
                if let Some(stone) = self.stone_mut(m.index) {
                    stone.set_spin_clockwise(m.clockwise);
                }
            },
            MatchMessage::ShootStone(m) => {
                if let Some(stone) = self.stone_mut(m.index) {
                    stone.shoot(m.power, m.aim);
                }
            },
            MatchMessage::SetStoneState(m) => {
                if let Some(stone) = self.stone_mut(m.index) {
                    stone.advance_state(m.state);
                }
            },
            MatchMessage::SetSweeping(m) => {
                if let Some(stone) = self.stone_mut(m.index) {
                    stone.set_swept(m.swept);
                }
            },
            MatchMessage::DestroyStones(m) => {
                tracing::debug!(end = m.end, count = self.stones.len(), "Clearing stones");
                self.stones.clear();
                self.sweepers.clear();
            },
            MatchMessage::PlaceStone(m) => {
                if let Some(slot) = self.stones.get_mut(m.index) {
                    slot.stone.place_for_testing(m.position);
                    slot.interpolator.reset();
                    slot.sender.reset();
                }
            },
            MatchMessage::Command(_) | MatchMessage::StoneSnapshot(_) => {},
        }
    }

    /// A broom is live only for the player placing it.
    fn refresh_brooms(&mut self) {
        let placing = self.state.game_state == GameState::PlacingBroom;
        let current = self.current_color();
        for broom in &mut self.brooms {
            broom.set_enabled(placing && broom.color().is_some() && broom.color() == current);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use glam::{Quat, Vec3};

    use curling_core::net::channel::{ChannelAuthority, Outbound, Route};
    use curling_core::net::messages::{
        PlayerAction, SetEndScoreMsg, SetGameStateMsg, SpawnStoneMsg,
    };
    use curling_core::state::StoneState;
    use curling_core::net::protocol::encode_match_message;
    use curling_core::test_helpers::make_players;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::MatchConfig;

    fn seated(master: bool, local: u64) -> (GameManager, UnboundedReceiver<Outbound>) {
        let (auth, rx) = ChannelAuthority::channel(master);
        let mut gm = GameManager::new(MatchConfig::default(), Box::new(auth.with_local_player(local)));
        for p in make_players(2) {
            let id = p.id;
            gm.register_player(p).unwrap();
            gm.register_broom(id).unwrap();
        }
        (gm, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn deliver(from: &mut UnboundedReceiver<Outbound>, to: &mut GameManager) {
        for out in drain(from) {
            let _ = to.receive(&out.bytes);
        }
    }

    /// Player 2 is seated at the mirror, so their throw reaches the master as commands.
    fn throw_for_mirror(master: &mut GameManager, aim: Vec3, power: f32) {
        for action in [
            PlayerAction::DismissTurnDialog,
            PlayerAction::PlaceBroom { position: Vec3::ZERO },
            PlayerAction::SetAim { aim },
            PlayerAction::Shoot { power },
        ] {
            master
                .apply(&MatchMessage::Command(CommandMsg { player_id: 2, action }))
                .unwrap();
        }
    }

    fn snapshot(remote_time: f64, moving: bool) -> MatchMessage {
        MatchMessage::StoneSnapshot(StoneSnapshotMsg {
            index: 0,
            remote_time,
            position: Vec3::new(0.0, 0.0, -20.0),
            rotation: Quat::IDENTITY,
            look_rotation_y: if moving { 5.0 } else { 0.0 },
            above_sweep_threshold: moving,
        })
    }

    #[test]
    fn mirror_catches_up_from_start_broadcasts() {
        let (master, mut master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);
        assert_eq!(remote.game_state(), GameState::WaitingForPlayers);

        deliver(&mut master_rx, &mut remote);
        assert_eq!(remote.state(), master.state());
        assert_eq!(remote.stones().count(), 1);
        assert_eq!(remote.broom(2).unwrap().color(), master.broom(2).unwrap().color());
    }

    #[test]
    fn set_messages_are_idempotent() {
        let (_master, mut master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);
        let outbound = drain(&mut master_rx);
        for out in &outbound {
            remote.receive(&out.bytes).unwrap();
        }
        let once = remote.state().clone();
        for out in &outbound {
            remote.receive(&out.bytes).unwrap();
        }
        assert_eq!(remote.state(), &once);
        assert_eq!(remote.stones().count(), 1);

        let score = MatchMessage::SetEndScore(SetEndScoreMsg {
            end: 1,
            red_points: 2,
            blue_points: 0,
        });
        remote.apply(&score).unwrap();
        remote.apply(&score).unwrap();
        assert_eq!(remote.totals(), (2, 0), "totals are re-summed, not accumulated");
    }

    #[test]
    fn remote_command_round_trip() {
        let (mut master, mut master_rx) = seated(true, 1);
        let (mut remote, mut remote_rx) = seated(false, 2);
        deliver(&mut master_rx, &mut remote);

        // Player 2 is red and throws first.
        remote.on_your_turn_dialog_closed(2).unwrap();
        assert_eq!(remote.game_state(), GameState::YourTurnDialogActive, "mirror waits for the master");

        let sent = drain(&mut remote_rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].route, Route::Master);
        master.receive(&sent[0].bytes).unwrap();
        assert_eq!(master.game_state(), GameState::PlacingBroom);

        deliver(&mut master_rx, &mut remote);
        assert_eq!(remote.game_state(), GameState::PlacingBroom);
        assert!(remote.broom(2).unwrap().is_enabled());
    }

    #[test]
    fn master_revalidates_commands() {
        let (mut master, _master_rx) = seated(true, 1);
        let bogus = MatchMessage::Command(CommandMsg {
            player_id: 1,
            action: PlayerAction::Shoot { power: 1.0 },
        });
        let bytes = encode_match_message(&bogus).unwrap();
        assert!(matches!(
            master.receive(&bytes),
            Err(MatchError::NotYourTurn { .. })
        ));
        assert_eq!(master.game_state(), GameState::YourTurnDialogActive);
    }

    #[test]
    fn roles_ignore_the_wrong_traffic() {
        let (mut master, _master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);

        let push = MatchMessage::SetGameState(SetGameStateMsg {
            state: GameState::EndOfEnd,
        });
        master.apply(&push).unwrap();
        assert_eq!(master.game_state(), GameState::YourTurnDialogActive);

        let cmd = MatchMessage::Command(CommandMsg {
            player_id: 2,
            action: PlayerAction::DismissTurnDialog,
        });
        assert_eq!(remote.apply(&cmd), Err(MatchError::NotAuthoritative));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let (mut remote, _rx) = seated(false, 2);
        assert!(matches!(remote.receive(&[]), Err(MatchError::Protocol(_))));
        assert!(matches!(remote.receive(&[0xEE, 1, 2]), Err(MatchError::Protocol(_))));
    }

    #[test]
    fn snapshots_drive_the_mirrored_pose() {
        let (mut master, mut master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);
        deliver(&mut master_rx, &mut remote);

        assert!(master.on_your_turn_dialog_closed(2).is_err());
        throw_for_mirror(&mut master, Vec3::Z, 0.5);

        let dt = 0.02;
        for _ in 0..100 {
            master.fixed_update(dt);
            master.update(dt);
            deliver(&mut master_rx, &mut remote);
            remote.update(dt);
        }

        let truth = master.stone(0).unwrap().position();
        let mirrored = remote.stone(0).unwrap().position();
        assert!(mirrored.z > master.config().sheet.hack_position.z + 1.0, "mirror moved: {mirrored}");
        assert!(mirrored.z < truth.z, "mirror plays back behind the master");
        assert!(truth.z - mirrored.z < 1.0);
        assert!(remote.stone(0).unwrap().is_above_sweep_threshold());
    }

    #[test]
    fn master_rejects_a_backward_aim_from_the_mirror() {
        let (mut master, _master_rx) = seated(true, 1);
        for action in [
            PlayerAction::DismissTurnDialog,
            PlayerAction::PlaceBroom { position: Vec3::ZERO },
        ] {
            master
                .apply(&MatchMessage::Command(CommandMsg { player_id: 2, action }))
                .unwrap();
        }
        let backward = MatchMessage::Command(CommandMsg {
            player_id: 2,
            action: PlayerAction::SetAim { aim: Vec3::NEG_Z },
        });
        assert_eq!(master.apply(&backward), Err(MatchError::AimNotDownSheet));
        assert_eq!(master.game_state(), GameState::AccuracyMeterActive);
    }

    #[test]
    fn stale_snapshot_leaves_motion_flags_alone() {
        let (_master, mut master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);
        deliver(&mut master_rx, &mut remote);

        remote.apply(&snapshot(1.0, true)).unwrap();
        assert!(remote.stone(0).unwrap().is_above_sweep_threshold());

        remote.apply(&snapshot(0.5, false)).unwrap();
        remote.apply(&snapshot(1.0, false)).unwrap();
        let stone = remote.stone(0).unwrap();
        assert!(stone.is_above_sweep_threshold());
        assert_eq!(stone.look_rotation_y(), 5.0);

        remote.apply(&snapshot(1.1, false)).unwrap();
        assert!(!remote.stone(0).unwrap().is_above_sweep_threshold());
    }

    #[test]
    fn placing_a_stone_clears_its_playback_buffer() {
        let (mut master, mut master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);
        for _ in 0..20 {
            master.fixed_update(0.02);
            deliver(&mut master_rx, &mut remote);
        }
        assert!(!remote.stones[0].interpolator.is_empty());

        let spot = Vec3::new(0.3, 0.0, 17.0);
        master.place_stone_for_testing(spot).unwrap();
        deliver(&mut master_rx, &mut remote);
        assert!(remote.stones[0].interpolator.is_empty());
        assert_eq!(remote.stone(0).unwrap().state(), StoneState::AtRest);
        assert_eq!(remote.stone(0).unwrap().position(), spot);
    }

    #[test]
    fn respawned_stone_starts_with_an_empty_buffer() {
        let (_master, mut master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);
        deliver(&mut master_rx, &mut remote);
        remote.apply(&snapshot(1.0, true)).unwrap();
        remote.apply(&snapshot(1.1, true)).unwrap();
        assert_eq!(remote.stones[0].interpolator.len(), 2);

        let hack = remote.config().sheet.hack_position;
        remote
            .apply(&MatchMessage::SpawnStone(SpawnStoneMsg {
                index: 0,
                color: PlayerColor::Red,
                position: hack,
                rotation: Quat::IDENTITY,
            }))
            .unwrap();
        assert!(remote.stones[0].interpolator.is_empty());
        assert!(!remote.stone(0).unwrap().is_above_sweep_threshold());
        // A fresh stream is accepted even though its clock restarted.
        remote.apply(&snapshot(0.2, true)).unwrap();
        assert_eq!(remote.stones[0].interpolator.len(), 1);
    }

    #[test]
    fn mirror_fades_a_stone_only_once_its_playback_crosses_the_back_line() {
        const LATENCY_TICKS: usize = 5;
        const DT: f32 = 0.02;
        let (mut master, mut master_rx) = seated(true, 1);
        let (mut remote, _remote_rx) = seated(false, 2);
        deliver(&mut master_rx, &mut remote);
        throw_for_mirror(&mut master, Vec3::Z, 1.0);

        let back_line = master.config().sheet.far_back_line_z;
        let mut in_flight: VecDeque<(usize, Vec<u8>)> = VecDeque::new();
        let (mut master_faded, mut master_out) = (None, None);
        let (mut mirror_faded, mut mirror_out) = (None, None);

        for tick in 0..3000 {
            master.fixed_update(DT);
            master.update(DT);
            let stone = master.stone(0).unwrap().state();
            if !stone.is_in_play() {
                master_faded.get_or_insert(tick);
            }
            if stone == StoneState::OutOfBounds {
                master_out.get_or_insert(tick);
            }

            let was_in_play = remote.stone(0).unwrap().state().is_in_play();
            in_flight.extend(
                drain(&mut master_rx)
                    .into_iter()
                    .map(|out| (tick + LATENCY_TICKS, out.bytes)),
            );
            while in_flight.front().is_some_and(|(due, _)| *due <= tick) {
                if let Some((_, bytes)) = in_flight.pop_front() {
                    remote.receive(&bytes).unwrap();
                }
            }
            remote.update(DT);

            let mirrored = remote.stone(0).unwrap();
            if was_in_play && !mirrored.state().is_in_play() {
                assert!(
                    mirrored.position().z > back_line,
                    "mirror faded the stone at {} before it reached the back line",
                    mirrored.position()
                );
                mirror_faded = Some(tick);
            }
            if mirrored.state() == StoneState::OutOfBounds {
                mirror_out.get_or_insert(tick);
            }
            if master_out.is_some() && mirror_out.is_some() {
                break;
            }
        }

        let (master_faded, mirror_faded) = (master_faded.unwrap(), mirror_faded.unwrap());
        let (master_out, mirror_out) = (master_out.unwrap(), mirror_out.unwrap());
        assert!(mirror_faded > master_faded, "playback runs behind the master");
        assert!(mirror_faded - master_faded <= 50, "mirror faded {mirror_faded} vs {master_faded}");
        assert!(mirror_out >= master_out);
        assert!(mirror_out <= master_out + LATENCY_TICKS, "fade ends {mirror_out} vs {master_out}");
    }
}
