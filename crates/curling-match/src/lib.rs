pub mod bot;
pub mod broom;
pub mod config;
pub mod error;
pub mod physics;
mod replication;
pub mod scoring;
pub mod sheet;
pub mod stone;

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use curling_core::authority::{Authority, LocalAuthority};
use curling_core::events::{EventHub, MatchEvent, SubscriptionId};
use curling_core::net::messages::{
    AssignColorsMsg, CommandMsg, DestroyStonesMsg, MatchMessage, PlayerAction, SetAimMsg,
    SetBroomMsg, SetCurlDirectionMsg, SetCurrentPlayerMsg, SetEndNumberAndHammerMsg,
    SetEndScoreMsg, SetGameStateMsg, SetMatchCompleteMsg, SetPlayersReadyMsg, SetStoneIndexMsg,
    SetStoneSpinMsg, SetStoneStateMsg, SetSweepingMsg, ShootStoneMsg, SpawnStoneMsg,
    StoneSnapshotMsg,
};
use curling_core::net::protocol::ProtocolError;
use curling_core::net::snapshot::{PoseSnapshot, SnapshotConfig, SnapshotInterpolator, SnapshotSender};
use curling_core::player::{Player, PlayerColor, PlayerId};
use curling_core::state::{GameState, NUM_ENDS_IN_MATCH, NUM_STONES_IN_END, StoneState};
use curling_core::time::OneShotTimer;

use broom::AimingBroom;
use physics::{IcePhysics, RigidBody};
use scoring::{StoneSummary, calculate_points_scored, end_points, next_hammer};
use stone::CurlingStone;

pub use config::MatchConfig;
pub use error::MatchError;

/// A match is always one player against one.
pub const MAX_PLAYERS: usize = 2;

/// Canonical match data. The master writes it; everyone else mirrors it from
/// the set messages the master broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    pub game_state: GameState,
    /// 1-based. Zero until the match starts.
    pub end_number: usize,
    /// Colour throwing last this end.
    pub hammer: PlayerColor,
    pub current_player: Option<PlayerId>,
    pub stone_index: usize,
    /// `(red, blue)` points per end.
    pub end_scores: [(u32, u32); NUM_ENDS_IN_MATCH],
    pub spin_clockwise: bool,
    pub red_player: Option<PlayerId>,
    pub blue_player: Option<PlayerId>,
    pub red_ready: bool,
    pub blue_ready: bool,
    /// Planar unit vector captured from the accuracy meter for the current shot.
    pub aim: Vec3,
    pub match_complete: bool,
}

impl Default for MatchState {
    fn default() -> Self {
        Self {
            game_state: GameState::WaitingForPlayers,
            end_number: 0,
            hammer: PlayerColor::Blue,
            current_player: None,
            stone_index: 0,
            end_scores: [(0, 0); NUM_ENDS_IN_MATCH],
            spin_clockwise: true,
            red_player: None,
            blue_player: None,
            red_ready: false,
            blue_ready: false,
            aim: Vec3::Z,
            match_complete: false,
        }
    }
}

impl MatchState {
    /// Cumulative `(red, blue)`, always re-summed from the per-end table.
    pub fn totals(&self) -> (u32, u32) {
        self.end_scores
            .iter()
            .fold((0, 0), |(r, b), (er, eb)| (r + er, b + eb))
    }
}

/// A stone plus the state needed to replicate its motion.
#[derive(Debug)]
struct StoneSlot {
    stone: CurlingStone,
    sender: SnapshotSender,
    interpolator: SnapshotInterpolator<PoseSnapshot>,
}

impl StoneSlot {
    fn new(stone: CurlingStone, sync: &SnapshotConfig) -> Self {
        Self {
            stone,
            sender: SnapshotSender::new(sync),
            interpolator: SnapshotInterpolator::new(sync.clone()),
        }
    }
}

/// Drives a two-player match through its ends and shots.
///
/// The same type runs on every participant. The injected [`Authority`] decides
/// whether this copy is the master (runs physics, timers and state advancement,
/// then broadcasts every resolved change) or a mirror (validates its local
/// players' input, forwards it to the master, and applies what comes back).
pub struct GameManager {
    config: MatchConfig,
    state: MatchState,
    players: Vec<Player>,
    brooms: Vec<AimingBroom>,
    stones: Vec<StoneSlot>,
    /// Master only: which stone each player is sweeping.
    sweepers: BTreeMap<PlayerId, usize>,
    physics: IcePhysics,
    /// Master only: hammer for the next end, decided when this end is scored.
    next_hammer: Option<PlayerColor>,
    next_shot_timer: Option<OneShotTimer>,
    next_end_timer: Option<OneShotTimer>,
    /// Presentation clock, advanced by [`GameManager::update`].
    clock: f64,
    /// Master physics clock; stamps outgoing snapshots.
    sim_time: f64,
    since_snapshot: f64,
    events: EventHub,
    authority: Box<dyn Authority>,
}

impl std::fmt::Debug for GameManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameManager")
            .field("master", &self.authority.is_authoritative())
            .field("state", &self.state)
            .field("players", &self.players)
            .field("stones", &self.stones.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl GameManager {
    pub fn new(config: MatchConfig, authority: Box<dyn Authority>) -> Self {
        let physics = IcePhysics::new(&config.stone);
        Self {
            config,
            state: MatchState::default(),
            players: Vec::with_capacity(MAX_PLAYERS),
            brooms: Vec::with_capacity(MAX_PLAYERS),
            stones: Vec::with_capacity(NUM_STONES_IN_END),
            sweepers: BTreeMap::new(),
            physics,
            next_hammer: None,
            next_shot_timer: None,
            next_end_timer: None,
            clock: 0.0,
            sim_time: 0.0,
            since_snapshot: 0.0,
            events: EventHub::new(),
            authority,
        }
    }

    /// Single-process match: this copy is the master and seats both players.
    pub fn local(config: MatchConfig) -> Self {
        Self::new(config, Box::new(LocalAuthority))
    }

    // -- Registration -------------------------------------------------------

    /// Seat a player. The match starts once both players and both brooms are in.
    pub fn register_player(&mut self, player: Player) -> Result<(), MatchError> {
        if self.player(player.id).is_some() {
            return Ok(());
        }
        if self.players.len() >= MAX_PLAYERS {
            tracing::error!(player_id = player.id, "Cannot seat a third player");
            return Err(MatchError::PlayersFull);
        }
        tracing::info!(player_id = player.id, name = %player.display_name, "Player registered");
        self.players.push(player);
        self.try_start_match();
        Ok(())
    }

    /// Give a registered player their aiming broom.
    pub fn register_broom(&mut self, owner: PlayerId) -> Result<(), MatchError> {
        if self.player(owner).is_none() {
            tracing::error!(owner, "Broom registered for an unknown player");
            return Err(MatchError::UnknownBroomOwner(owner));
        }
        if self.broom(owner).is_none() {
            let mut broom = AimingBroom::new(owner);
            if let Some(color) = self.color_of(owner) {
                broom.set_color(color);
            }
            self.brooms.push(broom);
        }
        self.try_start_match();
        Ok(())
    }

    fn try_start_match(&mut self) {
        if self.is_master()
            && self.state.game_state == GameState::WaitingForPlayers
            && self.state.end_number == 0
            && self.players.len() == MAX_PLAYERS
            && self.brooms.len() == MAX_PLAYERS
        {
            self.start_match();
        }
    }

    // -- Getters ------------------------------------------------------------

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn is_master(&self) -> bool {
        self.authority.is_authoritative()
    }

    pub fn game_state(&self) -> GameState {
        self.state.game_state
    }

    pub fn end_number(&self) -> usize {
        self.state.end_number
    }

    pub fn hammer(&self) -> PlayerColor {
        self.state.hammer
    }

    pub fn current_player(&self) -> Option<PlayerId> {
        self.state.current_player
    }

    pub fn current_color(&self) -> Option<PlayerColor> {
        self.state.current_player.and_then(|id| self.color_of(id))
    }

    pub fn stone_index(&self) -> usize {
        self.state.stone_index
    }

    pub fn end_scores(&self) -> &[(u32, u32); NUM_ENDS_IN_MATCH] {
        &self.state.end_scores
    }

    pub fn totals(&self) -> (u32, u32) {
        self.state.totals()
    }

    pub fn spin_clockwise(&self) -> bool {
        self.state.spin_clockwise
    }

    pub fn is_match_complete(&self) -> bool {
        self.state.match_complete
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn color_of(&self, id: PlayerId) -> Option<PlayerColor> {
        if self.state.red_player == Some(id) {
            Some(PlayerColor::Red)
        } else if self.state.blue_player == Some(id) {
            Some(PlayerColor::Blue)
        } else {
            None
        }
    }

    pub fn player_of(&self, color: PlayerColor) -> Option<PlayerId> {
        match color {
            PlayerColor::Red => self.state.red_player,
            PlayerColor::Blue => self.state.blue_player,
        }
    }

    pub fn broom(&self, owner: PlayerId) -> Option<&AimingBroom> {
        self.brooms.iter().find(|b| b.owner() == owner)
    }

    pub fn stone(&self, index: usize) -> Option<&CurlingStone> {
        self.stones.get(index).map(|slot| &slot.stone)
    }

    pub fn stones(&self) -> impl Iterator<Item = &CurlingStone> {
        self.stones.iter().map(|slot| &slot.stone)
    }

    /// The stone being thrown this shot.
    pub fn current_stone(&self) -> Option<&CurlingStone> {
        self.stone(self.state.stone_index)
    }

    pub fn stone_summaries(&self) -> Vec<StoneSummary> {
        self.stones
            .iter()
            .map(|slot| StoneSummary {
                color: slot.stone.color,
                state: slot.stone.state(),
                position: slot.stone.position(),
            })
            .collect()
    }

    /// Who scored the last completed end and how many points, for the
    /// end-of-end dialog. A blank end reports the blue player with zero.
    pub fn most_recent_score_info(&self) -> Option<(String, u32)> {
        let end = self.state.end_number.checked_sub(1)?;
        let (red, blue) = *self.state.end_scores.get(end)?;
        let (color, points) = if red > 0 {
            (PlayerColor::Red, red)
        } else {
            (PlayerColor::Blue, blue)
        };
        let player = self.player(self.player_of(color)?)?;
        Some((player.display_name.clone(), points))
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Encoded [`MatchState`], suitable for comparing or persisting a mirror.
    pub fn serialize_state(&self) -> Result<Vec<u8>, MatchError> {
        rmp_serde::to_vec(&self.state)
            .map_err(|e| MatchError::Protocol(ProtocolError::SerializeError(e.to_string())))
    }

    // -- Notifications ------------------------------------------------------

    /// Listen for match events. The latest event of each kind is replayed immediately.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&MatchEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // -- Player actions -----------------------------------------------------

    pub fn on_your_turn_dialog_closed(&mut self, player_id: PlayerId) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::DismissTurnDialog)
    }

    pub fn place_broom(&mut self, player_id: PlayerId, position: Vec3) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::PlaceBroom { position })
    }

    pub fn set_aim(&mut self, player_id: PlayerId, aim: Vec3) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::SetAim { aim })
    }

    /// Stop the accuracy line where it is and use it as the aim.
    pub fn capture_aim(&mut self, player_id: PlayerId) -> Result<(), MatchError> {
        let aim = self
            .broom(player_id)
            .ok_or(MatchError::UnknownPlayer(player_id))?
            .aiming_vector(self.config.sheet.hack_position);
        self.set_aim(player_id, aim)
    }

    pub fn shoot_stone(&mut self, player_id: PlayerId, power: f32) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::Shoot { power })
    }

    pub fn set_curl_direction(
        &mut self,
        player_id: PlayerId,
        clockwise: bool,
    ) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::SetCurlDirection { clockwise })
    }

    pub fn start_sweeping(
        &mut self,
        player_id: PlayerId,
        stone_index: usize,
    ) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::StartSweeping { stone_index })
    }

    pub fn stop_sweeping(&mut self, player_id: PlayerId) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::StopSweeping)
    }

    pub fn player_ready_for_next_end(&mut self, player_id: PlayerId) -> Result<(), MatchError> {
        self.perform(player_id, PlayerAction::ReadyForNextEnd)
    }

    /// Validate an action by a player seated here, then carry it out (master)
    /// or forward it to the master. A rejected action changes nothing.
    pub fn perform(&mut self, player_id: PlayerId, action: PlayerAction) -> Result<(), MatchError> {
        let checked = if self.authority.is_owned_by_local_actor(player_id) {
            self.validate(player_id, &action)
        } else {
            Err(MatchError::NotLocalActor(player_id))
        };
        if let Err(e) = checked {
            tracing::warn!(player_id, action = ?action, error = %e, "Rejected player action");
            return Err(e);
        }

        if self.is_master() {
            self.execute(player_id, action);
            return Ok(());
        }
        tracing::debug!(player_id, action = ?action, "Forwarding action to master");
        let msg = MatchMessage::Command(CommandMsg { player_id, action });
        self.authority.send_to_master(&msg).map_err(|e| {
            tracing::warn!(player_id, error = %e, "Could not reach the master");
            MatchError::from(e)
        })
    }

    fn expect_current(&self, player_id: PlayerId) -> Result<(), MatchError> {
        if self.state.current_player == Some(player_id) {
            Ok(())
        } else {
            Err(MatchError::NotYourTurn {
                player_id,
                current: self.state.current_player,
            })
        }
    }

    fn expect_state(&self, expected: GameState) -> Result<(), MatchError> {
        if self.state.game_state == expected {
            Ok(())
        } else {
            Err(MatchError::WrongState {
                expected,
                actual: self.state.game_state,
            })
        }
    }

    fn expect_turn(&self, player_id: PlayerId, expected: GameState) -> Result<(), MatchError> {
        self.expect_current(player_id)?;
        self.expect_state(expected)
    }

    fn validate(&self, player_id: PlayerId, action: &PlayerAction) -> Result<(), MatchError> {
        if self.state.match_complete {
            return Err(MatchError::MatchOver);
        }
        if self.player(player_id).is_none() {
            return Err(MatchError::UnknownPlayer(player_id));
        }
        let Some(color) = self.color_of(player_id) else {
            return Err(MatchError::NotYourTurn {
                player_id,
                current: self.state.current_player,
            });
        };

        match action {
            PlayerAction::DismissTurnDialog => {
                self.expect_turn(player_id, GameState::YourTurnDialogActive)
            },
            PlayerAction::PlaceBroom { .. } => self.expect_turn(player_id, GameState::PlacingBroom),
            PlayerAction::SetAim { aim } => {
                self.expect_turn(player_id, GameState::AccuracyMeterActive)?;
                if broom::aims_down_sheet(*aim) {
                    Ok(())
                } else {
                    Err(MatchError::AimNotDownSheet)
                }
            },
            PlayerAction::Shoot { .. } => {
                self.expect_turn(player_id, GameState::ShootingMeterActive)
            },
            PlayerAction::SetCurlDirection { .. } => {
                self.expect_current(player_id)?;
                if self.state.game_state.is_pre_delivery() {
                    Ok(())
                } else {
                    Err(MatchError::WrongState {
                        expected: GameState::PlacingBroom,
                        actual: self.state.game_state,
                    })
                }
            },
            PlayerAction::StartSweeping { stone_index } => {
                let slot = self
                    .stones
                    .get(*stone_index)
                    .ok_or(MatchError::NoSuchStone(*stone_index))?;
                if slot.stone.can_be_swept(color) {
                    Ok(())
                } else {
                    Err(MatchError::NotSweepable {
                        stone_index: *stone_index,
                        sweeper: player_id,
                    })
                }
            },
            PlayerAction::StopSweeping => Ok(()),
            PlayerAction::ReadyForNextEnd => self.expect_state(GameState::EndOfEnd),
        }
    }

    /// Master: carry out an already validated action.
    fn execute(&mut self, player_id: PlayerId, action: PlayerAction) {
        match action {
            PlayerAction::DismissTurnDialog => self.set_game_state(GameState::PlacingBroom),
            PlayerAction::PlaceBroom { position } => {
                let Some(broom) = self.brooms.iter_mut().find(|b| b.owner() == player_id) else {
                    tracing::error!(player_id, "Current player has no broom");
                    return;
                };
                let position = broom.move_to(position.x);
                self.publish(MatchMessage::SetBroom(SetBroomMsg {
                    owner: player_id,
                    position,
                }));
                self.set_game_state(GameState::AccuracyMeterActive);
            },
            PlayerAction::SetAim { aim } => {
                let aim = Vec3::new(aim.x, 0.0, aim.z).normalize_or(Vec3::Z);
                self.publish(MatchMessage::SetAim(SetAimMsg { aim }));
                self.set_game_state(GameState::ShootingMeterActive);
            },
            PlayerAction::Shoot { power } => {
                let power = if power.is_finite() {
                    power.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let index = self.state.stone_index;
                tracing::debug!(player_id, index, power, "Stone delivered");
                self.publish(MatchMessage::ShootStone(ShootStoneMsg {
                    index,
                    power,
                    aim: self.state.aim,
                }));
                self.set_game_state(GameState::DeliveringStone);
            },
            PlayerAction::SetCurlDirection { clockwise } => {
                self.publish(MatchMessage::SetCurlDirection(SetCurlDirectionMsg { clockwise }));
                self.publish(MatchMessage::SetStoneSpin(SetStoneSpinMsg {
                    index: self.state.stone_index,
                    clockwise,
                }));
            },
            PlayerAction::StartSweeping { stone_index } => {
                self.release_sweeper(player_id);
                self.publish(MatchMessage::SetSweeping(SetSweepingMsg {
                    index: stone_index,
                    swept: true,
                }));
                self.sweepers.insert(player_id, stone_index);
            },
            PlayerAction::StopSweeping => self.release_sweeper(player_id),
            PlayerAction::ReadyForNextEnd => {
                let (mut red_ready, mut blue_ready) = (self.state.red_ready, self.state.blue_ready);
                match self.color_of(player_id) {
                    Some(PlayerColor::Red) => red_ready = true,
                    Some(PlayerColor::Blue) => blue_ready = true,
                    None => return,
                }
                self.publish(MatchMessage::SetPlayersReady(SetPlayersReadyMsg {
                    red_ready,
                    blue_ready,
                }));
                if red_ready && blue_ready && self.next_end_timer.is_none() {
                    self.next_end_timer =
                        Some(OneShotTimer::new(self.config.rules.next_end_delay_secs));
                }
            },
        }
    }

    // -- Master flow --------------------------------------------------------

    fn master_only(&self, operation: &'static str) -> bool {
        if !self.is_master() {
            tracing::error!(operation, "Master-only operation on a mirroring participant");
        }
        self.is_master()
    }

    fn set_game_state(&mut self, state: GameState) {
        self.publish(MatchMessage::SetGameState(SetGameStateMsg { state }));
    }

    fn start_match(&mut self) {
        let [first, second] = &self.players[..] else {
            return;
        };
        let (first, second) = (first.id, second.id);
        let rules = &self.config.rules;
        let swap = rules.randomize_colors
            && match rules.color_seed {
                Some(seed) => StdRng::seed_from_u64(seed).random_bool(0.5),
                None => rand::rng().random_bool(0.5),
            };
        let (blue_player, red_player) = if swap { (second, first) } else { (first, second) };

        tracing::info!(red_player, blue_player, "Match starting");
        self.publish(MatchMessage::AssignColors(AssignColorsMsg {
            red_player,
            blue_player,
        }));
        self.publish(MatchMessage::SetEndNumberAndHammer(SetEndNumberAndHammerMsg {
            end: 1,
            hammer: PlayerColor::Blue,
        }));
        self.publish(MatchMessage::SetCurrentPlayer(SetCurrentPlayerMsg {
            player_id: red_player,
        }));
        self.next_shot(0, false);
    }

    /// Set up shot `index`, or score the end once every stone has been thrown.
    fn next_shot(&mut self, index: usize, switch_player: bool) {
        if !self.master_only("next_shot") {
            return;
        }
        if index >= NUM_STONES_IN_END {
            self.end_of_end();
            return;
        }

        self.release_all_sweepers();
        if switch_player
            && let Some(color) = self.current_color()
            && let Some(player_id) = self.player_of(color.opposite())
        {
            self.publish(MatchMessage::SetCurrentPlayer(SetCurrentPlayerMsg { player_id }));
        }
        let Some(color) = self.current_color() else {
            tracing::error!(index, "No current player to throw the next stone");
            return;
        };

        tracing::debug!(end = self.state.end_number, index, color = %color, "Next shot");
        self.publish(MatchMessage::SetCurlDirection(SetCurlDirectionMsg { clockwise: true }));
        self.publish(MatchMessage::SpawnStone(SpawnStoneMsg {
            index,
            color,
            position: self.config.sheet.hack_position,
            rotation: Quat::IDENTITY,
        }));
        self.publish(MatchMessage::SetStoneIndex(SetStoneIndexMsg { index }));
        self.set_game_state(GameState::YourTurnDialogActive);
    }

    /// Score the end while its stones still exist, and decide the next hammer.
    fn end_of_end(&mut self) {
        let score = calculate_points_scored(&self.stone_summaries(), &self.config.sheet.house);
        let (red_points, blue_points) = end_points(score);
        self.next_hammer = Some(next_hammer(self.state.hammer, score));

        tracing::info!(end = self.state.end_number, red_points, blue_points, "End scored");
        self.release_all_sweepers();
        self.publish(MatchMessage::SetEndScore(SetEndScoreMsg {
            end: self.state.end_number,
            red_points,
            blue_points,
        }));
        self.publish(MatchMessage::SetPlayersReady(SetPlayersReadyMsg {
            red_ready: false,
            blue_ready: false,
        }));
        self.set_game_state(GameState::EndOfEnd);
    }

    fn start_next_end(&mut self) {
        if !self.master_only("start_next_end") {
            return;
        }
        let hammer = self.next_hammer.take().unwrap_or(self.state.hammer);
        let end = self.state.end_number + 1;

        self.publish(MatchMessage::DestroyStones(DestroyStonesMsg {
            end: self.state.end_number,
        }));
        self.publish(MatchMessage::SetEndNumberAndHammer(SetEndNumberAndHammerMsg {
            end,
            hammer,
        }));
        if let Some(player_id) = self.player_of(hammer.opposite()) {
            self.publish(MatchMessage::SetCurrentPlayer(SetCurrentPlayerMsg { player_id }));
        }
        self.publish(MatchMessage::SetPlayersReady(SetPlayersReadyMsg {
            red_ready: false,
            blue_ready: false,
        }));
        tracing::info!(end, hammer = %hammer, "End starting");
        self.next_shot(0, false);
    }

    fn complete_match(&mut self) {
        let (red_total, blue_total) = self.totals();
        tracing::info!(red_total, blue_total, "Match complete");
        self.publish(MatchMessage::SetMatchComplete(SetMatchCompleteMsg {
            red_total,
            blue_total,
        }));
    }

    fn release_sweeper(&mut self, player_id: PlayerId) {
        if let Some(index) = self.sweepers.remove(&player_id)
            && index < self.stones.len()
        {
            self.publish(MatchMessage::SetSweeping(SetSweepingMsg {
                index,
                swept: false,
            }));
        }
    }

    fn release_all_sweepers(&mut self) {
        let sweepers: Vec<PlayerId> = self.sweepers.keys().copied().collect();
        for player_id in sweepers {
            self.release_sweeper(player_id);
        }
    }

    /// Let go of stones that slowed below the sweepable speed or left play.
    fn release_ineligible_sweepers(&mut self) {
        let stale: Vec<PlayerId> = self
            .sweepers
            .iter()
            .filter(|&(&player_id, &index)| {
                let color = self.color_of(player_id);
                self.stones
                    .get(index)
                    .is_none_or(|slot| color.is_none_or(|c| !slot.stone.can_be_swept(c)))
            })
            .map(|(&player_id, _)| player_id)
            .collect();
        for player_id in stale {
            tracing::debug!(player_id, "Sweeper released");
            self.release_sweeper(player_id);
        }
    }

    /// Poll every stone; once none is moving, start the grace period before
    /// the next shot.
    fn check_for_moving_stones(&mut self) {
        let sheet = self.config.sheet;
        let mut moving = false;
        let mut changed = Vec::new();
        for (index, slot) in self.stones.iter_mut().enumerate() {
            let before = slot.stone.state();
            moving |= slot.stone.check_if_moving(&sheet);
            if slot.stone.state() != before {
                changed.push((index, slot.stone.state()));
            }
        }
        self.publish_stone_states(changed);

        if !moving {
            tracing::debug!(index = self.state.stone_index, "All stones settled");
            self.next_shot_timer = Some(OneShotTimer::new(self.config.rules.next_shot_delay_secs));
        }
    }

    fn publish_stone_states(&mut self, changed: Vec<(usize, StoneState)>) {
        for (index, state) in changed {
            self.publish(MatchMessage::SetStoneState(SetStoneStateMsg { index, state }));
        }
    }

    fn tick_timers(&mut self, dt: f32) {
        if let Some(timer) = self.next_shot_timer.as_mut()
            && timer.tick(dt)
        {
            self.next_shot_timer = None;
            self.next_shot(self.state.stone_index + 1, true);
        }
        if let Some(timer) = self.next_end_timer.as_mut()
            && timer.tick(dt)
        {
            self.next_end_timer = None;
            if self.state.end_number >= NUM_ENDS_IN_MATCH {
                self.complete_match();
            } else {
                self.start_next_end();
            }
        }
    }

    /// Master: broadcast the pose of every stone in play that moved since it
    /// was last sent, once per send interval.
    fn send_snapshots(&mut self, dt: f32) {
        let interval = self.config.sync.send_interval;
        self.since_snapshot += f64::from(dt);
        if self.since_snapshot + 1e-6 < interval {
            return;
        }
        self.since_snapshot = (self.since_snapshot - interval).clamp(0.0, interval);

        let remote_time = self.sim_time;
        let mut outgoing = Vec::new();
        for (index, slot) in self.stones.iter_mut().enumerate() {
            let stone = &slot.stone;
            // Dissolving stones still report where they stopped, so mirrors
            // play them up to the line they crossed.
            if stone.state() == StoneState::OutOfBounds {
                continue;
            }
            if slot.sender.should_send(stone.position(), stone.rotation()) {
                outgoing.push(MatchMessage::StoneSnapshot(StoneSnapshotMsg {
                    index,
                    remote_time,
                    position: stone.position(),
                    rotation: stone.rotation(),
                    look_rotation_y: stone.look_rotation_y(),
                    above_sweep_threshold: stone.is_above_sweep_threshold(),
                }));
            }
        }
        for msg in &outgoing {
            self.broadcast(msg);
        }
    }

    // -- Ticks --------------------------------------------------------------

    /// Physics step. Only the master simulates; mirrors return immediately.
    pub fn fixed_update(&mut self, dt: f32) {
        if !self.is_master() || self.state.match_complete {
            return;
        }
        self.sim_time += f64::from(dt);

        let sheet = self.config.sheet;
        let mut crossed_close_hog = false;
        for slot in &mut self.stones {
            crossed_close_hog |= slot.stone.fixed_update(dt, &sheet).is_some();
        }
        let mut bodies: Vec<&mut RigidBody> =
            self.stones.iter_mut().map(|slot| &mut slot.stone.body).collect();
        self.physics.step(&mut bodies, dt);

        // A delivery that left play before the close hog line is over too.
        let left_play = self
            .current_stone()
            .is_some_and(|stone| !stone.state().is_in_play());
        if (crossed_close_hog || left_play)
            && self.state.game_state == GameState::DeliveringStone
        {
            if left_play {
                tracing::debug!(index = self.state.stone_index, "Delivered stone left play early");
            }
            self.set_game_state(GameState::WaitingForStonesToStop);
        }
        self.release_ineligible_sweepers();
        if self.state.game_state == GameState::WaitingForStonesToStop
            && self.next_shot_timer.is_none()
        {
            self.check_for_moving_stones();
        }
        self.tick_timers(dt);
        self.send_snapshots(dt);
    }

    /// Presentation step, run on every participant: brooms, snapshot playback
    /// on mirrors, and each stone's hack easing, fade and out-of-bounds check.
    /// Each side finds out-of-bounds stones against the pose it displays; the
    /// master only shares the end of the fade.
    pub fn update(&mut self, dt: f32) {
        self.clock += f64::from(dt);

        let swinging = self.state.game_state == GameState::AccuracyMeterActive;
        let current = self.current_color();
        for broom in &mut self.brooms {
            broom.update(dt, swinging && broom.color().is_some() && broom.color() == current);
        }

        let master = self.is_master();
        let sheet = self.config.sheet;
        let clock = self.clock;
        let mut changed = Vec::new();
        for (index, slot) in self.stones.iter_mut().enumerate() {
            if !master
                && slot.stone.state().is_in_play()
                && let Some(pose) =
                    slot.interpolator
                        .compute(clock, f64::from(dt), PoseSnapshot::interpolate)
            {
                slot.stone.apply_pose(pose.position, pose.rotation);
            }
            let before = slot.stone.state();
            slot.stone.update(dt, &sheet);
            let after = slot.stone.state();
            if master && after != before && after == StoneState::OutOfBounds {
                changed.push((index, after));
            }
        }
        self.publish_stone_states(changed);
    }

    /// Debug shortcut: put the stone in the hack down at rest at `position`
    /// and move on to the next shot.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn place_stone_for_testing(&mut self, position: Vec3) -> Result<(), MatchError> {
        if !self.is_master() {
            return Err(MatchError::NotAuthoritative);
        }
        if self.state.match_complete {
            return Err(MatchError::MatchOver);
        }
        let index = self.state.stone_index;
        if self
            .stone(index)
            .is_none_or(|stone| stone.state() != StoneState::InHack)
        {
            return Err(MatchError::NoSuchStone(index));
        }
        self.publish(MatchMessage::PlaceStone(
            curling_core::net::messages::PlaceStoneMsg { index, position },
        ));
        self.next_shot(index + 1, true);
        Ok(())
    }
}
