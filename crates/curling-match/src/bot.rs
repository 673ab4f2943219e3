use glam::Vec3;
use rand::Rng;

use curling_core::net::messages::PlayerAction;
use curling_core::player::{PlayerColor, PlayerId};
use curling_core::state::GameState;

use crate::GameManager;
use crate::physics::GRAVITY;

/// Lateral drift of an unswept draw over the length of the sheet (metres).
const EXPECTED_CURL: f32 = 0.9;

/// Meter power that leaves an unswept stone near the button.
const DRAW_POWER: f32 = 0.45;

/// Random spread added to power and target so bot ends are not identical.
const POWER_JITTER: f32 = 0.03;
const TARGET_JITTER: f32 = 0.6;

/// Decide what `bot_id` does next, if anything.
///
/// Called every tick; returns at most one action. The bot only acts on its
/// own turn, except for end-of-end readiness and sweeping its own stone.
pub fn next_action<R: Rng>(game: &GameManager, bot_id: PlayerId, rng: &mut R) -> Option<PlayerAction> {
    if game.is_match_complete() {
        return None;
    }
    let color = game.color_of(bot_id)?;
    let state = game.state();

    if state.game_state == GameState::EndOfEnd {
        let ready = match color {
            PlayerColor::Red => state.red_ready,
            PlayerColor::Blue => state.blue_ready,
        };
        return (!ready).then_some(PlayerAction::ReadyForNextEnd);
    }

    if state.game_state == GameState::WaitingForStonesToStop {
        return sweep_decision(game, bot_id);
    }

    if state.current_player != Some(bot_id) {
        return None;
    }

    let clockwise = preferred_spin(state.end_number, state.stone_index);
    match state.game_state {
        GameState::YourTurnDialogActive => Some(PlayerAction::DismissTurnDialog),
        GameState::PlacingBroom if state.spin_clockwise != clockwise => {
            Some(PlayerAction::SetCurlDirection { clockwise })
        },
        GameState::PlacingBroom => {
            let target_x = rng.random_range(-TARGET_JITTER..=TARGET_JITTER);
            let against_curl = if clockwise { -EXPECTED_CURL } else { EXPECTED_CURL };
            Some(PlayerAction::PlaceBroom {
                position: Vec3::new(target_x + against_curl, 0.0, 0.0),
            })
        },
        GameState::AccuracyMeterActive => {
            let broom = game.broom(bot_id)?;
            Some(PlayerAction::SetAim {
                aim: broom.aiming_vector(game.config().sheet.hack_position),
            })
        },
        GameState::ShootingMeterActive => Some(PlayerAction::Shoot {
            power: DRAW_POWER + rng.random_range(-POWER_JITTER..=POWER_JITTER),
        }),
        _ => None,
    }
}

/// Alternate the turn per shot so both sides of the sheet get used.
fn preferred_spin(end_number: usize, stone_index: usize) -> bool {
    (end_number + stone_index / 2) % 2 == 0
}

/// Sweep our moving stone while it looks like stopping short of the button.
/// Only the master knows stone velocities, so a mirror's bot never sweeps.
fn sweep_decision(game: &GameManager, bot_id: PlayerId) -> Option<PlayerAction> {
    let color = game.color_of(bot_id)?;
    let index = game.stone_index();
    let stone = game.stone(index)?;
    if stone.color != color {
        return None;
    }

    let speed = stone.body.speed();
    if speed <= 0.0 || !stone.can_be_swept(color) {
        return None;
    }
    let tuning = &game.config().stone;
    let mu = (tuning.default_friction + tuning.stone_friction) * 0.5;
    let stopping_distance = speed * speed / (2.0 * mu * GRAVITY);
    let short = stone.position().z + stopping_distance < game.config().sheet.house.center.z;

    match (short, stone.is_being_swept()) {
        (true, false) => Some(PlayerAction::StartSweeping { stone_index: index }),
        (false, true) => Some(PlayerAction::StopSweeping),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use curling_core::test_helpers::make_players;

    use super::*;
    use crate::MatchConfig;

    fn bot_match() -> GameManager {
        let mut gm = GameManager::local(MatchConfig::default());
        for p in make_players(2) {
            let id = p.id;
            gm.register_player(p).unwrap();
            gm.register_broom(id).unwrap();
        }
        gm
    }

    #[test]
    fn waits_for_its_turn() {
        let gm = bot_match();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(next_action(&gm, 1, &mut rng), None);
        assert_eq!(next_action(&gm, 2, &mut rng), Some(PlayerAction::DismissTurnDialog));
    }

    #[test]
    fn drives_a_full_delivery() {
        let mut gm = bot_match();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..6 {
            if gm.game_state() == GameState::DeliveringStone {
                break;
            }
            let action = next_action(&gm, 2, &mut rng).unwrap();
            gm.perform(2, action).unwrap();
        }
        assert_eq!(gm.game_state(), GameState::DeliveringStone);
        let broom_x = gm.broom(2).unwrap().position().x;
        let expected_side = if gm.spin_clockwise() { -1.0 } else { 1.0 };
        assert!(broom_x * expected_side > 0.0, "broom placed against the curl");
    }

    #[test]
    fn bot_draws_land_in_play() {
        let mut gm = bot_match();
        let mut rng = StdRng::seed_from_u64(11);
        let mut in_house = 0;
        for shot in 0..4 {
            while gm.stone_index() == shot {
                for id in [1, 2] {
                    if let Some(action) = next_action(&gm, id, &mut rng) {
                        gm.perform(id, action).unwrap();
                    }
                }
                gm.fixed_update(0.02);
                gm.update(0.02);
            }
            let house = gm.config().sheet.house;
            if gm.stone(shot).is_some_and(|s| house.contains(s.position())) {
                in_house += 1;
            }
        }
        assert!(in_house >= 2, "only {in_house} of 4 bot draws reached the house");
    }

    #[test]
    fn readies_up_once() {
        let mut gm = bot_match();
        for i in 0..16 {
            gm.place_stone_for_testing(Vec3::new(-1.2 + 0.15 * i as f32, 0.0, 13.0))
                .unwrap();
        }
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(next_action(&gm, 1, &mut rng), Some(PlayerAction::ReadyForNextEnd));
        gm.perform(1, PlayerAction::ReadyForNextEnd).unwrap();
        assert_eq!(next_action(&gm, 1, &mut rng), None);
    }
}
