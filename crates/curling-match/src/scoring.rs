use glam::Vec3;
use serde::{Deserialize, Serialize};

use curling_core::player::PlayerColor;
use curling_core::state::{NUM_STONES_IN_END, StoneState};

use crate::sheet::House;

/// What scoring needs to know about a stone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoneSummary {
    pub color: PlayerColor,
    pub state: StoneState,
    pub position: Vec3,
}

/// Index of the closest at-rest stone inside the house that has not been
/// counted yet. On an exact distance tie the earlier stone wins.
fn find_closest(stones: &[StoneSummary], counted: &[usize], house: &House) -> Option<usize> {
    let mut closest: Option<(usize, f32)> = None;
    for (i, stone) in stones.iter().enumerate() {
        if counted.contains(&i) || stone.state != StoneState::AtRest {
            continue;
        }
        let distance = house.distance_to_center(stone.position);
        if distance > house.max_scoring_distance {
            continue;
        }
        if closest.is_none_or(|(_, best)| distance < best) {
            closest = Some((i, distance));
        }
    }
    closest.map(|(i, _)| i)
}

/// Which colour scored the end and how many points.
///
/// Counts the run of same-coloured stones closest to the button, stopping at
/// the first stone of the other colour. With no stone in the house the count
/// is zero and the colour carries no meaning.
pub fn calculate_points_scored(stones: &[StoneSummary], house: &House) -> (PlayerColor, u32) {
    let mut counted = Vec::with_capacity(NUM_STONES_IN_END);
    let Some(first) = find_closest(stones, &counted, house) else {
        return (PlayerColor::Red, 0);
    };
    let scoring = stones[first].color;
    counted.push(first);

    while let Some(next) = find_closest(stones, &counted, house) {
        if stones[next].color != scoring {
            break;
        }
        counted.push(next);
    }

    (scoring, counted.len() as u32)
}

/// Hammer for the next end: unchanged on a blank end, otherwise it goes to
/// the side that did not score.
pub fn next_hammer(previous: PlayerColor, end_score: (PlayerColor, u32)) -> PlayerColor {
    let (scoring, points) = end_score;
    if points == 0 {
        previous
    } else {
        scoring.opposite()
    }
}

/// Stones left to throw per colour, `(red, blue)`, once `stone_index` stones
/// have been delivered. The hammer side gets the extra stone on odd counts.
pub fn stones_remaining(stone_index: usize, hammer: PlayerColor) -> (u32, u32) {
    let left = NUM_STONES_IN_END.saturating_sub(stone_index) as u32;
    let (ceil, floor) = (left.div_ceil(2), left / 2);
    match hammer {
        PlayerColor::Red => (ceil, floor),
        PlayerColor::Blue => (floor, ceil),
    }
}

/// Split an end result into `(red_points, blue_points)`.
pub fn end_points(end_score: (PlayerColor, u32)) -> (u32, u32) {
    match end_score {
        (PlayerColor::Red, points) => (points, 0),
        (PlayerColor::Blue, points) => (0, points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(color: PlayerColor, distance: f32) -> StoneSummary {
        let house = House::default();
        StoneSummary {
            color,
            state: StoneState::AtRest,
            position: house.center + Vec3::new(distance, 0.0, 0.0),
        }
    }

    #[test]
    fn no_stones_scores_nothing() {
        assert_eq!(calculate_points_scored(&[], &House::default()).1, 0);
    }

    #[test]
    fn stones_outside_house_score_nothing() {
        let stones = [at(PlayerColor::Red, 3.0), at(PlayerColor::Blue, 2.5)];
        assert_eq!(calculate_points_scored(&stones, &House::default()).1, 0);
    }

    #[test]
    fn only_at_rest_stones_count() {
        let mut moving = at(PlayerColor::Blue, 0.1);
        moving.state = StoneState::InMotion;
        let mut dissolving = at(PlayerColor::Blue, 0.2);
        dissolving.state = StoneState::Dissolving;
        let stones = [moving, dissolving, at(PlayerColor::Red, 1.0)];
        assert_eq!(
            calculate_points_scored(&stones, &House::default()),
            (PlayerColor::Red, 1)
        );
    }

    #[test]
    fn closest_stone_wins_one_point() {
        let stones = [at(PlayerColor::Red, 1.2), at(PlayerColor::Blue, 0.5)];
        assert_eq!(
            calculate_points_scored(&stones, &House::default()),
            (PlayerColor::Blue, 1)
        );
    }

    #[test]
    fn run_stops_at_first_other_color() {
        let stones = [
            at(PlayerColor::Red, 0.3),
            at(PlayerColor::Red, 1.5),
            at(PlayerColor::Blue, 1.0),
            at(PlayerColor::Red, 0.6),
        ];
        assert_eq!(
            calculate_points_scored(&stones, &House::default()),
            (PlayerColor::Red, 2)
        );
    }

    #[test]
    fn boundary_is_inclusive() {
        let house = House::default();
        let on_edge = [at(PlayerColor::Blue, house.max_scoring_distance)];
        let beyond = [at(PlayerColor::Blue, house.max_scoring_distance + 0.001)];
        assert_eq!(calculate_points_scored(&on_edge, &house), (PlayerColor::Blue, 1));
        assert_eq!(calculate_points_scored(&beyond, &house).1, 0);
    }

    #[test]
    fn exact_tie_goes_to_first_in_order() {
        let stones = [at(PlayerColor::Blue, 0.5), at(PlayerColor::Red, -0.5)];
        assert_eq!(
            calculate_points_scored(&stones, &House::default()),
            (PlayerColor::Blue, 1)
        );
        let flipped = [stones[1], stones[0]];
        assert_eq!(
            calculate_points_scored(&flipped, &House::default()),
            (PlayerColor::Red, 1)
        );
    }

    #[test]
    fn eight_stone_end() {
        let stones: Vec<_> = (0..8).map(|i| at(PlayerColor::Blue, i as f32 * 0.2)).collect();
        assert_eq!(
            calculate_points_scored(&stones, &House::default()),
            (PlayerColor::Blue, 8)
        );
    }

    #[test]
    fn hammer_passes_to_non_scorer() {
        assert_eq!(
            next_hammer(PlayerColor::Red, (PlayerColor::Red, 2)),
            PlayerColor::Blue
        );
        assert_eq!(
            next_hammer(PlayerColor::Red, (PlayerColor::Blue, 1)),
            PlayerColor::Red
        );
        assert_eq!(
            next_hammer(PlayerColor::Blue, (PlayerColor::Red, 0)),
            PlayerColor::Blue
        );
    }

    #[test]
    fn remaining_stones_favor_hammer() {
        assert_eq!(stones_remaining(0, PlayerColor::Blue), (8, 8));
        assert_eq!(stones_remaining(1, PlayerColor::Blue), (7, 8));
        assert_eq!(stones_remaining(1, PlayerColor::Red), (8, 7));
        assert_eq!(stones_remaining(15, PlayerColor::Blue), (0, 1));
        assert_eq!(stones_remaining(16, PlayerColor::Red), (0, 0));
    }

    #[test]
    fn end_points_split() {
        assert_eq!(end_points((PlayerColor::Red, 3)), (3, 0));
        assert_eq!(end_points((PlayerColor::Blue, 2)), (0, 2));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn color() -> impl Strategy<Value = PlayerColor> {
            prop_oneof![Just(PlayerColor::Red), Just(PlayerColor::Blue)]
        }

        proptest! {
            #[test]
            fn blank_end_keeps_hammer(h in color(), c in color()) {
                prop_assert_eq!(next_hammer(h, (c, 0)), h);
            }

            #[test]
            fn scored_end_hands_hammer_to_other_side(h in color(), c in color(), n in 1u32..=8) {
                prop_assert_eq!(next_hammer(h, (c, n)), c.opposite());
            }

            #[test]
            fn nothing_in_house_scores_zero(
                distances in prop::collection::vec(2.0f32..10.0, 0..16),
                c in color(),
            ) {
                let stones: Vec<_> = distances.iter().map(|&d| at(c, d)).collect();
                prop_assert_eq!(calculate_points_scored(&stones, &House::default()).1, 0);
            }

            #[test]
            fn single_color_scores_every_stone_in_house(
                distances in prop::collection::vec(0.0f32..4.0, 1..16),
                c in color(),
            ) {
                let house = House::default();
                let stones: Vec<_> = distances.iter().map(|&d| at(c, d)).collect();
                let in_house = stones.iter().filter(|s| house.contains(s.position)).count() as u32;
                let (scoring, points) = calculate_points_scored(&stones, &house);
                prop_assert_eq!(points, in_house);
                if in_house > 0 {
                    prop_assert_eq!(scoring, c);
                }
            }

            #[test]
            fn remaining_always_sums_to_stones_left(index in 0usize..=16, h in color()) {
                let (red, blue) = stones_remaining(index, h);
                prop_assert_eq!((red + blue) as usize, NUM_STONES_IN_END - index);
                prop_assert!(red.abs_diff(blue) <= 1);
            }
        }
    }
}
