//! Master and mirror kept in step over an in-memory link, with a bot in
//! each seat.

#[allow(dead_code)]
mod common;

use common::Session;
use curling_core::state::GameState;
use curling_match::MatchConfig;

fn end_reached(s: &Session, end: usize) -> bool {
    s.master.end_number() == end && s.master.game_state() == GameState::EndOfEnd
}

#[test]
fn mirror_starts_in_step_with_master() {
    let session = Session::new(MatchConfig::default(), 1);
    assert_eq!(session.master.game_state(), GameState::YourTurnDialogActive);
    assert_eq!(session.mirror.state(), session.master.state());
    // Player 2 throws first and is seated at the mirror.
    assert_eq!(session.mirror.current_player(), Some(2));
}

#[test]
fn bots_play_an_end_across_the_link() {
    let mut session = Session::new(MatchConfig::default(), 7);
    session.run_until(900.0, |s| end_reached(s, 1));

    // Let playback settle on the last positions.
    session.idle(1.0);
    assert_eq!(session.mirror.state(), session.master.state());
    assert_eq!(
        session.mirror.serialize_state().unwrap(),
        session.master.serialize_state().unwrap()
    );
    assert!(session.snapshots_delivered > 0);

    let truth: Vec<_> = session.master.stones().map(|s| (s.state(), s.position())).collect();
    let mirrored: Vec<_> = session.mirror.stones().map(|s| (s.state(), s.position())).collect();
    assert_eq!(truth.len(), mirrored.len());
    for (i, ((state, pos), (mirror_state, mirror_pos))) in truth.iter().zip(&mirrored).enumerate() {
        assert_eq!(state, mirror_state, "stone {i} state");
        if state.is_in_play() {
            assert!(
                pos.distance(*mirror_pos) < 0.05,
                "stone {i} at {pos} on master but {mirror_pos} on mirror"
            );
        }
    }
    assert_eq!(
        session.mirror.most_recent_score_info(),
        session.master.most_recent_score_info()
    );
}

#[test]
fn next_end_starts_on_both_sides() {
    let mut session = Session::new(MatchConfig::default(), 21);
    session.run_until(900.0, |s| end_reached(s, 1));
    session.run_until(30.0, |s| s.master.end_number() == 2);

    assert_eq!(session.mirror.end_number(), 2);
    assert_eq!(session.mirror.stone_index(), 0);
    assert_eq!(session.mirror.stones().count(), 1);
    assert_eq!(session.mirror.state(), session.master.state());
}
