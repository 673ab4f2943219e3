use serde::Serialize;

use curling_core::player::PlayerColor;
use curling_match::GameManager;

use crate::config::SimMode;
use crate::link::LinkStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndLine {
    pub end: usize,
    pub red: u32,
    pub blue: u32,
}

/// How well the mirror tracked the master in a networked run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorReport {
    /// Mirror's match state is byte-identical to the master's.
    pub converged: bool,
    pub downlink: LinkStats,
    pub uplink: LinkStats,
}

/// Final scoreboard printed by the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub mode: SimMode,
    pub seed: u64,
    pub red_player: Option<String>,
    pub blue_player: Option<String>,
    pub ends: Vec<EndLine>,
    pub red_total: u32,
    pub blue_total: u32,
    /// `None` on a tie.
    pub winner: Option<PlayerColor>,
    pub match_secs: f64,
    pub mirror: Option<MirrorReport>,
}

impl Report {
    pub fn new(mode: SimMode, seed: u64, master: &GameManager, mirror: Option<MirrorReport>) -> Self {
        let name_of = |color| {
            master
                .player_of(color)
                .and_then(|id| master.player(id))
                .map(|p| p.display_name.clone())
        };
        let ends = master
            .end_scores()
            .iter()
            .enumerate()
            .map(|(i, &(red, blue))| EndLine { end: i + 1, red, blue })
            .collect();
        let (red_total, blue_total) = master.totals();
        Self {
            mode,
            seed,
            red_player: name_of(PlayerColor::Red),
            blue_player: name_of(PlayerColor::Blue),
            ends,
            red_total,
            blue_total,
            winner: winner(red_total, blue_total),
            match_secs: master.clock(),
            mirror,
        }
    }
}

fn winner(red_total: u32, blue_total: u32) -> Option<PlayerColor> {
    match red_total.cmp(&blue_total) {
        std::cmp::Ordering::Greater => Some(PlayerColor::Red),
        std::cmp::Ordering::Less => Some(PlayerColor::Blue),
        std::cmp::Ordering::Equal => None,
    }
}
