use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedReceiver;

use curling_core::net::channel::{ChannelAuthority, Outbound};
use curling_core::test_helpers::make_players;
use curling_match::{GameManager, MatchConfig, bot};

pub const DT: f32 = 0.02;

/// Seat both players on one manager with their brooms; the match starts on
/// the last registration when `gm` is the master.
pub fn seat_players(gm: &mut GameManager) {
    for p in make_players(2) {
        let id = p.id;
        gm.register_player(p).unwrap();
        gm.register_broom(id).unwrap();
    }
}

/// Bot against bot on a single local manager.
pub fn local_match(config: MatchConfig) -> GameManager {
    let mut gm = GameManager::local(config);
    seat_players(&mut gm);
    gm
}

/// Let every seated bot act once, then advance one fixed step and one frame.
pub fn local_tick(gm: &mut GameManager, rng: &mut StdRng) {
    for id in [1, 2] {
        if let Some(action) = bot::next_action(gm, id, rng) {
            gm.perform(id, action).unwrap();
        }
    }
    gm.fixed_update(DT);
    gm.update(DT);
}

/// A master seating player 1 and a mirror seating player 2, joined by an
/// in-memory link that delivers everything immediately.
pub struct Session {
    pub master: GameManager,
    pub mirror: GameManager,
    master_out: UnboundedReceiver<Outbound>,
    mirror_out: UnboundedReceiver<Outbound>,
    rng: StdRng,
    /// Unreliable messages delivered to the mirror.
    pub snapshots_delivered: usize,
}

impl Session {
    pub fn new(config: MatchConfig, seed: u64) -> Self {
        let (master_auth, master_out) = ChannelAuthority::channel(true);
        let (mirror_auth, mirror_out) = ChannelAuthority::channel(false);
        let mut mirror = GameManager::new(config.clone(), Box::new(mirror_auth.with_local_player(2)));
        let mut master = GameManager::new(config, Box::new(master_auth.with_local_player(1)));
        seat_players(&mut mirror);
        seat_players(&mut master);
        let mut session = Self {
            master,
            mirror,
            master_out,
            mirror_out,
            rng: StdRng::seed_from_u64(seed),
            snapshots_delivered: 0,
        };
        session.pump();
        session
    }

    /// Deliver queued traffic in both directions until the link is quiet.
    pub fn pump(&mut self) {
        loop {
            let mut moved = false;
            while let Ok(out) = self.master_out.try_recv() {
                if !out.reliable {
                    self.snapshots_delivered += 1;
                }
                self.mirror.receive(&out.bytes).unwrap();
                moved = true;
            }
            while let Ok(out) = self.mirror_out.try_recv() {
                self.master.receive(&out.bytes).unwrap();
                moved = true;
            }
            if !moved {
                return;
            }
        }
    }

    /// Each side's bot drives its own seat, then both advance one tick.
    pub fn tick(&mut self) {
        if let Some(action) = bot::next_action(&self.master, 1, &mut self.rng) {
            self.master.perform(1, action).unwrap();
        }
        self.pump();
        if let Some(action) = bot::next_action(&self.mirror, 2, &mut self.rng) {
            self.mirror.perform(2, action).unwrap();
        }
        self.pump();

        self.master.fixed_update(DT);
        self.master.update(DT);
        self.mirror.update(DT);
        self.pump();
    }

    /// Advance both sides without any player input.
    pub fn idle(&mut self, secs: f32) {
        for _ in 0..(secs / DT) as usize {
            self.master.fixed_update(DT);
            self.master.update(DT);
            self.mirror.update(DT);
            self.pump();
        }
    }

    pub fn run_until(&mut self, max_secs: f32, done: impl Fn(&Self) -> bool) {
        for _ in 0..(max_secs / DT) as usize {
            if done(self) {
                return;
            }
            self.tick();
        }
        assert!(done(self), "condition not reached within {max_secs}s");
    }
}
