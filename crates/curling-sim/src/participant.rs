//! A tokio task hosting one `GameManager` and the bots seated at it.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;

use curling_core::player::PlayerId;
use curling_match::{GameManager, MatchState, bot};

/// A mirror re-sends a command if the master has not answered after this long.
const RESEND_AFTER_SECS: f64 = 3.0;

pub struct Participant {
    name: &'static str,
    game: GameManager,
    seats: Vec<PlayerId>,
    inbound: Option<UnboundedReceiver<Vec<u8>>>,
    rng: StdRng,
    /// State a mirror last acted on, and when.
    awaiting: Option<(MatchState, f64)>,
}

impl Participant {
    pub fn new(
        name: &'static str,
        game: GameManager,
        seats: Vec<PlayerId>,
        inbound: Option<UnboundedReceiver<Vec<u8>>>,
        seed: u64,
    ) -> Self {
        Self {
            name,
            game,
            seats,
            inbound,
            rng: StdRng::seed_from_u64(seed),
            awaiting: None,
        }
    }

    /// Tick at `timestep` until the match is complete, then hand back the manager.
    pub async fn run(mut self, timestep: f32) -> GameManager {
        let mut interval = tokio::time::interval(Duration::from_secs_f32(timestep));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick(timestep);
            if self.game.is_match_complete() {
                tracing::info!(participant = self.name, clock = self.game.clock(), "Match finished");
                return self.game;
            }
        }
    }

    fn tick(&mut self, dt: f32) {
        self.drain_inbound();
        self.drive_bots();
        if self.game.is_master() {
            self.game.fixed_update(dt);
        }
        self.game.update(dt);
    }

    fn drain_inbound(&mut self) {
        let Some(rx) = self.inbound.as_mut() else {
            return;
        };
        while let Ok(bytes) = rx.try_recv() {
            if let Err(e) = self.game.receive(&bytes) {
                tracing::debug!(participant = self.name, error = %e, "Message rejected");
            }
        }
    }

    fn drive_bots(&mut self) {
        if self.waiting_for_master() {
            return;
        }
        for &seat in &self.seats {
            let Some(action) = bot::next_action(&self.game, seat, &mut self.rng) else {
                continue;
            };
            match self.game.perform(seat, action) {
                Ok(()) if !self.game.is_master() => {
                    self.awaiting = Some((self.game.state().clone(), self.game.clock()));
                },
                Ok(()) => {},
                Err(e) => tracing::debug!(participant = self.name, seat, error = %e, "Bot action refused"),
            }
        }
    }

    /// A mirror's command only takes effect once the master echoes the
    /// resulting state back.
    fn waiting_for_master(&self) -> bool {
        let Some((state, sent_at)) = &self.awaiting else {
            return false;
        };
        state == self.game.state() && self.game.clock() - sent_at < RESEND_AFTER_SECS
    }
}
