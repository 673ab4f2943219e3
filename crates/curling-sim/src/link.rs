//! One direction of a simulated network link.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use curling_core::net::channel::Outbound;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    pub latency: Duration,
    /// Probability of dropping an unreliable message, in `[0, 1]`.
    pub loss: f64,
    pub seed: u64,
}

impl LinkConfig {
    pub fn new(latency_ms: u64, loss: f64, seed: u64) -> Self {
        Self {
            latency: Duration::from_millis(latency_ms),
            loss: if loss.is_finite() { loss.clamp(0.0, 1.0) } else { 0.0 },
            seed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub delivered: usize,
    pub dropped: usize,
}

/// Carry messages from `rx` to `tx` after the configured latency, in order,
/// dropping a fraction of the unreliable ones. Runs until the sender side
/// closes and the queue is flushed, or the receiving peer goes away.
pub async fn run_link(
    name: &'static str,
    config: LinkConfig,
    mut rx: UnboundedReceiver<Outbound>,
    tx: UnboundedSender<Vec<u8>>,
) -> LinkStats {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut queue: VecDeque<(Instant, Vec<u8>)> = VecDeque::new();
    let mut stats = LinkStats::default();
    let mut open = true;

    while open || !queue.is_empty() {
        let due = queue.front().map(|(at, _)| *at);
        tokio::select! {
            msg = rx.recv(), if open => match msg {
                Some(out) if !out.reliable && rng.random_bool(config.loss) => {
                    stats.dropped += 1;
                    tracing::trace!(link = name, "Dropped snapshot");
                },
                Some(out) => queue.push_back((Instant::now() + config.latency, out.bytes)),
                None => open = false,
            },
            _ = tokio::time::sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                let Some((_, bytes)) = queue.pop_front() else { continue };
                if tx.send(bytes).is_err() {
                    tracing::debug!(link = name, pending = queue.len(), "Peer gone, closing link");
                    break;
                }
                stats.delivered += 1;
            },
        }
    }

    tracing::debug!(link = name, delivered = stats.delivered, dropped = stats.dropped, "Link closed");
    stats
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn outbound(reliable: bool, tag: u8) -> Outbound {
        Outbound {
            route: curling_core::net::channel::Route::All,
            reliable,
            bytes: vec![tag],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_in_order_after_latency() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let link = tokio::spawn(run_link("test", LinkConfig::new(100, 0.0, 1), in_rx, out_tx));

        let sent_at = Instant::now();
        for tag in 0..5 {
            in_tx.send(outbound(tag % 2 == 0, tag)).unwrap();
        }
        let first = out_rx.recv().await.unwrap();
        assert_eq!(first, vec![0]);
        assert!(sent_at.elapsed() >= Duration::from_millis(100));
        for tag in 1..5 {
            assert_eq!(out_rx.recv().await.unwrap(), vec![tag]);
        }

        drop(in_tx);
        let stats = link.await.unwrap();
        assert_eq!(stats, LinkStats { delivered: 5, dropped: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn total_loss_only_drops_unreliable() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let link = tokio::spawn(run_link("test", LinkConfig::new(10, 1.0, 1), in_rx, out_tx));

        for tag in 0..6 {
            in_tx.send(outbound(tag < 2, tag)).unwrap();
        }
        drop(in_tx);
        let stats = link.await.unwrap();
        assert_eq!(stats, LinkStats { delivered: 2, dropped: 4 });
        assert_eq!(out_rx.recv().await.unwrap(), vec![0]);
        assert_eq!(out_rx.recv().await.unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_when_peer_goes_away() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let link = tokio::spawn(run_link("test", LinkConfig::new(10, 0.0, 1), in_rx, out_tx));
        drop(out_rx);
        in_tx.send(outbound(true, 0)).unwrap();
        let stats = link.await.unwrap();
        assert_eq!(stats.delivered, 0);
    }

    #[test]
    fn loss_is_sanitised() {
        assert_eq!(LinkConfig::new(0, 2.0, 0).loss, 1.0);
        assert_eq!(LinkConfig::new(0, f64::NAN, 0).loss, 0.0);
    }
}
