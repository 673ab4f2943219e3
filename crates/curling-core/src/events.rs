use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::player::{PlayerColor, PlayerId};
use crate::state::GameState;

/// Change notifications published by the match state machine for views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchEvent {
    GameStateChanged(GameState),
    CurrentPlayerChanged(PlayerId),
    CurlDirectionChanged(bool),
    EndNumberChanged {
        end: usize,
        hammer: PlayerColor,
    },
    NextStoneSpawned {
        red_remaining: u32,
        blue_remaining: u32,
    },
    EndScored {
        end: usize,
        red_points: u32,
        blue_points: u32,
        red_total: u32,
        blue_total: u32,
    },
    PlayerReadyChanged {
        red_ready: bool,
        blue_ready: bool,
    },
    MatchComplete {
        red_total: u32,
        blue_total: u32,
    },
}

/// Discriminant of a [`MatchEvent`], used to remember the latest event of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchEventKind {
    GameStateChanged,
    CurrentPlayerChanged,
    CurlDirectionChanged,
    EndNumberChanged,
    NextStoneSpawned,
    EndScored,
    PlayerReadyChanged,
    MatchComplete,
}

impl MatchEvent {
    pub fn kind(&self) -> MatchEventKind {
        match self {
            Self::GameStateChanged(_) => MatchEventKind::GameStateChanged,
            Self::CurrentPlayerChanged(_) => MatchEventKind::CurrentPlayerChanged,
            Self::CurlDirectionChanged(_) => MatchEventKind::CurlDirectionChanged,
            Self::EndNumberChanged { .. } => MatchEventKind::EndNumberChanged,
            Self::NextStoneSpawned { .. } => MatchEventKind::NextStoneSpawned,
            Self::EndScored { .. } => MatchEventKind::EndScored,
            Self::PlayerReadyChanged { .. } => MatchEventKind::PlayerReadyChanged,
            Self::MatchComplete { .. } => MatchEventKind::MatchComplete,
        }
    }
}

pub type SubscriptionId = u64;

type Listener = Box<dyn FnMut(&MatchEvent) + Send>;

/// Publish/subscribe registry for [`MatchEvent`]s.
///
/// A new subscriber is immediately replayed the most recent event of every
/// kind, so a view that attaches late still renders the current state.
/// Listeners must tolerate redundant notifications.
#[derive(Default)]
pub struct EventHub {
    next_id: SubscriptionId,
    listeners: Vec<(SubscriptionId, Listener)>,
    latest: BTreeMap<MatchEventKind, MatchEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, mut listener: F) -> SubscriptionId
    where
        F: FnMut(&MatchEvent) + Send + 'static,
    {
        for event in self.latest.values() {
            listener(event);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if no listener had that id.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn publish(&mut self, event: MatchEvent) {
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
        self.latest.insert(event.kind(), event);
    }

    #[cfg(test)]
    fn latest(&self, kind: MatchEventKind) -> Option<&MatchEvent> {
        self.latest.get(&kind)
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listeners.len())
            .field("latest", &self.latest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<MatchEvent>>>, impl FnMut(&MatchEvent) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |e: &MatchEvent| sink.lock().unwrap().push(e.clone()))
    }

    #[test]
    fn publish_reaches_every_listener() {
        let mut hub = EventHub::new();
        let (a, fa) = recorder();
        let (b, fb) = recorder();
        hub.subscribe(fa);
        hub.subscribe(fb);

        hub.publish(MatchEvent::CurlDirectionChanged(false));

        assert_eq!(a.lock().unwrap().len(), 1);
        assert_eq!(b.lock().unwrap().len(), 1);
    }

    #[test]
    fn late_subscriber_gets_latest_of_each_kind() {
        let mut hub = EventHub::new();
        hub.publish(MatchEvent::GameStateChanged(GameState::PlacingBroom));
        hub.publish(MatchEvent::GameStateChanged(GameState::AccuracyMeterActive));
        hub.publish(MatchEvent::CurrentPlayerChanged(7));

        let (seen, f) = recorder();
        hub.subscribe(f);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&MatchEvent::GameStateChanged(GameState::AccuracyMeterActive)));
        assert!(seen.contains(&MatchEvent::CurrentPlayerChanged(7)));
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let mut hub = EventHub::new();
        let (seen, f) = recorder();
        let id = hub.subscribe(f);
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));

        hub.publish(MatchEvent::CurlDirectionChanged(true));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn latest_tracks_most_recent_value() {
        let mut hub = EventHub::new();
        hub.publish(MatchEvent::PlayerReadyChanged {
            red_ready: true,
            blue_ready: false,
        });
        hub.publish(MatchEvent::PlayerReadyChanged {
            red_ready: true,
            blue_ready: true,
        });
        assert_eq!(
            hub.latest(MatchEventKind::PlayerReadyChanged),
            Some(&MatchEvent::PlayerReadyChanged {
                red_ready: true,
                blue_ready: true,
            })
        );
        assert!(hub.latest(MatchEventKind::EndScored).is_none());
    }
}
