//! Typed change notifications and the broadcast bus they travel on.
//!
//! Every store mutation and every engine-derived reminder is published as a
//! [`GameEvent`] on one [`EventBus`] wired at startup. Events are triggers,
//! not data: subscribers re-read the authoritative store before acting, so
//! at-least-once and cross-process-reordered delivery is safe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
};

use crate::game::{Card, GameId, PlayerAction, PlayerId, PlayerState};

/// Default broadcast capacity. Laggards drop their oldest events; the next
/// event re-triggers convergence, so a dropped trigger is recoverable.
const DEFAULT_CAPACITY: usize = 256;

/// A change notification. Each card-push and state-change identifies exactly
/// one `(game, player)` pair.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A card landed on a player's hand (dealt or drawn).
    CardPushed {
        #[serde(rename = "gameId")]
        game: GameId,
        player: PlayerId,
        card: Card,
    },
    /// A player's recorded turn state changed.
    StateChanged {
        #[serde(rename = "gameId")]
        game: GameId,
        player: PlayerId,
        state: PlayerState,
    },
    /// A message was appended to the global chat.
    ChatPosted { message: String },
    /// The engine is waiting on a hit/stay decision from a player.
    ActionReminder {
        #[serde(rename = "gameId")]
        game: GameId,
        player: PlayerId,
        actions: Vec<PlayerAction>,
    },
}

impl GameEvent {
    /// Broadcast channel this event kind is republished on by the
    /// distributed backend.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::CardPushed { .. } => "card",
            Self::StateChanged { .. } => "playerstate",
            Self::ChatPosted { .. } => "globalchat:created",
            Self::ActionReminder { .. } => "action:reminder",
        }
    }
}

/// Single process-wide fan-out channel for [`GameEvent`]s.
///
/// Constructed once at startup and handed to the store, the engine, and any
/// notifier (dependency injection, no implicit singletons). All subscribers
/// see every event; there is no subscriber priority.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<GameEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers. A bus with no
    /// subscribers silently drops the event.
    pub fn publish(&self, event: GameEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Outward seam for realtime delivery to connected clients.
///
/// The transport mechanics (websocket framing, liveness pings) live outside
/// this crate; the engine only guarantees that every event reaches the bus.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: GameEvent);
}

/// Pump every bus event into a [`Notifier`] until the bus closes.
pub fn spawn_notifier(bus: &EventBus, notifier: Arc<dyn Notifier>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => notifier.deliver(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("notifier lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
