//! Single-process in-memory backend.
//!
//! All state lives behind one `std::sync::Mutex` that is never held across
//! an await, so every operation, including the pop-and-push draw, is
//! atomic with respect to concurrent callers in this process. Change events
//! broadcast on the injected [`EventBus`] immediately after the mutation.

use async_trait::async_trait;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::broadcast;

use super::{
    ChatStore, EventHub, GameStore, ResultStore, RoomStore, Store,
    errors::StoreResult,
};
use crate::{
    events::{EventBus, GameEvent},
    game::{
        Card, GameId, LeaderboardEntry, PlayerAction, PlayerId, PlayerState, ResultRecord, RoomId,
        ValidationError,
    },
};

#[derive(Default)]
struct MemoryState {
    games_issued: u64,
    decks: HashMap<GameId, Vec<Card>>,
    hands: HashMap<GameId, HashMap<PlayerId, Vec<Card>>>,
    states: HashMap<GameId, HashMap<PlayerId, PlayerState>>,
    room_players: HashMap<RoomId, BTreeSet<PlayerId>>,
    room_games: HashMap<RoomId, GameId>,
    chat: Vec<String>,
    results: Vec<ResultRecord>,
    wins: HashMap<PlayerId, u64>,
}

/// In-process store backend.
pub struct MemoryStore {
    bus: EventBus,
    inner: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            inner: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock means a panic mid-mutation elsewhere; the maps are
        // still structurally valid, so keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(EventBus::default())
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn post_game(&self) -> StoreResult<GameId> {
        let mut state = self.lock();
        state.games_issued += 1;
        Ok(state.games_issued.to_string())
    }

    async fn count_deck(&self, game: &str) -> StoreResult<usize> {
        Ok(self.lock().decks.get(game).map_or(0, Vec::len))
    }

    async fn set_deck(&self, game: &str, cards: &[Card]) -> StoreResult<()> {
        self.lock().decks.insert(game.to_string(), cards.to_vec());
        Ok(())
    }

    async fn get_player_cards(&self, game: &str, player: &str) -> StoreResult<Vec<Card>> {
        Ok(self
            .lock()
            .hands
            .get(game)
            .and_then(|hands| hands.get(player))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_player_states(
        &self,
        game: &str,
    ) -> StoreResult<HashMap<PlayerId, PlayerState>> {
        Ok(self.lock().states.get(game).cloned().unwrap_or_default())
    }

    async fn post_player_card(&self, game: &str, player: &str, card: Card) -> StoreResult<()> {
        if card.code().is_empty() {
            return Err(ValidationError::EmptyCard.into());
        }
        {
            let mut state = self.lock();
            state
                .hands
                .entry(game.to_string())
                .or_default()
                .entry(player.to_string())
                .or_default()
                .insert(0, card.clone());
        }
        self.bus.publish(GameEvent::CardPushed {
            game: game.to_string(),
            player: player.to_string(),
            card,
        });
        Ok(())
    }

    async fn set_player_state(
        &self,
        game: &str,
        player: &str,
        state: PlayerState,
    ) -> StoreResult<()> {
        self.lock()
            .states
            .entry(game.to_string())
            .or_default()
            .insert(player.to_string(), state);
        self.bus.publish(GameEvent::StateChanged {
            game: game.to_string(),
            player: player.to_string(),
            state,
        });
        Ok(())
    }

    async fn draw_card(&self, game: &str, player: &str) -> StoreResult<Option<Card>> {
        let drawn = {
            let mut state = self.lock();
            let Some(card) = state.decks.get_mut(game).and_then(Vec::pop) else {
                return Ok(None);
            };
            state
                .hands
                .entry(game.to_string())
                .or_default()
                .entry(player.to_string())
                .or_default()
                .insert(0, card.clone());
            card
        };
        self.bus.publish(GameEvent::CardPushed {
            game: game.to_string(),
            player: player.to_string(),
            card: drawn.clone(),
        });
        Ok(Some(drawn))
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn add_room_player(&self, room: &str, player: &str) -> StoreResult<()> {
        self.lock()
            .room_players
            .entry(room.to_string())
            .or_default()
            .insert(player.to_string());
        Ok(())
    }

    async fn get_room_players(&self, room: &str) -> StoreResult<Vec<PlayerId>> {
        Ok(self
            .lock()
            .room_players
            .get(room)
            .map(|players| players.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_room_game(&self, room: &str, game: &str) -> StoreResult<()> {
        self.lock()
            .room_games
            .insert(room.to_string(), game.to_string());
        Ok(())
    }

    async fn get_room_game(&self, room: &str) -> StoreResult<Option<GameId>> {
        Ok(self.lock().room_games.get(room).cloned())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn push_result(&self, record: &ResultRecord) -> StoreResult<()> {
        self.lock().results.push(record.clone());
        Ok(())
    }

    async fn get_results(&self, skip: usize, limit: usize) -> StoreResult<Vec<ResultRecord>> {
        Ok(self
            .lock()
            .results
            .iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn incr_player_wins(&self, player: &str) -> StoreResult<()> {
        *self.lock().wins.entry(player.to_string()).or_default() += 1;
        Ok(())
    }

    async fn get_leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        let mut entries: Vec<LeaderboardEntry> = self
            .lock()
            .wins
            .iter()
            .map(|(player, wins)| LeaderboardEntry {
                player: player.clone(),
                wins: *wins,
            })
            .collect();
        // Descending by win count, ties broken by name for stable output.
        entries.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.player.cmp(&b.player)));
        Ok(entries)
    }

    async fn get_player_wins(&self, player: &str) -> StoreResult<u64> {
        Ok(self.lock().wins.get(player).copied().unwrap_or(0))
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn push_global_chat(&self, message: &str) -> StoreResult<()> {
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        self.lock().chat.push(message.to_string());
        self.bus.publish(GameEvent::ChatPosted {
            message: message.to_string(),
        });
        Ok(())
    }

    async fn get_global_chat(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock().chat.clone())
    }
}

#[async_trait]
impl EventHub for MemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.bus.subscribe()
    }

    async fn post_action_reminder(
        &self,
        game: &str,
        player: &str,
        actions: &[PlayerAction],
    ) -> StoreResult<()> {
        self.bus.publish(GameEvent::ActionReminder {
            game: game.to_string(),
            player: player.to_string(),
            actions: actions.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn reset(&self) -> StoreResult<()> {
        *self.lock() = MemoryState::default();
        Ok(())
    }
}
