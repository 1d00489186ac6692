//! Persistence and event abstraction.
//!
//! One capability-set contract (game, room, result and chat sub-stores plus
//! an event surface) implemented by two structurally different backends:
//! an in-process [`MemoryStore`] and a Redis-backed [`RedisStore`] shared by
//! multiple process instances. Both must behave identically; the shared
//! contract suite in `tests/store_contract.rs` runs the same assertions
//! against each.

pub mod errors;
pub mod memory;
pub mod redis;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis::{RedisConfig, RedisStore};

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::{
    events::GameEvent,
    game::{Card, GameId, LeaderboardEntry, PlayerAction, PlayerId, PlayerState, ResultRecord},
};

/// Per-game persistent state: deck, hands and turn states.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Allocate a strictly increasing unique game id (`"1"`, `"2"`, ...).
    async fn post_game(&self) -> StoreResult<GameId>;

    /// Number of cards remaining in the game's deck.
    async fn count_deck(&self, game: &str) -> StoreResult<usize>;

    /// Replace the game's deck wholesale, preserving draw order: the last
    /// element of `cards` is drawn first.
    async fn set_deck(&self, game: &str, cards: &[Card]) -> StoreResult<()>;

    /// A player's hand, most-recently-drawn first. Unknown players have an
    /// empty hand.
    async fn get_player_cards(&self, game: &str, player: &str) -> StoreResult<Vec<Card>>;

    /// Snapshot of every player's recorded turn state.
    async fn get_player_states(&self, game: &str)
    -> StoreResult<HashMap<PlayerId, PlayerState>>;

    /// Push a card onto a player's hand directly. Fails with
    /// [`ValidationError::EmptyCard`] (and performs no mutation) when the
    /// card code is empty.
    ///
    /// [`ValidationError::EmptyCard`]: crate::game::ValidationError::EmptyCard
    async fn post_player_card(&self, game: &str, player: &str, card: Card) -> StoreResult<()>;

    /// Upsert a player's turn state. Always emits a state-change event,
    /// even when the value is unchanged (last-writer-wins).
    async fn set_player_state(
        &self,
        game: &str,
        player: &str,
        state: PlayerState,
    ) -> StoreResult<()>;

    /// Atomically pop one card from the shared deck and push it onto the
    /// player's hand. This is the only operation needing cross-process
    /// exclusivity: on the distributed backend it is a single `RPOPLPUSH`,
    /// so two processes can never draw the same card. Returns `None` when
    /// the deck is empty.
    async fn draw_card(&self, game: &str, player: &str) -> StoreResult<Option<Card>>;
}

/// Room membership and the room's active-game pointer.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Add a player to the room roster. Set semantics: re-adding a present
    /// player is a no-op.
    async fn add_room_player(&self, room: &str, player: &str) -> StoreResult<()>;

    /// Roster of the room, sorted for deterministic iteration.
    async fn get_room_players(&self, room: &str) -> StoreResult<Vec<PlayerId>>;

    /// Point the room at its active game. Last write wins; the pointer is
    /// reassigned, never cleared.
    async fn set_room_game(&self, room: &str, game: &str) -> StoreResult<()>;

    async fn get_room_game(&self, room: &str) -> StoreResult<Option<GameId>>;
}

/// Append-only game results and the win-count ranking.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn push_result(&self, record: &ResultRecord) -> StoreResult<()>;

    /// Page through the result ledger in append order.
    async fn get_results(&self, skip: usize, limit: usize) -> StoreResult<Vec<ResultRecord>>;

    async fn incr_player_wins(&self, player: &str) -> StoreResult<()>;

    /// Full ranking, descending by win count.
    async fn get_leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>>;

    async fn get_player_wins(&self, player: &str) -> StoreResult<u64>;
}

/// The global chat log.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append a chat message. Fails with [`ValidationError::EmptyMessage`]
    /// (and performs no mutation) when the message is empty.
    ///
    /// [`ValidationError::EmptyMessage`]: crate::game::ValidationError::EmptyMessage
    async fn push_global_chat(&self, message: &str) -> StoreResult<()>;

    async fn get_global_chat(&self) -> StoreResult<Vec<String>>;
}

/// Event surface of a store.
///
/// Every mutation is observable here irrespective of which process performed
/// the write. Delivery is FIFO per publishing process but not across
/// processes; consumers must re-read the store before acting.
#[async_trait]
pub trait EventHub: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<GameEvent>;

    /// Publish an engine-derived action reminder through the same
    /// cross-process path store mutations travel. No persistence.
    async fn post_action_reminder(
        &self,
        game: &str,
        player: &str,
        actions: &[PlayerAction],
    ) -> StoreResult<()>;
}

/// The umbrella contract the engine is injected with.
#[async_trait]
pub trait Store: GameStore + RoomStore + ResultStore + ChatStore + EventHub {
    /// Discard all state. Test/reset tooling only; production deployments
    /// never call this.
    async fn reset(&self) -> StoreResult<()>;
}
