//! # Blackjack Engine
//!
//! A reactive multiplayer blackjack core. Per-player state is advanced by an
//! event-driven engine rather than by a central loop that owns the game: a
//! mutation (a card dealt, a player acting) is written to the store, the
//! store emits a change event, and the engine reacts with an idempotent
//! convergence pass that may write further mutations until no player
//! requires automatic action.
//!
//! ## Architecture
//!
//! - [`game`]: domain entities: card codes, the six-state per-player turn
//!   machine (`Dealing → Waiting → Current → Bust/Stay/Win`), snapshots and
//!   persisted records.
//! - [`store`]: one capability contract (game, room, result and chat
//!   sub-stores plus an event surface) behind two interchangeable backends:
//!   an in-process [`MemoryStore`] and a distributed [`RedisStore`] shared
//!   by multiple instances. The shared deck's only cross-process race is
//!   closed by the store's atomic pop-and-push draw; there is no per-game
//!   lock anywhere.
//! - [`events`]: the typed [`EventBus`] every mutation and reminder fans out
//!   on, plus the [`Notifier`] seam toward connected clients.
//! - [`engine`]: the [`GameEngine`] convergence passes: action selection,
//!   state re-derivation, coalesced deal pacing and the end-of-game sweep.
//!
//! Events are triggers, not data: every decision re-reads the authoritative
//! store, so at-least-once and cross-process-reordered delivery is safe.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blackjack_engine::{EngineConfig, EventBus, GameEngine, MemoryStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::default();
//! let store = Arc::new(MemoryStore::new(bus.clone()));
//! let engine = GameEngine::new(store, bus, EngineConfig::default());
//! let _listener = engine.spawn();
//!
//! engine.join_room("lobby", "alice").await?;
//! let game = engine.start_game("lobby").await?;
//! # let _ = game;
//! # Ok(())
//! # }
//! ```

/// Domain entities and validation errors.
pub mod game;
pub use game::{
    Card, DEALER, GameId, GameView, LeaderboardEntry, PlayerAction, PlayerEntry, PlayerId,
    PlayerState, ResultRecord, RoomId, ValidationError,
};

/// Persistence and event abstraction with two backends.
pub mod store;
pub use store::{
    ChatStore, EventHub, GameStore, MemoryStore, RedisConfig, RedisStore, ResultStore, RoomStore,
    Store, StoreError, StoreResult,
};

/// Typed change notifications and the broadcast bus.
pub mod events;
pub use events::{EventBus, GameEvent, Notifier, spawn_notifier};

/// The reactive turn-resolution engine.
pub mod engine;
pub use engine::{EngineConfig, GameEngine, rules};
