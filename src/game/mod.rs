//! Blackjack domain model.
//!
//! This module provides the entities the engine and stores exchange:
//! card codes, per-player turn states, player actions, game snapshots,
//! and the persisted result/leaderboard records.

pub mod entities;
pub mod errors;

pub use entities::{
    Card, DEALER, GameId, GameView, LeaderboardEntry, PlayerAction, PlayerEntry, PlayerId,
    PlayerState, ResultRecord, RoomId, shuffled_deck, standard_deck,
};
pub use errors::ValidationError;
