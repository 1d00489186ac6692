//! Validation error types.

use thiserror::Error;

use super::entities::{PlayerId, RoomId};

/// Rejected input. Validation errors are returned synchronously, never
/// retried, and never mutate state.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// Card code was empty or absent
    #[error("card code is empty")]
    EmptyCard,

    /// Chat message was empty or absent
    #[error("chat message is empty")]
    EmptyMessage,

    /// Player id was empty or absent
    #[error("player id is empty")]
    EmptyPlayer,

    /// Game id was empty or absent
    #[error("game id is empty")]
    EmptyGame,

    /// A game was requested for a room with no players
    #[error("room {0} has no players")]
    EmptyRoster(RoomId),

    /// Hit/stay arrived for a player whose turn it is not
    #[error("player {0} is not the current player")]
    OutOfTurn(PlayerId),
}
