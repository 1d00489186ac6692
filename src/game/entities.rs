use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Games are identified by decimal strings allocated by the store
/// (`"1"`, `"2"`, ...).
pub type GameId = String;

/// Players are identified by the name they joined a room with.
pub type PlayerId = String;

/// Rooms are identified by an arbitrary caller-chosen string.
pub type RoomId = String;

/// The reserved player id of the house. The dealer participates in every
/// game and acts only after all other players have finished.
pub const DEALER: &str = "dealer";

/// A card code: rank character followed by suit character (`"AS"`, `"TD"`,
/// `"9H"`). Ten is written `T` so every code is exactly two characters.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Card(String);

impl Card {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Blackjack value of this card: Ace is fixed at 11, face cards and
    /// ten count 10, numerals count their face value. Unrecognized codes
    /// count 0 so a malformed card can never bust a player on its own.
    pub fn value(&self) -> u32 {
        match self.0.chars().next() {
            Some('A') => 11,
            Some('T' | 'J' | 'Q' | 'K') => 10,
            Some(c) => c.to_digit(10).unwrap_or(0),
            None => 0,
        }
    }
}

impl From<&str> for Card {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

const RANKS: [char; 13] = [
    'A', '2', '3', '4', '5', '6', '7', '8', '9', 'T', 'J', 'Q', 'K',
];
const SUITS: [char; 4] = ['S', 'H', 'D', 'C'];

/// A full 52-card deck in a fixed reference order.
pub fn standard_deck() -> Vec<Card> {
    let mut cards = Vec::with_capacity(52);
    for suit in SUITS {
        for rank in RANKS {
            cards.push(Card(format!("{rank}{suit}")));
        }
    }
    cards
}

/// A uniformly shuffled 52-card deck, ready for [`set_deck`].
///
/// [`set_deck`]: crate::store::GameStore::set_deck
pub fn shuffled_deck() -> Vec<Card> {
    let mut cards = standard_deck();
    cards.shuffle(&mut rand::rng());
    cards
}

/// Per-player turn state. `Bust`, `Stay` and `Win` are terminal for the
/// remainder of the game.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// Holds fewer than two cards; the engine keeps dealing.
    Dealing,
    /// Dealt in, waiting to be promoted to the active turn.
    Waiting,
    /// The one player whose action is pending.
    Current,
    /// Hand value exceeded 21.
    Bust,
    /// Stopped drawing voluntarily (or automatically, for the dealer).
    Stay,
    /// Declared a winner by the end-of-game sweep.
    Win,
}

impl PlayerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Bust | Self::Stay | Self::Win)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dealing => "dealing",
            Self::Waiting => "waiting",
            Self::Current => "current",
            Self::Bust => "bust",
            Self::Stay => "stay",
            Self::Win => "win",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dealing" => Some(Self::Dealing),
            "waiting" => Some(Self::Waiting),
            "current" => Some(Self::Current),
            "bust" => Some(Self::Bust),
            "stay" => Some(Self::Stay),
            "win" => Some(Self::Win),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two decisions a player can be reminded to make.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerAction {
    Hit,
    Stay,
}

impl PlayerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stay => "stay",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hit" => Some(Self::Hit),
            "stay" => Some(Self::Stay),
            _ => None,
        }
    }
}

/// One player's slice of a [`GameView`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PlayerEntry {
    /// Hand in most-recently-drawn-first order.
    pub cards: Vec<Card>,
    pub state: PlayerState,
    pub score: u32,
}

/// Snapshot of a whole game, assembled from the authoritative store.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameView {
    pub id: GameId,
    pub deck_count: usize,
    pub players: HashMap<PlayerId, PlayerEntry>,
}

/// Append-only record of a finished game.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResultRecord {
    #[serde(rename = "gameId")]
    pub game: GameId,
    pub scores: HashMap<PlayerId, u32>,
}

/// One row of the win-count ranking, ordered descending by `wins`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub player: PlayerId,
    pub wins: u64,
}
