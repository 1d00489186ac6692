//! Pure turn-resolution rules.
//!
//! Everything here is a function of snapshots read from the authoritative
//! store; nothing touches I/O. The engine re-derives every decision from
//! these rules on each convergence pass, which is what makes the passes
//! idempotent and safe under reordered event delivery.

use std::collections::HashMap;

use crate::game::{Card, DEALER, PlayerId, PlayerState};

/// The score a hand must not exceed.
pub const BLACKJACK: u32 = 21;

/// The score at or above which the dealer automatically stops drawing.
pub const DEALER_STAY: u32 = 17;

/// Hand value: additive per card, order-invariant. Ace is fixed at 11 with
/// no soft/hard re-valuation, so `[AD, TH, JS]` sums to 31. Empty hand is 0.
pub fn value_for_cards(cards: &[Card]) -> u32 {
    cards.iter().map(Card::value).sum()
}

/// True iff no player's state is `Dealing`, `Waiting` or `Current`. An
/// empty snapshot counts as ended.
pub fn is_game_ended(states: &HashMap<PlayerId, PlayerState>) -> bool {
    states.values().all(|state| state.is_terminal())
}

/// End-of-game winner computation.
///
/// Players not in `Bust` are candidates; if the dealer did not bust, the
/// candidates are narrowed to those strictly outscoring the dealer (which
/// removes the dealer itself). An empty candidate set defaults to the
/// dealer alone, so the result is never empty.
pub fn get_winners(
    states: &HashMap<PlayerId, PlayerState>,
    scores: &HashMap<PlayerId, u32>,
) -> Vec<PlayerId> {
    let mut candidates: Vec<PlayerId> = states
        .iter()
        .filter(|(_, state)| **state != PlayerState::Bust)
        .map(|(player, _)| player.clone())
        .collect();

    let dealer_bust = states.get(DEALER) == Some(&PlayerState::Bust);
    if !dealer_bust {
        let dealer_score = scores.get(DEALER).copied().unwrap_or(0);
        candidates.retain(|player| scores.get(player).copied().unwrap_or(0) > dealer_score);
    }

    if candidates.is_empty() {
        return vec![DEALER.to_string()];
    }
    candidates.sort();
    candidates
}

/// What a card-push convergence pass should do for one player.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateDecision {
    /// Recorded state already matches the derived one; re-run the action
    /// loop so the pass still makes progress.
    Keep,
    /// Write this state (it differs from the recorded one).
    Transition(PlayerState),
    /// Dealer reached exactly 21: end the game immediately instead of a
    /// plain state write.
    FinishGame,
}

/// Derive the target state for a player from authoritative data.
///
/// Priority: fewer than two cards means still dealing; a score over 21 is a
/// bust; the dealer stays automatically at 17 or above (ending the game at
/// exactly 21); a dealt-in `Dealing` player graduates to `Waiting`.
pub fn next_player_state(
    player: &str,
    card_count: usize,
    score: u32,
    recorded: Option<PlayerState>,
) -> StateDecision {
    use PlayerState::{Bust, Dealing, Stay, Waiting};

    let target = if card_count < 2 {
        Dealing
    } else if score > BLACKJACK {
        Bust
    } else if player == DEALER && score >= DEALER_STAY {
        if score == BLACKJACK {
            return StateDecision::FinishGame;
        }
        Stay
    } else if recorded == Some(Dealing) {
        Waiting
    } else {
        return StateDecision::Keep;
    };

    if recorded == Some(target) {
        StateDecision::Keep
    } else {
        StateDecision::Transition(target)
    }
}

/// Select the next actionable player.
///
/// Priority: any player still `Dealing`, then the `Current` player (whose
/// pending action gets re-emitted), then a non-dealer in `Waiting`, then
/// the dealer in `Waiting`, so the dealer only acts once every other
/// player is done. `None` means the game is ready to end.
pub fn next_actionable(
    states: &HashMap<PlayerId, PlayerState>,
) -> Option<(PlayerId, PlayerState)> {
    let mut players: Vec<&PlayerId> = states.keys().collect();
    players.sort();
    // Stable sort: keeps name order within each class, dealer last.
    players.sort_by_key(|player| player.as_str() == DEALER);

    for wanted in [PlayerState::Dealing, PlayerState::Current, PlayerState::Waiting] {
        for player in &players {
            if states.get(*player) == Some(&wanted) {
                return Some(((*player).clone(), wanted));
            }
        }
    }
    None
}
