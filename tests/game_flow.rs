//! End-to-end convergence tests for the reactive engine.
//!
//! These run the full event-driven flow against the in-memory backend:
//! store mutations broadcast events, the engine listener reacts, and an
//! external "player" task answers action reminders, the same shape the
//! production wiring has, minus the transport layer.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::broadcast;

use blackjack_engine::{
    EngineConfig, EventBus, GameEngine, GameEvent, GameStore, MemoryStore, PlayerAction, PlayerId,
    PlayerState, ResultStore, RoomStore, rules,
};

struct Harness {
    engine: GameEngine,
    store: Arc<MemoryStore>,
    bus: EventBus,
}

fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let bus = EventBus::default();
    let store = Arc::new(MemoryStore::new(bus.clone()));
    let engine = GameEngine::new(store.clone(), bus.clone(), EngineConfig::immediate());
    engine.spawn();
    Harness { engine, store, bus }
}

/// Answer every action reminder with the given action, as a connected
/// client would. Out-of-turn rejections from duplicate reminders are
/// expected and ignored.
fn spawn_responder(harness: &Harness, action: PlayerAction) {
    let engine = harness.engine.clone();
    let mut rx = harness.bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(GameEvent::ActionReminder { game, player, .. }) => {
                    let _ = engine.handle_action(&game, &player, action).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Wait until the end-of-game sweep has run (some player holds `Win`).
async fn wait_for_game_end(
    store: &MemoryStore,
    game: &str,
) -> HashMap<PlayerId, PlayerState> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let states = store.get_player_states(game).await.unwrap();
        if states.values().any(|s| *s == PlayerState::Win) {
            assert!(rules::is_game_ended(&states));
            return states;
        }
        assert!(
            Instant::now() < deadline,
            "game {game} did not converge, states: {states:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn assert_card_conservation(
    store: &MemoryStore,
    game: &str,
    states: &HashMap<PlayerId, PlayerState>,
) {
    let mut held = 0;
    for player in states.keys() {
        held += store.get_player_cards(game, player).await.unwrap().len();
    }
    let deck = store.count_deck(game).await.unwrap();
    assert_eq!(deck + held, 52, "cards were duplicated or lost");
}

#[tokio::test]
async fn test_game_converges_when_players_stay() {
    let h = harness();
    spawn_responder(&h, PlayerAction::Stay);

    h.engine.join_room("lobby", "alice").await.unwrap();
    h.engine.join_room("lobby", "bob").await.unwrap();
    let game = h.engine.start_game("lobby").await.unwrap();

    let states = wait_for_game_end(&h.store, &game).await;
    assert_eq!(states.len(), 3);
    assert!(states.contains_key("dealer"));
    assert_card_conservation(&h.store, &game, &states).await;

    // Exactly one sweep ran despite replayed convergence passes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let results = h.store.get_results(0, 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].game, game);
    assert_eq!(results[0].scores.len(), 3);

    // Every winner got a leaderboard credit.
    let winners: Vec<_> = states
        .iter()
        .filter(|(_, s)| **s == PlayerState::Win)
        .map(|(p, _)| p.clone())
        .collect();
    assert!(!winners.is_empty());
    let board = h.store.get_leaderboard().await.unwrap();
    let total: u64 = board.iter().map(|e| e.wins).sum();
    assert_eq!(total as usize, winners.len());
}

#[tokio::test]
async fn test_game_converges_when_players_hit_once_then_stay() {
    let h = harness();

    // Hit on the first reminder per player, stay afterwards.
    {
        let engine = h.engine.clone();
        let mut rx = h.bus.subscribe();
        tokio::spawn(async move {
            let mut has_hit: HashMap<PlayerId, bool> = HashMap::new();
            loop {
                match rx.recv().await {
                    Ok(GameEvent::ActionReminder { game, player, .. }) => {
                        let action = if *has_hit.get(&player).unwrap_or(&false) {
                            PlayerAction::Stay
                        } else {
                            has_hit.insert(player.clone(), true);
                            PlayerAction::Hit
                        };
                        let _ = engine.handle_action(&game, &player, action).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    h.engine.join_room("lobby", "alice").await.unwrap();
    let game = h.engine.start_game("lobby").await.unwrap();

    let states = wait_for_game_end(&h.store, &game).await;
    assert_card_conservation(&h.store, &game, &states).await;

    // Alice drew at least three cards (two dealt plus the hit), unless the
    // opening pair already busted her and no reminder ever went out.
    let hand = h.store.get_player_cards(&game, "alice").await.unwrap();
    assert!(
        hand.len() >= 3 || rules::value_for_cards(&hand) > 21,
        "expected a hit to land, hand: {hand:?}"
    );
}

#[tokio::test]
async fn test_two_games_converge_independently() {
    let h = harness();
    spawn_responder(&h, PlayerAction::Stay);

    h.engine.join_room("r1", "alice").await.unwrap();
    h.engine.join_room("r2", "bob").await.unwrap();

    let g1 = h.engine.start_game("r1").await.unwrap();
    let g2 = h.engine.start_game("r2").await.unwrap();
    assert_ne!(g1, g2);

    let s1 = wait_for_game_end(&h.store, &g1).await;
    let s2 = wait_for_game_end(&h.store, &g2).await;
    assert_card_conservation(&h.store, &g1, &s1).await;
    assert_card_conservation(&h.store, &g2, &s2).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.store.get_results(0, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_room_pointer_moves_to_each_new_game() {
    let h = harness();
    spawn_responder(&h, PlayerAction::Stay);

    h.engine.join_room("lobby", "alice").await.unwrap();
    let g1 = h.engine.start_game("lobby").await.unwrap();
    wait_for_game_end(&h.store, &g1).await;

    let g2 = h.engine.start_game("lobby").await.unwrap();
    assert_eq!(g1, "1");
    assert_eq!(g2, "2");
    assert_eq!(h.store.get_room_game("lobby").await.unwrap(), Some(g2.clone()));

    wait_for_game_end(&h.store, &g2).await;
}
