//! Shared contract suite for the store backends.
//!
//! The in-memory and Redis backends must behave identically; every
//! assertion here runs against both. The Redis leg needs a reachable
//! instance and is skipped unless `REDIS_URL` is set (it flushes the
//! database it connects to, so point it at a scratch instance).

use anyhow::Result;
use serial_test::serial;
use std::{sync::Arc, time::Duration};

use blackjack_engine::{
    Card, ChatStore, EventBus, EventHub, GameEvent, GameStore, MemoryStore, PlayerAction,
    PlayerState, RedisConfig, RedisStore, ResultRecord, ResultStore, RoomStore, Store, StoreError,
    ValidationError,
};

fn cards(codes: &[&str]) -> Vec<Card> {
    codes.iter().map(|c| Card::from(*c)).collect()
}

async fn recv_event(
    rx: &mut tokio::sync::broadcast::Receiver<GameEvent>,
) -> Result<GameEvent> {
    Ok(tokio::time::timeout(Duration::from_secs(2), rx.recv()).await??)
}

async fn check_game_ids_are_sequential(store: &dyn Store) -> Result<()> {
    assert_eq!(store.post_game().await?, "1");
    assert_eq!(store.post_game().await?, "2");
    Ok(())
}

async fn check_deck_draw_order_and_count(store: &dyn Store) -> Result<()> {
    store.set_deck("g", &cards(&["2S", "3S", "4S"])).await?;
    assert_eq!(store.count_deck("g").await?, 3);

    // Draws come from the tail of the installed deck.
    assert_eq!(store.draw_card("g", "p").await?, Some(Card::from("4S")));
    assert_eq!(store.draw_card("g", "p").await?, Some(Card::from("3S")));
    assert_eq!(store.count_deck("g").await?, 1);

    // Hand reads back most-recently-drawn first.
    assert_eq!(store.get_player_cards("g", "p").await?, cards(&["3S", "4S"]));

    assert_eq!(store.draw_card("g", "p").await?, Some(Card::from("2S")));
    assert_eq!(store.draw_card("g", "p").await?, None);
    assert_eq!(store.count_deck("g").await?, 0);
    Ok(())
}

async fn check_deck_replacement(store: &dyn Store) -> Result<()> {
    store.set_deck("g2", &cards(&["AS", "KS"])).await?;
    store.set_deck("g2", &cards(&["QH"])).await?;
    assert_eq!(store.count_deck("g2").await?, 1);
    assert_eq!(store.draw_card("g2", "p").await?, Some(Card::from("QH")));
    Ok(())
}

async fn check_player_states_upsert(store: &dyn Store) -> Result<()> {
    assert!(store.get_player_states("g3").await?.is_empty());

    store.set_player_state("g3", "alice", PlayerState::Dealing).await?;
    store.set_player_state("g3", "alice", PlayerState::Waiting).await?;
    store.set_player_state("g3", "dealer", PlayerState::Dealing).await?;

    let states = store.get_player_states("g3").await?;
    assert_eq!(states.len(), 2);
    assert_eq!(states.get("alice"), Some(&PlayerState::Waiting));
    assert_eq!(states.get("dealer"), Some(&PlayerState::Dealing));
    Ok(())
}

async fn check_empty_card_rejected_without_mutation(store: &dyn Store) -> Result<()> {
    let err = store
        .post_player_card("g4", "alice", Card::from(""))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::EmptyCard)
    ));
    assert!(store.get_player_cards("g4", "alice").await?.is_empty());

    store.post_player_card("g4", "alice", Card::from("7C")).await?;
    store.post_player_card("g4", "alice", Card::from("8C")).await?;
    assert_eq!(
        store.get_player_cards("g4", "alice").await?,
        cards(&["8C", "7C"])
    );
    Ok(())
}

async fn check_room_roster_and_pointer(store: &dyn Store) -> Result<()> {
    store.add_room_player("r", "bob").await?;
    store.add_room_player("r", "alice").await?;
    store.add_room_player("r", "bob").await?;
    assert_eq!(
        store.get_room_players("r").await?,
        vec!["alice".to_string(), "bob".to_string()]
    );

    assert_eq!(store.get_room_game("r").await?, None);
    store.set_room_game("r", "1").await?;
    store.set_room_game("r", "2").await?;
    assert_eq!(store.get_room_game("r").await?, Some("2".to_string()));
    Ok(())
}

async fn check_results_ledger_and_pagination(store: &dyn Store) -> Result<()> {
    for game in ["1", "2", "3"] {
        store
            .push_result(&ResultRecord {
                game: game.to_string(),
                scores: [("alice".to_string(), 20u32)].into_iter().collect(),
            })
            .await?;
    }

    let all = store.get_results(0, 10).await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].game, "1");
    assert_eq!(all[2].game, "3");

    let page = store.get_results(1, 1).await?;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].game, "2");

    assert!(store.get_results(0, 0).await?.is_empty());
    assert!(store.get_results(10, 5).await?.is_empty());
    Ok(())
}

async fn check_leaderboard_ranking(store: &dyn Store) -> Result<()> {
    for _ in 0..2 {
        store.incr_player_wins("alice").await?;
    }
    store.incr_player_wins("dealer").await?;

    let board = store.get_leaderboard().await?;
    assert_eq!(board[0].player, "alice");
    assert_eq!(board[0].wins, 2);
    assert_eq!(board[1].player, "dealer");
    assert_eq!(board[1].wins, 1);

    assert_eq!(store.get_player_wins("alice").await?, 2);
    assert_eq!(store.get_player_wins("nobody").await?, 0);
    Ok(())
}

async fn check_chat_validation_and_log(store: &dyn Store) -> Result<()> {
    let err = store.push_global_chat("").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::EmptyMessage)
    ));
    assert!(store.get_global_chat().await?.is_empty());

    store.push_global_chat("first").await?;
    store.push_global_chat("second").await?;
    assert_eq!(
        store.get_global_chat().await?,
        vec!["first".to_string(), "second".to_string()]
    );
    Ok(())
}

async fn check_events_fan_out(store: &dyn Store) -> Result<()> {
    store.set_deck("g5", &cards(&["AS"])).await?;

    let mut rx = store.subscribe();
    store.draw_card("g5", "alice").await?;
    assert_eq!(
        recv_event(&mut rx).await?,
        GameEvent::CardPushed {
            game: "g5".to_string(),
            player: "alice".to_string(),
            card: Card::from("AS"),
        }
    );

    store.set_player_state("g5", "alice", PlayerState::Dealing).await?;
    assert_eq!(
        recv_event(&mut rx).await?,
        GameEvent::StateChanged {
            game: "g5".to_string(),
            player: "alice".to_string(),
            state: PlayerState::Dealing,
        }
    );

    store.push_global_chat("hello").await?;
    assert_eq!(
        recv_event(&mut rx).await?,
        GameEvent::ChatPosted {
            message: "hello".to_string(),
        }
    );

    store
        .post_action_reminder("g5", "alice", &[PlayerAction::Hit, PlayerAction::Stay])
        .await?;
    assert_eq!(
        recv_event(&mut rx).await?,
        GameEvent::ActionReminder {
            game: "g5".to_string(),
            player: "alice".to_string(),
            actions: vec![PlayerAction::Hit, PlayerAction::Stay],
        }
    );
    Ok(())
}

async fn run_contract(store: Arc<dyn Store>) -> Result<()> {
    store.reset().await?;
    check_game_ids_are_sequential(store.as_ref()).await?;
    check_deck_draw_order_and_count(store.as_ref()).await?;
    check_deck_replacement(store.as_ref()).await?;
    check_player_states_upsert(store.as_ref()).await?;
    check_empty_card_rejected_without_mutation(store.as_ref()).await?;
    check_room_roster_and_pointer(store.as_ref()).await?;
    check_results_ledger_and_pagination(store.as_ref()).await?;
    check_leaderboard_ranking(store.as_ref()).await?;
    check_chat_validation_and_log(store.as_ref()).await?;
    check_events_fan_out(store.as_ref()).await?;
    Ok(())
}

#[tokio::test]
async fn test_memory_backend_honors_contract() -> Result<()> {
    run_contract(Arc::new(MemoryStore::new(EventBus::default()))).await
}

#[tokio::test]
#[serial]
async fn test_redis_backend_honors_contract() -> Result<()> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping redis contract suite");
        return Ok(());
    };
    let bus = EventBus::default();
    let store = RedisStore::connect(&RedisConfig { url }, bus).await?;
    run_contract(Arc::new(store)).await
}
