//! Redis-backed distributed backend.
//!
//! Multiple process instances share one keyspace:
//!
//! ```text
//! game:next                      id counter
//! game:<id>:cards                deck list (draw = RPOPLPUSH from tail)
//! game:<id>:player:<p>:cards     hand list, most-recent-first
//! game:<id>:state                player -> state hash
//! room:<id>:player               roster set
//! room:<id>:game                 active-game pointer
//! results                        append-only list of JSON records
//! leaderboard                    sorted set of player -> wins
//! globalchat                     chat list
//! ```
//!
//! Every mutation also PUBLISHes its event on a channel named for the event
//! kind; a background pub/sub task feeds every received message into the
//! local [`EventBus`], so each process observes all writes (including its
//! own) through the same path. Delivery is FIFO per publishing process
//! only; consumers re-read the store before acting.

use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use std::{collections::HashMap, env};
use tokio::{sync::broadcast, task::JoinHandle};

use super::{
    ChatStore, EventHub, GameStore, ResultStore, RoomStore, Store,
    errors::{StoreError, StoreResult},
};
use crate::{
    events::{EventBus, GameEvent},
    game::{
        Card, GameId, LeaderboardEntry, PlayerAction, PlayerId, PlayerState, ResultRecord,
        ValidationError,
    },
};

const GAME_SEQ_KEY: &str = "game:next";
const RESULTS_KEY: &str = "results";
const LEADERBOARD_KEY: &str = "leaderboard";
const CHAT_KEY: &str = "globalchat";

const EVENT_CHANNELS: [&str; 4] = ["card", "playerstate", "globalchat:created", "action:reminder"];

fn deck_key(game: &str) -> String {
    format!("game:{game}:cards")
}

fn hand_key(game: &str, player: &str) -> String {
    format!("game:{game}:player:{player}:cards")
}

fn state_key(game: &str) -> String {
    format!("game:{game}:state")
}

fn room_players_key(room: &str) -> String {
    format!("room:{room}:player")
}

fn room_game_key(room: &str) -> String {
    format!("room:{room}:game")
}

/// Redis connection configuration.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

impl RedisConfig {
    /// Create configuration from the `REDIS_URL` environment variable,
    /// falling back to a local development instance.
    pub fn from_env() -> Self {
        Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| Self::default().url),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Distributed store backend shared by multiple process instances.
pub struct RedisStore {
    conn: MultiplexedConnection,
    bus: EventBus,
    listener: JoinHandle<()>,
}

impl RedisStore {
    /// Connect to Redis and start the pub/sub listener feeding the bus.
    pub async fn connect(config: &RedisConfig, bus: EventBus) -> StoreResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        let listener = Self::spawn_listener(&client, bus.clone()).await?;
        Ok(Self {
            conn,
            bus,
            listener,
        })
    }

    async fn spawn_listener(client: &redis::Client, bus: EventBus) -> StoreResult<JoinHandle<()>> {
        let mut pubsub = client.get_async_pubsub().await?;
        for channel in EVENT_CHANNELS {
            pubsub.subscribe(channel).await?;
        }
        Ok(tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        log::warn!("dropping unreadable event payload: {e}");
                        continue;
                    }
                };
                match message.get_channel_name() {
                    // Chat travels as the bare string, as the original wire
                    // format does.
                    "globalchat:created" => bus.publish(GameEvent::ChatPosted { message: payload }),
                    channel => match serde_json::from_str::<GameEvent>(&payload) {
                        Ok(event) => bus.publish(event),
                        Err(e) => log::warn!("dropping malformed event on {channel}: {e}"),
                    },
                }
            }
            log::warn!("redis event listener stream ended");
        }))
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    async fn publish(&self, event: &GameEvent) -> StoreResult<()> {
        let payload = match event {
            GameEvent::ChatPosted { message } => message.clone(),
            other => serde_json::to_string(other)?,
        };
        let _: () = self.conn().publish(event.channel(), payload).await?;
        Ok(())
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl GameStore for RedisStore {
    async fn post_game(&self) -> StoreResult<GameId> {
        let id: i64 = self.conn().incr(GAME_SEQ_KEY, 1).await?;
        Ok(id.to_string())
    }

    async fn count_deck(&self, game: &str) -> StoreResult<usize> {
        let count: usize = self.conn().llen(deck_key(game)).await?;
        Ok(count)
    }

    async fn set_deck(&self, game: &str, cards: &[Card]) -> StoreResult<()> {
        let key = deck_key(game);
        let codes: Vec<&str> = cards.iter().map(Card::code).collect();
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !codes.is_empty() {
            pipe.rpush(&key, codes).ignore();
        }
        let _: () = pipe.query_async(&mut self.conn()).await?;
        Ok(())
    }

    async fn get_player_cards(&self, game: &str, player: &str) -> StoreResult<Vec<Card>> {
        let codes: Vec<String> = self.conn().lrange(hand_key(game, player), 0, -1).await?;
        Ok(codes.into_iter().map(Card::new).collect())
    }

    async fn get_player_states(
        &self,
        game: &str,
    ) -> StoreResult<HashMap<PlayerId, PlayerState>> {
        let raw: HashMap<String, String> = self.conn().hgetall(state_key(game)).await?;
        raw.into_iter()
            .map(|(player, state)| {
                PlayerState::parse(&state)
                    .map(|parsed| (player, parsed))
                    .ok_or_else(|| {
                        StoreError::Data(format!("unknown player state {state:?} in game {game}"))
                    })
            })
            .collect()
    }

    async fn post_player_card(&self, game: &str, player: &str, card: Card) -> StoreResult<()> {
        if card.code().is_empty() {
            return Err(ValidationError::EmptyCard.into());
        }
        let _: () = self
            .conn()
            .lpush(hand_key(game, player), card.code())
            .await?;
        self.publish(&GameEvent::CardPushed {
            game: game.to_string(),
            player: player.to_string(),
            card,
        })
        .await
    }

    async fn set_player_state(
        &self,
        game: &str,
        player: &str,
        state: PlayerState,
    ) -> StoreResult<()> {
        let _: () = self
            .conn()
            .hset(state_key(game), player, state.as_str())
            .await?;
        self.publish(&GameEvent::StateChanged {
            game: game.to_string(),
            player: player.to_string(),
            state,
        })
        .await
    }

    async fn draw_card(&self, game: &str, player: &str) -> StoreResult<Option<Card>> {
        // Single server-side RPOPLPUSH: two processes can never pop the
        // same card.
        let code: Option<String> = self
            .conn()
            .rpoplpush(deck_key(game), hand_key(game, player))
            .await?;
        let Some(code) = code else {
            return Ok(None);
        };
        let card = Card::new(code);
        self.publish(&GameEvent::CardPushed {
            game: game.to_string(),
            player: player.to_string(),
            card: card.clone(),
        })
        .await?;
        Ok(Some(card))
    }
}

#[async_trait]
impl RoomStore for RedisStore {
    async fn add_room_player(&self, room: &str, player: &str) -> StoreResult<()> {
        let _: () = self.conn().sadd(room_players_key(room), player).await?;
        Ok(())
    }

    async fn get_room_players(&self, room: &str) -> StoreResult<Vec<PlayerId>> {
        let mut players: Vec<String> = self.conn().smembers(room_players_key(room)).await?;
        players.sort();
        Ok(players)
    }

    async fn set_room_game(&self, room: &str, game: &str) -> StoreResult<()> {
        let _: () = self.conn().set(room_game_key(room), game).await?;
        Ok(())
    }

    async fn get_room_game(&self, room: &str) -> StoreResult<Option<GameId>> {
        let game: Option<String> = self.conn().get(room_game_key(room)).await?;
        Ok(game)
    }
}

#[async_trait]
impl ResultStore for RedisStore {
    async fn push_result(&self, record: &ResultRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        let _: () = self.conn().rpush(RESULTS_KEY, json).await?;
        Ok(())
    }

    async fn get_results(&self, skip: usize, limit: usize) -> StoreResult<Vec<ResultRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = (skip + limit - 1) as isize;
        let raw: Vec<String> = self.conn().lrange(RESULTS_KEY, skip as isize, stop).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    async fn incr_player_wins(&self, player: &str) -> StoreResult<()> {
        let _: f64 = self.conn().zincr(LEADERBOARD_KEY, player, 1).await?;
        Ok(())
    }

    async fn get_leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        let ranked: Vec<(String, u64)> = self
            .conn()
            .zrevrange_withscores(LEADERBOARD_KEY, 0, -1)
            .await?;
        Ok(ranked
            .into_iter()
            .map(|(player, wins)| LeaderboardEntry { player, wins })
            .collect())
    }

    async fn get_player_wins(&self, player: &str) -> StoreResult<u64> {
        let wins: Option<u64> = self.conn().zscore(LEADERBOARD_KEY, player).await?;
        Ok(wins.unwrap_or(0))
    }
}

#[async_trait]
impl ChatStore for RedisStore {
    async fn push_global_chat(&self, message: &str) -> StoreResult<()> {
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let _: () = self.conn().rpush(CHAT_KEY, message).await?;
        self.publish(&GameEvent::ChatPosted {
            message: message.to_string(),
        })
        .await
    }

    async fn get_global_chat(&self) -> StoreResult<Vec<String>> {
        let messages: Vec<String> = self.conn().lrange(CHAT_KEY, 0, -1).await?;
        Ok(messages)
    }
}

#[async_trait]
impl EventHub for RedisStore {
    fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.bus.subscribe()
    }

    async fn post_action_reminder(
        &self,
        game: &str,
        player: &str,
        actions: &[PlayerAction],
    ) -> StoreResult<()> {
        self.publish(&GameEvent::ActionReminder {
            game: game.to_string(),
            player: player.to_string(),
            actions: actions.to_vec(),
        })
        .await
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn reset(&self) -> StoreResult<()> {
        let _: () = redis::cmd("FLUSHDB").query_async(&mut self.conn()).await?;
        Ok(())
    }
}
