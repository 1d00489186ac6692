//! Reactive turn-resolution engine.
//!
//! No process or thread owns a game: the engine listens for card and
//! state-change events on the [`EventBus`] and runs an idempotent
//! convergence pass for the affected game. Any instance observing an event
//! may run a pass concurrently with others doing the same; correctness
//! comes from re-deriving target state from the authoritative store on
//! every pass, never from mutual exclusion. A store error aborts only the
//! current pass; the next naturally occurring event re-triggers
//! convergence, so recovery is by event replay, not by retry logic.

pub mod pacing;
pub mod rules;

use futures::{StreamExt, TryStreamExt, stream};
use std::{collections::HashMap, env, sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    events::{EventBus, GameEvent},
    game::{
        Card, DEALER, GameId, GameView, PlayerAction, PlayerEntry, PlayerId, PlayerState,
        ResultRecord, ValidationError, shuffled_deck,
    },
    store::{EventHub, GameStore, ResultStore, RoomStore, Store, StoreError, StoreResult},
};
use pacing::DealQueue;
use rules::StateDecision;

/// Engine tuning knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Pacing delay before each automatic deal. UX only, not correctness.
    pub deal_delay: Duration,

    /// Concurrent store reads during fan-in (fetching every player's
    /// hand). Bounds load on the store.
    pub fanout_limit: usize,
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `ENGINE_DEAL_DELAY_MS`: deal pacing delay in milliseconds (default: 700)
    /// - `ENGINE_FANOUT_LIMIT`: concurrent fan-in reads (default: 3)
    ///
    /// # Panics
    ///
    /// Panics if a variable is set but not a valid integer
    pub fn from_env() -> Self {
        let deal_delay_ms: u64 = env::var("ENGINE_DEAL_DELAY_MS")
            .unwrap_or_else(|_| "700".to_string())
            .parse()
            .expect("ENGINE_DEAL_DELAY_MS must be a valid u64");
        let fanout_limit: usize = env::var("ENGINE_FANOUT_LIMIT")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .expect("ENGINE_FANOUT_LIMIT must be a valid usize");
        Self {
            deal_delay: Duration::from_millis(deal_delay_ms),
            fanout_limit,
        }
    }

    /// Configuration with no pacing delay, for tests and simulations.
    pub fn immediate() -> Self {
        Self {
            deal_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deal_delay: Duration::from_millis(700),
            fanout_limit: 3,
        }
    }
}

/// The turn state machine, driving games to completion by reacting to
/// store events. Cheap to clone; clones share the same queue and store.
#[derive(Clone)]
pub struct GameEngine {
    store: Arc<dyn Store>,
    bus: EventBus,
    config: EngineConfig,
    deals: Arc<DealQueue>,
}

impl GameEngine {
    pub fn new(store: Arc<dyn Store>, bus: EventBus, config: EngineConfig) -> Self {
        Self {
            store,
            bus,
            config,
            deals: Arc::new(DealQueue::default()),
        }
    }

    /// Start the event pump: card pushes trigger a per-player state
    /// re-derivation, state changes trigger the action loop. Runs until
    /// the bus closes.
    pub fn spawn(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(GameEvent::CardPushed { game, player, .. }) => {
                        if let Err(e) = engine.update_player_state(&game, &player).await {
                            log::error!("game {game}: convergence pass aborted: {e}");
                        }
                    }
                    Ok(GameEvent::StateChanged { game, .. }) => {
                        if let Err(e) = engine.action_loop(&game).await {
                            log::error!("game {game}: action loop aborted: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped triggers are recovered by later events.
                        log::warn!("engine listener lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Add a player to a room's roster (set semantics).
    pub async fn join_room(&self, room: &str, player: &str) -> StoreResult<()> {
        if player.trim().is_empty() {
            return Err(ValidationError::EmptyPlayer.into());
        }
        self.store.add_room_player(room, player).await
    }

    /// Start a new game for a room: allocate an id, install a shuffled
    /// deck, repoint the room, seed every roster player plus the dealer at
    /// `Dealing`, and kick the first convergence pass.
    pub async fn start_game(&self, room: &str) -> StoreResult<GameId> {
        let players = self.store.get_room_players(room).await?;
        if players.is_empty() {
            return Err(ValidationError::EmptyRoster(room.to_string()).into());
        }

        let game = self.store.post_game().await?;
        self.store.set_deck(&game, &shuffled_deck()).await?;
        self.store.set_room_game(room, &game).await?;
        for player in &players {
            self.store
                .set_player_state(&game, player, PlayerState::Dealing)
                .await?;
        }
        self.store
            .set_player_state(&game, DEALER, PlayerState::Dealing)
            .await?;

        log::info!("room {room}: game {game} started with {} players", players.len());
        self.action_loop(&game).await?;
        Ok(game)
    }

    /// Hit/stay entry point for the transport layer. Only the recorded
    /// `Current` player may act.
    pub async fn handle_action(
        &self,
        game: &str,
        player: &str,
        action: PlayerAction,
    ) -> StoreResult<()> {
        if game.is_empty() {
            return Err(ValidationError::EmptyGame.into());
        }
        if player.trim().is_empty() {
            return Err(ValidationError::EmptyPlayer.into());
        }
        let states = self.store.get_player_states(game).await?;
        if states.get(player) != Some(&PlayerState::Current) {
            return Err(ValidationError::OutOfTurn(player.to_string()).into());
        }
        match action {
            PlayerAction::Hit => {
                if self.store.draw_card(game, player).await?.is_none() {
                    // No card event will arrive, so re-run the loop
                    // ourselves; the player gets prompted again.
                    log::warn!("game {game}: deck exhausted on hit by {player}");
                    return self.action_loop(game).await;
                }
                Ok(())
            }
            PlayerAction::Stay => {
                self.store
                    .set_player_state(game, player, PlayerState::Stay)
                    .await
            }
        }
    }

    /// One convergence pass: select the next actionable player by
    /// priority and dispatch. Idempotent and re-entrant: concurrent
    /// invocations re-derive the same selection from the store, and every
    /// dispatch is safe to repeat.
    pub async fn action_loop(&self, game: &str) -> StoreResult<()> {
        let states = self.store.get_player_states(game).await?;
        if states.is_empty() {
            // Unknown or not-yet-seeded game; nothing to converge.
            log::debug!("game {game}: action loop on empty state snapshot");
            return Ok(());
        }
        match rules::next_actionable(&states) {
            Some((player, state)) => self.do_next_action(game, &player, state).await,
            None => self.end_game(game).await,
        }
    }

    /// Side-effecting dispatch for the selected player.
    async fn do_next_action(
        &self,
        game: &str,
        player: &str,
        state: PlayerState,
    ) -> StoreResult<()> {
        match state {
            PlayerState::Dealing => {
                self.schedule_deal(game, player);
                Ok(())
            }
            PlayerState::Current if player == DEALER => {
                // Re-derive from the authoritative hand: deal below the
                // stay threshold, otherwise converge the dealer's state.
                let cards = self.store.get_player_cards(game, player).await?;
                if rules::value_for_cards(&cards) < rules::DEALER_STAY {
                    self.schedule_deal(game, player);
                    Ok(())
                } else {
                    self.update_player_state(game, player).await
                }
            }
            PlayerState::Current => {
                // No mutation: ask the outside world for a decision.
                self.store
                    .post_action_reminder(game, player, &[PlayerAction::Hit, PlayerAction::Stay])
                    .await
            }
            PlayerState::Waiting => {
                self.store
                    .set_player_state(game, player, PlayerState::Current)
                    .await
            }
            PlayerState::Bust | PlayerState::Stay | PlayerState::Win => Ok(()),
        }
    }

    /// Card-push reaction: re-derive the player's state from their
    /// authoritative hand and recorded state. Writes only when the state
    /// actually changes; otherwise re-invokes the action loop so the pass
    /// still guarantees liveness.
    pub async fn update_player_state(&self, game: &str, player: &str) -> StoreResult<()> {
        let cards = self.store.get_player_cards(game, player).await?;
        let score = rules::value_for_cards(&cards);
        let states = self.store.get_player_states(game).await?;
        let recorded = states.get(player).copied();

        match rules::next_player_state(player, cards.len(), score, recorded) {
            StateDecision::Transition(state) => {
                self.store.set_player_state(game, player, state).await
            }
            StateDecision::FinishGame => self.end_game(game).await,
            StateDecision::Keep => Box::pin(self.action_loop(game)).await,
        }
    }

    /// End-of-game sweep: fan in every player's final hand, compute
    /// winners, persist the result, bump the leaderboard and mark winners.
    ///
    /// Safe under at-least-once delivery: once any player is `Win` the
    /// sweep has already run and the call is a no-op, so replayed events
    /// cannot append duplicate results.
    pub async fn end_game(&self, game: &str) -> StoreResult<()> {
        let states = self.store.get_player_states(game).await?;
        if states.is_empty() || states.values().any(|state| *state == PlayerState::Win) {
            return Ok(());
        }

        let players: Vec<PlayerId> = states.keys().cloned().collect();
        let hands = self.collect_hands(game, players).await?;
        let scores: HashMap<PlayerId, u32> = hands
            .into_iter()
            .map(|(player, cards)| (player, rules::value_for_cards(&cards)))
            .collect();

        let winners = rules::get_winners(&states, &scores);
        self.store
            .push_result(&ResultRecord {
                game: game.to_string(),
                scores,
            })
            .await?;
        for winner in &winners {
            self.store.incr_player_wins(winner).await?;
            self.store
                .set_player_state(game, winner, PlayerState::Win)
                .await?;
        }
        log::info!("game {game}: ended, winners {winners:?}");
        Ok(())
    }

    /// Assemble a full snapshot of a game from the authoritative store.
    pub async fn game_view(&self, game: &str) -> StoreResult<GameView> {
        let states = self.store.get_player_states(game).await?;
        let deck_count = self.store.count_deck(game).await?;
        let hands = self.collect_hands(game, states.keys().cloned().collect()).await?;

        let players = states
            .into_iter()
            .map(|(player, state)| {
                let cards = hands.get(&player).cloned().unwrap_or_default();
                let score = rules::value_for_cards(&cards);
                (player, PlayerEntry { cards, state, score })
            })
            .collect();
        Ok(GameView {
            id: game.to_string(),
            deck_count,
            players,
        })
    }

    /// The player whose action is pending, if any.
    pub async fn current_player(&self, game: &str) -> StoreResult<Option<PlayerId>> {
        let states = self.store.get_player_states(game).await?;
        Ok(states
            .into_iter()
            .find(|(_, state)| *state == PlayerState::Current)
            .map(|(player, _)| player))
    }

    /// Fetch every listed player's hand with bounded concurrency.
    /// Independent reads run in parallel; the limit bounds store load.
    async fn collect_hands(
        &self,
        game: &str,
        players: Vec<PlayerId>,
    ) -> StoreResult<HashMap<PlayerId, Vec<Card>>> {
        stream::iter(players.into_iter().map(|player| {
            let store = Arc::clone(&self.store);
            let game = game.to_string();
            async move {
                let cards = store.get_player_cards(&game, &player).await?;
                Ok::<(PlayerId, Vec<Card>), StoreError>((player, cards))
            }
        }))
        .buffer_unordered(self.config.fanout_limit.max(1))
        .try_collect()
        .await
    }

    /// Request a coalesced automatic deal. At most one sleeping drain task
    /// exists per process; the queue keeps every distinct request alive so
    /// pacing never strands a game.
    fn schedule_deal(&self, game: &str, player: &str) {
        if self.deals.enqueue(game, player) {
            let engine = self.clone();
            tokio::spawn(async move { engine.drain_deals().await });
        }
    }

    async fn drain_deals(&self) {
        while let Some((game, player)) = self.deals.pop_or_release() {
            tokio::time::sleep(self.config.deal_delay).await;
            match self.store.draw_card(&game, &player).await {
                Ok(Some(card)) => log::debug!("game {game}: dealt {card} to {player}"),
                Ok(None) => log::warn!("game {game}: deck exhausted dealing to {player}"),
                Err(e) => log::error!("game {game}: deal to {player} aborted: {e}"),
            }
        }
    }
}
