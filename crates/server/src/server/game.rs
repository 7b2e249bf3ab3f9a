//! Game state and main loop.

use crate::config::Config;
use crate::entity::{Mobile, Player};
use crate::infection;
use crate::movement::{self, Steering};
use crate::stage::{StageScheduler, StageTiming, TOTAL_STAGES};
use crate::world::{World, WorldBorder};
use glam::Vec2;
use protocol::{ClientMessage, EntityId, InitSnapshot, ProtocolError, ServerEvent};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use super::{Broadcast, publish};

/// What a freshly joined client needs.
#[derive(Debug)]
pub struct Joined {
    pub id: EntityId,
    /// Full snapshot for the joining client only.
    pub init: ServerEvent,
    /// Announcement for everyone else.
    pub announce: ServerEvent,
}

/// Main game state.
pub struct GameState {
    pub config: Config,
    pub world: World,
    pub stage: StageScheduler,
    steering: Steering,
    rng: StdRng,
    next_human_id: u32,
    /// Completed NPC movement ticks.
    pub tick_count: u64,
    pub start_time: std::time::Instant,
}

impl GameState {
    /// Build the world and spawn the NPC population. The stage cycle starts
    /// with [`GameState::start`].
    pub fn new(config: Config) -> Self {
        let mut rng = match config.server.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut world = World::new(WorldBorder::new(
            config.world.canvas_size,
            config.world.entity_size,
        ));
        world.spawn_npcs(
            config.npc.count,
            config.npc.min_steps,
            config.npc.max_steps,
            &mut rng,
        );

        Self {
            steering: Steering::from_config(&config),
            stage: StageScheduler::new(StageTiming::from_config(&config)),
            config,
            world,
            rng,
            next_human_id: 1,
            tick_count: 0,
            start_time: std::time::Instant::now(),
        }
    }

    /// Start the first stage cycle.
    pub fn start(&mut self, now: std::time::Instant) -> Vec<ServerEvent> {
        self.stage.start_cycle(now, &mut self.world, &mut self.rng)
    }

    /// Seed a default-tier avatar for a new connection.
    pub fn join(&mut self, addr: SocketAddr) -> Joined {
        let id = EntityId::Human(self.next_human_id);
        self.next_human_id += 1;

        let position = self.world.border.random_position(&mut self.rng);
        let player = Player::human(addr, position);
        let view = player.body().view();
        self.world.upsert_player(id, player);
        info!("Client {} connected from {}", id, addr);

        Joined {
            id,
            init: self.snapshot(id),
            announce: ServerEvent::PlayerJoined { id, player: view },
        }
    }

    /// Remove a disconnected human. Unknown ids are a no-op.
    pub fn leave(&mut self, id: EntityId) -> Option<ServerEvent> {
        let player = self.world.remove_player(id)?;
        match player.addr() {
            Some(addr) => info!("Client {} ({}) disconnected", id, addr),
            None => info!("Client {} disconnected", id),
        }
        Some(ServerEvent::PlayerLeft { id })
    }

    /// Full world snapshot addressed to `id`.
    pub fn snapshot(&self, id: EntityId) -> ServerEvent {
        ServerEvent::Init(InitSnapshot {
            id,
            players: self.world.player_views(),
            enemies: self.world.enemy_views(),
            stage_epoch: self.stage.stage_epoch(),
            stage_duration: self.stage.stage_duration_ms(),
            total_stages: TOTAL_STAGES,
            stage: self.stage.stage_number(),
        })
    }

    /// Handle a text frame from a client.
    ///
    /// Returns the event to relay, `Ok(None)` when the sender's avatar is
    /// already gone.
    pub fn handle_message(
        &mut self,
        id: EntityId,
        raw: &str,
    ) -> Result<Option<ServerEvent>, ProtocolError> {
        match ClientMessage::parse(raw)? {
            ClientMessage::Move { x, y } => {
                let target = Vec2::new(x as f32, y as f32);
                let event = movement::apply_human_move(
                    &mut self.world,
                    id,
                    target,
                    self.config.player.max_move_step,
                );
                if event.is_none() {
                    debug!("Ignoring move from stale client {}", id);
                }
                Ok(event)
            }
        }
    }

    /// Move every NPC one step.
    pub fn tick_npcs(&mut self) -> Vec<ServerEvent> {
        self.tick_count += 1;
        let events = movement::step_npcs(&mut self.world, &self.steering, &mut self.rng);

        if self.tick_count % 400 == 0 {
            let counts = self.world.counts();
            debug!(
                "Tick {}: {} humans, {} npcs, {} enemies, stage {} (uptime {:?})",
                self.tick_count,
                counts.humans,
                counts.npcs,
                counts.enemies,
                self.stage.stage_number(),
                self.start_time.elapsed()
            );
        }
        events
    }

    /// Move every enemy one step.
    pub fn tick_enemies(&mut self) -> Vec<ServerEvent> {
        movement::step_enemies(&mut self.world, &self.steering, &mut self.rng)
    }

    /// Run one infection sweep.
    pub fn tick_infection(&mut self) -> Vec<ServerEvent> {
        infection::sweep(&mut self.world, self.config.world.collision_radius)
    }

    /// Fire due stage timers.
    pub fn poll_stage(&mut self, now: std::time::Instant) -> Vec<ServerEvent> {
        self.stage.poll(now, &mut self.world, &mut self.rng)
    }

    /// Number of connected humans.
    pub fn human_count(&self) -> usize {
        self.world.counts().humans
    }
}

fn ticker(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Sleep until the next stage deadline, or forever when none is armed.
async fn stage_timer(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => sleep_until(Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

/// Run one loop arm under the write lock, warning when it overruns its
/// budget.
async fn timed<F>(
    state: &RwLock<GameState>,
    label: &str,
    interval_ms: u64,
    f: F,
) -> Vec<ServerEvent>
where
    F: FnOnce(&mut GameState) -> Vec<ServerEvent>,
{
    let mut game = state.write().await;
    let tick_start = std::time::Instant::now();
    let events = f(&mut *game);
    let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;

    let tick_budget = interval_ms as f64 * 0.9;
    if tick_ms > tick_budget {
        warn!(
            "Slow {} tick #{}: {:.3}ms (budget: {:.1}ms) - {} humans, {} events",
            label,
            game.tick_count,
            tick_ms,
            tick_budget,
            game.human_count(),
            events.len()
        );
    }
    events
}

/// Run the main game loop.
///
/// Movement, enemy movement and infection each run on their own interval;
/// stage timers are slept on directly. Events are published after the write
/// lock is released.
pub async fn run_game_loop(state: Arc<RwLock<GameState>>, tx: broadcast::Sender<Broadcast>) {
    let (npc_ms, enemy_ms, infection_ms) = {
        let game = state.read().await;
        (
            game.config.npc.tick_interval_ms,
            game.config.enemy.tick_interval_ms,
            game.config.infection.tick_interval_ms,
        )
    };
    let mut npc_ticker = ticker(npc_ms);
    let mut enemy_ticker = ticker(enemy_ms);
    let mut infection_ticker = ticker(infection_ms);

    let events = {
        let mut game = state.write().await;
        let counts = game.world.counts();
        info!("World initialized: {} npcs", counts.npcs);
        game.start(Instant::now().into_std())
    };
    publish(&tx, events, None);

    loop {
        let deadline = state.read().await.stage.next_deadline();

        let events = tokio::select! {
            _ = npc_ticker.tick() => {
                timed(&state, "npc", npc_ms, GameState::tick_npcs).await
            }
            _ = enemy_ticker.tick() => {
                timed(&state, "enemy", enemy_ms, GameState::tick_enemies).await
            }
            _ = infection_ticker.tick() => {
                timed(&state, "infection", infection_ms, GameState::tick_infection).await
            }
            _ = stage_timer(deadline) => {
                let mut game = state.write().await;
                game.poll_stage(Instant::now().into_std())
            }
        };

        publish(&tx, events, None);
    }
}

/// Spawn the game loop on the current runtime and return the shared state
/// plus the broadcast channel every connection subscribes to.
pub fn spawn_game(config: Config) -> (Arc<RwLock<GameState>>, broadcast::Sender<Broadcast>) {
    let (tx, _rx) = broadcast::channel::<Broadcast>(super::BROADCAST_CAPACITY);
    let state = Arc::new(RwLock::new(GameState::new(config)));

    let game_loop_state = Arc::clone(&state);
    let game_loop_tx = tx.clone();
    tokio::spawn(async move {
        run_game_loop(game_loop_state, game_loop_tx).await;
    });
    (state, tx)
}
