//! Stage scheduler.
//!
//! One process-wide cycle: `Stage1 -> Stage2 -> Stage3 -> GameOver ->
//! (restart) -> Stage1 ...`. Each stage spawns one enemy at its tier and
//! arms two racing timers: a fallback that fires after the stage duration,
//! and a recurring watcher that advances early once nobody is left below
//! the stage tier. Whichever fires first calls [`StageScheduler::advance`],
//! which cancels every pending timer of the stage it leaves. Enemy spawns
//! are guarded by a per-cycle spawned flag, so a late or duplicate trigger
//! is a no-op.
//!
//! Time is passed in explicitly; the game loop sleeps until
//! [`StageScheduler::next_deadline`] and then calls [`StageScheduler::poll`].

use crate::config::Config;
use crate::entity::Enemy;
use crate::world::World;
use protocol::{EntityId, ServerEvent, StageReason, Tier};
use rand::Rng;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Number of stages per cycle.
pub const TOTAL_STAGES: u8 = 3;

/// A stage of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    One,
    Two,
    Three,
}

impl Stage {
    /// 1-based stage number.
    #[inline]
    pub const fn number(self) -> u8 {
        match self {
            Stage::One => 1,
            Stage::Two => 2,
            Stage::Three => 3,
        }
    }

    /// Tier of the enemy spawned by this stage.
    #[inline]
    pub const fn tier(self) -> Tier {
        match self {
            Stage::One => Tier::One,
            Stage::Two => Tier::Two,
            Stage::Three => Tier::Three,
        }
    }

    pub const fn next(self) -> Option<Stage> {
        match self {
            Stage::One => Some(Stage::Two),
            Stage::Two => Some(Stage::Three),
            Stage::Three => None,
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self.number() as usize - 1
    }
}

/// Scheduler phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No cycle started yet.
    Idle,
    /// A stage is running.
    Running(Stage),
    /// Survivors announced, waiting for the restart delay.
    GameOver,
}

/// Stage timing, copied out of the config.
#[derive(Debug, Clone, Copy)]
pub struct StageTiming {
    pub duration: Duration,
    pub watcher_interval: Duration,
    pub restart_delay: Duration,
}

impl StageTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            duration: Duration::from_millis(config.stage.duration_ms),
            watcher_interval: Duration::from_millis(config.stage.watcher_interval_ms),
            restart_delay: Duration::from_millis(config.stage.restart_delay_ms),
        }
    }
}

/// Pending timers of the current phase.
#[derive(Debug, Clone, Copy, Default)]
struct Timers {
    fallback: Option<Instant>,
    watcher: Option<Instant>,
    restart: Option<Instant>,
}

impl Timers {
    fn cancel_all(&mut self) {
        *self = Timers::default();
    }

    fn next_due(&self) -> Option<Instant> {
        [self.fallback, self.watcher, self.restart]
            .into_iter()
            .flatten()
            .min()
    }
}

/// The stage state machine.
#[derive(Debug)]
pub struct StageScheduler {
    timing: StageTiming,
    phase: Phase,
    /// Completed restarts plus one.
    cycle: u64,
    /// Wall-clock start of the cycle (ms since the Unix epoch).
    cycle_epoch: u64,
    /// Wall-clock start of the current stage.
    stage_epoch: u64,
    /// Enemies spawned this cycle, indexed by stage.
    spawned: [bool; TOTAL_STAGES as usize],
    timers: Timers,
}

impl StageScheduler {
    pub fn new(timing: StageTiming) -> Self {
        Self {
            timing,
            phase: Phase::Idle,
            cycle: 0,
            cycle_epoch: 0,
            stage_epoch: 0,
            spawned: [false; TOTAL_STAGES as usize],
            timers: Timers::default(),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[inline]
    pub fn stage_epoch(&self) -> u64 {
        self.stage_epoch
    }

    #[inline]
    pub fn timing(&self) -> StageTiming {
        self.timing
    }

    /// 1-based number of the running stage (the last stage during game over,
    /// 0 before the first cycle).
    pub fn stage_number(&self) -> u8 {
        match self.phase {
            Phase::Idle => 0,
            Phase::Running(stage) => stage.number(),
            Phase::GameOver => TOTAL_STAGES,
        }
    }

    /// Stage duration in ms as sent to clients.
    #[inline]
    pub fn stage_duration_ms(&self) -> u64 {
        self.timing.duration.as_millis() as u64
    }

    /// Earliest pending timer.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_due()
    }

    /// Whether the enemy of `stage` has been spawned this cycle.
    #[inline]
    pub fn has_spawned(&self, stage: Stage) -> bool {
        self.spawned[stage.index()]
    }

    /// Start a fresh cycle: reset every player to the default tier, drop all
    /// enemies, announce the restart and spawn the first enemy.
    pub fn start_cycle<R: Rng + ?Sized>(
        &mut self,
        now: Instant,
        world: &mut World,
        rng: &mut R,
    ) -> Vec<ServerEvent> {
        self.timers.cancel_all();
        self.spawned = [false; TOTAL_STAGES as usize];
        self.cycle += 1;

        let mut events: Vec<ServerEvent> = world
            .reset_tiers()
            .into_iter()
            .map(|id| ServerEvent::PlayerEmojiChanged {
                id,
                emoji: Tier::Default,
            })
            .collect();
        let cleared = world.clear_enemies();

        self.cycle_epoch = wall_clock_ms();
        self.stage_epoch = self.cycle_epoch;
        self.phase = Phase::Running(Stage::One);
        info!(
            "Cycle {} started ({} avatars reset, {} enemies cleared)",
            self.cycle,
            events.len(),
            cleared
        );

        events.push(ServerEvent::GameRestart {
            stage_epoch: self.cycle_epoch,
            stage_duration: self.stage_duration_ms(),
            total_stages: TOTAL_STAGES,
        });
        events.extend(self.enter_stage(Stage::One, now, world, rng));
        events
    }

    /// Fire whatever timers are due at `now`.
    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        now: Instant,
        world: &mut World,
        rng: &mut R,
    ) -> Vec<ServerEvent> {
        match self.phase {
            Phase::Idle => Vec::new(),
            Phase::Running(stage) => {
                if self.timers.fallback.is_some_and(|at| now >= at) {
                    return self.advance(stage, StageReason::Timeout, now, world, rng);
                }
                if let Some(at) = self.timers.watcher {
                    if now >= at {
                        if !world.any_below(stage.tier()) {
                            return self.advance(stage, StageReason::Cleared, now, world, rng);
                        }
                        let next = at + self.timing.watcher_interval;
                        self.timers.watcher = Some(next.max(now));
                    }
                }
                Vec::new()
            }
            Phase::GameOver => {
                if self.timers.restart.is_some_and(|at| now >= at) {
                    return self.start_cycle(now, world, rng);
                }
                Vec::new()
            }
        }
    }

    /// Leave `from` for the next stage (or game over).
    ///
    /// Triggers aimed at a stage that is no longer running are ignored, so
    /// the losing timer of a race cannot advance twice.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        from: Stage,
        reason: StageReason,
        now: Instant,
        world: &mut World,
        rng: &mut R,
    ) -> Vec<ServerEvent> {
        if self.phase != Phase::Running(from) {
            debug!(
                "Ignoring {:?} trigger for stage {} (phase {:?})",
                reason,
                from.number(),
                self.phase
            );
            return Vec::new();
        }
        self.timers.cancel_all();

        let Some(next) = from.next() else {
            info!("Stage {} ended ({:?})", from.number(), reason);
            return self.game_over(now, world);
        };

        self.phase = Phase::Running(next);
        self.stage_epoch = wall_clock_ms();
        info!(
            "Stage {} -> {} ({:?})",
            from.number(),
            next.number(),
            reason
        );

        let mut events = vec![ServerEvent::StageChanged {
            stage: next.number(),
            stage_epoch: self.stage_epoch,
            reason,
        }];
        events.extend(self.enter_stage(next, now, world, rng));
        events
    }

    /// Spawn the stage enemy (at most once per cycle) and arm both timers.
    fn enter_stage<R: Rng + ?Sized>(
        &mut self,
        stage: Stage,
        now: Instant,
        world: &mut World,
        rng: &mut R,
    ) -> Vec<ServerEvent> {
        self.timers.fallback = Some(now + self.timing.duration);
        self.timers.watcher = Some(now + self.timing.watcher_interval);

        if self.spawned[stage.index()] {
            return Vec::new();
        }
        self.spawned[stage.index()] = true;

        let tier = stage.tier();
        let id = EntityId::enemy(tier);
        let position = world.border.random_position(rng);
        world.upsert_enemy(id, Enemy::new(tier, position));
        debug!("Spawned {} at ({}, {})", id, position.x, position.y);

        vec![ServerEvent::EnemyJoined {
            id,
            emoji: tier,
            x: position.x,
            y: position.y,
        }]
    }

    fn game_over(&mut self, now: Instant, world: &World) -> Vec<ServerEvent> {
        self.phase = Phase::GameOver;
        self.timers.restart = Some(now + self.timing.restart_delay);

        let survivors = world.uninfected_humans();
        info!(
            "Game over: {} survivor(s), restarting in {:?}",
            survivors.len(),
            self.timing.restart_delay
        );
        vec![ServerEvent::GameOver {
            survivors,
            restart_delay: self.timing.restart_delay.as_millis() as u64,
        }]
    }
}

/// Milliseconds since the Unix epoch.
fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Mobile, Player};
    use crate::world::WorldBorder;
    use glam::Vec2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::net::SocketAddr;

    const DURATION: Duration = Duration::from_secs(60);
    const WATCH: Duration = Duration::from_millis(500);
    const RESTART: Duration = Duration::from_secs(10);

    fn scheduler() -> StageScheduler {
        StageScheduler::new(StageTiming {
            duration: DURATION,
            watcher_interval: WATCH,
            restart_delay: RESTART,
        })
    }

    fn world_with(humans: u32, npcs: u32) -> World {
        let mut world = World::new(WorldBorder::new(600.0, 32.0));
        let addr = SocketAddr::from(([127, 0, 0, 1], 9000));
        for id in 0..humans {
            world.upsert_player(EntityId::Human(id), Player::human(addr, Vec2::ZERO));
        }
        for id in 0..npcs {
            world.upsert_player(EntityId::Npc(id), Player::npc(Vec2::ZERO, Vec2::ZERO, 1));
        }
        world
    }

    fn infect_all(world: &mut World, tier: Tier) {
        for (_, player) in world.players_mut() {
            player.body_mut().tier = tier;
        }
        for (_, enemy) in world.enemies_mut() {
            enemy.body_mut().tier = enemy.tier().max(tier);
        }
    }

    fn enemy_joins(events: &[ServerEvent]) -> Vec<EntityId> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::EnemyJoined { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn cycle_start_spawns_enemy_one() {
        let mut sched = scheduler();
        let mut world = world_with(1, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let t0 = Instant::now();

        let events = sched.start_cycle(t0, &mut world, &mut rng);
        assert_eq!(sched.phase(), Phase::Running(Stage::One));
        assert!(matches!(events[0], ServerEvent::GameRestart { total_stages: 3, .. }));
        assert_eq!(enemy_joins(&events), vec![EntityId::Enemy(1)]);
        assert_eq!(sched.next_deadline(), Some(t0 + WATCH));
        let enemy = world.enemy(EntityId::Enemy(1)).unwrap();
        assert_eq!(enemy.tier(), Tier::One);
        assert!(world.border.contains(enemy.position()));
    }

    #[test]
    fn fallback_timeout_advances() {
        let mut sched = scheduler();
        let mut world = world_with(1, 2);
        let mut rng = StdRng::seed_from_u64(2);
        let t0 = Instant::now();
        sched.start_cycle(t0, &mut world, &mut rng);

        // Watcher keeps polling without advancing while defaults remain.
        for tick in 1..10 {
            assert!(sched.poll(t0 + WATCH * tick, &mut world, &mut rng).is_empty());
        }

        let events = sched.poll(t0 + DURATION, &mut world, &mut rng);
        assert!(matches!(
            events[0],
            ServerEvent::StageChanged { stage: 2, reason: StageReason::Timeout, .. }
        ));
        assert_eq!(enemy_joins(&events), vec![EntityId::Enemy(2)]);
        assert_eq!(sched.phase(), Phase::Running(Stage::Two));
    }

    #[test]
    fn watcher_advances_early_and_fallback_never_doubles() {
        let mut sched = scheduler();
        let mut world = world_with(2, 3);
        let mut rng = StdRng::seed_from_u64(3);
        let t0 = Instant::now();
        sched.start_cycle(t0, &mut world, &mut rng);

        infect_all(&mut world, Tier::One);
        let events = sched.poll(t0 + WATCH, &mut world, &mut rng);
        assert!(matches!(
            events[0],
            ServerEvent::StageChanged { stage: 2, reason: StageReason::Cleared, .. }
        ));
        assert_eq!(enemy_joins(&events), vec![EntityId::Enemy(2)]);

        // The stage-one fallback moment passes without a second spawn.
        assert!(enemy_joins(&sched.poll(t0 + DURATION, &mut world, &mut rng)).is_empty());
        // A stale trigger for stage one is ignored outright.
        assert!(
            sched
                .advance(Stage::One, StageReason::Timeout, t0 + DURATION, &mut world, &mut rng)
                .is_empty()
        );
        assert_eq!(sched.phase(), Phase::Running(Stage::Two));
        assert_eq!(world.enemies().count(), 2);
    }

    #[test]
    fn simultaneous_timers_advance_once() {
        let mut sched = scheduler();
        let mut world = world_with(1, 0);
        let mut rng = StdRng::seed_from_u64(4);
        let t0 = Instant::now();
        sched.start_cycle(t0, &mut world, &mut rng);
        infect_all(&mut world, Tier::One);

        // Both the fallback and the watcher are overdue at this poll.
        let events = sched.poll(t0 + DURATION * 2, &mut world, &mut rng);
        assert_eq!(enemy_joins(&events), vec![EntityId::Enemy(2)]);
        assert_eq!(sched.phase(), Phase::Running(Stage::Two));
    }

    #[test]
    fn each_enemy_spawns_exactly_once_per_cycle() {
        let mut sched = scheduler();
        let mut world = world_with(1, 1);
        let mut rng = StdRng::seed_from_u64(5);
        let mut now = Instant::now();
        let mut joined = enemy_joins(&sched.start_cycle(now, &mut world, &mut rng));

        // Alternate watcher and fallback paths through all three stages.
        for (stage, early) in [(Stage::One, true), (Stage::Two, false), (Stage::Three, true)] {
            if early {
                infect_all(&mut world, stage.tier());
                now += WATCH;
            } else {
                now += DURATION;
            }
            let events = sched.poll(now, &mut world, &mut rng);
            joined.extend(enemy_joins(&events));
            // Re-firing the trigger for the stage just left changes nothing.
            let again = sched.advance(stage, StageReason::Timeout, now, &mut world, &mut rng);
            assert!(again.is_empty());
        }

        assert_eq!(
            joined,
            vec![EntityId::Enemy(1), EntityId::Enemy(2), EntityId::Enemy(3)]
        );
        assert_eq!(sched.phase(), Phase::GameOver);
        assert!((0..3).all(|i| sched.spawned[i]));
    }

    #[test]
    fn game_over_lists_uninfected_humans_only() {
        let mut sched = scheduler();
        let mut world = world_with(4, 3);
        let mut rng = StdRng::seed_from_u64(6);
        let t0 = Instant::now();
        sched.start_cycle(t0, &mut world, &mut rng);
        world.player_mut(EntityId::Human(1)).unwrap().body_mut().tier = Tier::Two;
        world.player_mut(EntityId::Human(3)).unwrap().body_mut().tier = Tier::One;

        let mut now = t0;
        let mut last = Vec::new();
        for _ in 0..3 {
            now += DURATION;
            last = sched.poll(now, &mut world, &mut rng);
        }

        assert_eq!(
            last,
            vec![ServerEvent::GameOver {
                survivors: vec![EntityId::Human(0), EntityId::Human(2)],
                restart_delay: 10_000,
            }]
        );
        assert_eq!(sched.next_deadline(), Some(now + RESTART));
    }

    #[test]
    fn restart_resets_world() {
        let mut sched = scheduler();
        let mut world = world_with(2, 2);
        let mut rng = StdRng::seed_from_u64(7);
        let mut now = Instant::now();
        sched.start_cycle(now, &mut world, &mut rng);
        for _ in 0..3 {
            now += DURATION;
            sched.poll(now, &mut world, &mut rng);
        }
        infect_all(&mut world, Tier::Three);
        assert_eq!(sched.phase(), Phase::GameOver);

        // Nothing happens before the restart delay elapses.
        assert!(sched.poll(now + RESTART / 2, &mut world, &mut rng).is_empty());

        let events = sched.poll(now + RESTART, &mut world, &mut rng);
        let resets = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::PlayerEmojiChanged { emoji: Tier::Default, .. }))
            .count();
        assert_eq!(resets, 4);
        assert!(events.iter().any(|e| matches!(e, ServerEvent::GameRestart { .. })));
        assert!(world.players().all(|(_, p)| p.tier().is_default()));
        // Only the fresh stage-one enemy remains.
        assert_eq!(
            world.enemies().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![EntityId::Enemy(1)]
        );
        assert_eq!(sched.phase(), Phase::Running(Stage::One));
        assert_eq!(sched.cycle(), 2);
    }

    #[test]
    fn idle_scheduler_does_nothing() {
        let mut sched = scheduler();
        let mut world = world_with(0, 0);
        let mut rng = StdRng::seed_from_u64(8);
        assert!(sched.poll(Instant::now(), &mut world, &mut rng).is_empty());
        assert_eq!(sched.next_deadline(), None);
        assert_eq!(sched.stage_number(), 0);
    }
}
