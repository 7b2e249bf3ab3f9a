//! Full stage cycle driven through `GameState` with an explicit clock.

use glam::Vec2;
use protocol::{EntityId, ServerEvent, StageReason, Tier};
use server::entity::Mobile;
use server::{Config, GameState, Phase, Stage};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const WATCH: Duration = Duration::from_millis(500);
const STAGE: Duration = Duration::from_secs(60);
const RESTART: Duration = Duration::from_secs(10);

fn game() -> GameState {
    let mut config = Config::default();
    config.npc.count = 0;
    config.server.seed = Some(2024);
    GameState::new(config)
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn place(game: &mut GameState, id: EntityId, at: Vec2) {
    let body = if id.is_enemy() {
        game.world.enemy_mut(id).unwrap().body_mut()
    } else {
        game.world.player_mut(id).unwrap().body_mut()
    };
    body.position = at;
}

fn enemy_joins(events: &[ServerEvent]) -> Vec<EntityId> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::EnemyJoined { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}

#[test]
fn infection_early_advance_game_over_and_restart() {
    let mut game = game();
    let t0 = Instant::now();
    let events = game.start(t0);
    assert_eq!(enemy_joins(&events), vec![EntityId::Enemy(1)]);

    // A lone human next to the stage-one enemy is infected exactly once.
    let alice = game.join(addr(1)).id;
    place(&mut game, EntityId::Enemy(1), Vec2::new(100.0, 100.0));
    place(&mut game, alice, Vec2::new(105.0, 105.0));
    assert_eq!(
        game.tick_infection(),
        vec![ServerEvent::PlayerEmojiChanged { id: alice, emoji: Tier::One }]
    );
    assert!(game.tick_infection().is_empty());

    // Nobody is left at the default tier: the watcher clears stage one.
    let t1 = t0 + WATCH;
    let events = game.poll_stage(t1);
    assert!(matches!(
        events[0],
        ServerEvent::StageChanged { stage: 2, reason: StageReason::Cleared, .. }
    ));
    assert_eq!(enemy_joins(&events), vec![EntityId::Enemy(2)]);
    assert!(enemy_joins(&game.poll_stage(t0 + STAGE)).is_empty());

    // Bob joins mid-cycle far from every enemy and survives.
    let bob = game.join(addr(2)).id;
    place(&mut game, bob, Vec2::new(560.0, 560.0));

    let t2 = t1 + STAGE;
    assert_eq!(enemy_joins(&game.poll_stage(t2)), vec![EntityId::Enemy(3)]);
    assert_eq!(game.stage.phase(), Phase::Running(Stage::Three));

    let t3 = t2 + STAGE;
    assert_eq!(
        game.poll_stage(t3),
        vec![ServerEvent::GameOver {
            survivors: vec![bob],
            restart_delay: RESTART.as_millis() as u64,
        }]
    );

    // A snapshot taken during game over still reports the last stage.
    let ServerEvent::Init(init) = game.snapshot(bob) else {
        panic!("snapshot must be init");
    };
    assert_eq!(init.stage, 3);
    assert_eq!(init.enemies.len(), 3);

    let events = game.poll_stage(t3 + RESTART);
    assert_eq!(
        events[0],
        ServerEvent::PlayerEmojiChanged { id: alice, emoji: Tier::Default }
    );
    assert!(matches!(
        events[1],
        ServerEvent::GameRestart { total_stages: 3, stage_duration: 60_000, .. }
    ));
    assert_eq!(enemy_joins(&events), vec![EntityId::Enemy(1)]);
    assert!(game.world.players().all(|(_, p)| p.tier() == Tier::Default));
    assert_eq!(game.world.enemies().count(), 1);
    assert_eq!(game.stage.cycle(), 2);
}

#[test]
fn disconnect_mid_cycle_leaves_no_trace() {
    let mut game = game();
    let t0 = Instant::now();
    game.start(t0);

    let alice = game.join(addr(1)).id;
    let bob = game.join(addr(2)).id;
    game.leave(alice);

    // Ticks and stage polls never revisit the removed id.
    for step in 1..=4 {
        for event in game
            .tick_npcs()
            .into_iter()
            .chain(game.tick_enemies())
            .chain(game.tick_infection())
            .chain(game.poll_stage(t0 + WATCH * step))
        {
            let id = match event {
                ServerEvent::PlayerMoved { id, .. } | ServerEvent::PlayerEmojiChanged { id, .. } => id,
                _ => continue,
            };
            assert_ne!(id, alice);
        }
    }
    assert!(game.world.player(alice).is_none());
    assert!(game.world.player(bob).is_some());
}
