//! Movement engine.
//!
//! Autonomous entities (NPCs and enemies) scan everything within the
//! tracking radius, flee the nearest stronger entity, otherwise chase the
//! nearest weaker one, otherwise wander: run straight for a random number
//! of ticks, then re-roll the heading. Humans skip steering entirely and
//! take their position from client input.

use crate::config::Config;
use crate::entity::{Body, Mobile};
use crate::world::World;
use glam::Vec2;
use protocol::{EntityId, ServerEvent, Tier};
use rand::Rng;

/// Wander headings: the eight compass directions plus idle.
pub const DIRECTIONS: [Vec2; 9] = [
    Vec2::new(0.0, 1.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(0.0, -1.0),
    Vec2::new(-1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(1.0, -1.0),
    Vec2::new(-1.0, 1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(0.0, 0.0),
];

/// Steering constants, copied out of the config.
#[derive(Debug, Clone, Copy)]
pub struct Steering {
    pub npc_speed: f32,
    pub enemy_speed: f32,
    pub track_distance: f32,
    pub min_steps: i32,
    pub max_steps: i32,
}

impl Steering {
    pub fn from_config(config: &Config) -> Self {
        Self {
            npc_speed: config.npc.speed,
            enemy_speed: config.enemy.speed,
            track_distance: config.npc.track_distance,
            min_steps: config.npc.min_steps,
            max_steps: config.npc.max_steps,
        }
    }
}

/// Pick a wander heading and how many ticks to hold it.
pub fn roll_wander<R: Rng + ?Sized>(rng: &mut R, min_steps: i32, max_steps: i32) -> (Vec2, i32) {
    let direction = DIRECTIONS[rng.random_range(0..DIRECTIONS.len())];
    let steps = rng.random_range(min_steps..=max_steps.max(min_steps));
    (direction, steps)
}

/// An entity as seen by the start-of-tick scan.
#[derive(Debug, Clone, Copy)]
pub struct Sighting {
    pub id: EntityId,
    pub position: Vec2,
    pub tier: Tier,
}

/// Snapshot every entity's id, position and tier.
pub fn survey(world: &World) -> Vec<Sighting> {
    let mut sightings = Vec::new();
    world.for_each(|id, mobile| {
        sightings.push(Sighting {
            id,
            position: mobile.position(),
            tier: mobile.tier(),
        });
    });
    sightings
}

/// Outcome of the targeting scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct Targets {
    /// Nearest strictly stronger entity in range.
    pub flee: Option<Sighting>,
    /// Nearest strictly weaker entity in range.
    pub chase: Option<Sighting>,
}

/// Find the nearest stronger and nearest weaker entity within `track_distance`.
///
/// Ties keep the first entity encountered.
pub fn scan(me: EntityId, body: &Body, sightings: &[Sighting], track_distance: f32) -> Targets {
    let range_sq = track_distance * track_distance;
    let mut targets = Targets::default();
    let mut flee_sq = f32::INFINITY;
    let mut chase_sq = f32::INFINITY;

    for other in sightings {
        if other.id == me {
            continue;
        }
        let dist_sq = body.position.distance_squared(other.position);
        if dist_sq > range_sq {
            continue;
        }
        if other.tier > body.tier && dist_sq < flee_sq {
            flee_sq = dist_sq;
            targets.flee = Some(*other);
        } else if other.tier < body.tier && dist_sq < chase_sq {
            chase_sq = dist_sq;
            targets.chase = Some(*other);
        }
    }
    targets
}

/// Set the body's heading from its targets, falling back to wandering.
pub fn steer<R: Rng + ?Sized>(body: &mut Body, targets: Targets, steering: &Steering, rng: &mut R) {
    if let Some(threat) = targets.flee {
        body.direction = -(threat.position - body.position).normalize_or_zero();
    } else if let Some(prey) = targets.chase {
        body.direction = (prey.position - body.position).normalize_or_zero();
    } else {
        if body.steps_remaining <= 0 {
            let (direction, steps) = roll_wander(rng, steering.min_steps, steering.max_steps);
            body.direction = direction;
            body.steps_remaining = steps;
        }
        body.steps_remaining -= 1;
    }
}

/// Advance a body along its heading and clamp it to the border.
#[inline]
pub fn integrate(body: &mut Body, speed: f32, border_max: f32) {
    body.position += body.direction * speed;
    body.check_border(border_max);
}

/// One NPC movement tick. Emits `playerMoved` for every NPC.
pub fn step_npcs<R: Rng + ?Sized>(world: &mut World, steering: &Steering, rng: &mut R) -> Vec<ServerEvent> {
    let sightings = survey(world);
    let border_max = world.border.max();
    let mut events = Vec::new();

    for (&id, npc) in world.players_mut() {
        if !npc.is_autonomous() {
            continue;
        }
        let speed = npc.speed(steering.npc_speed, steering.enemy_speed);
        let body = npc.body_mut();
        let targets = scan(id, body, &sightings, steering.track_distance);
        steer(body, targets, steering, rng);
        integrate(body, speed, border_max);
        events.push(ServerEvent::PlayerMoved {
            id,
            x: body.position.x,
            y: body.position.y,
        });
    }
    events
}

/// One enemy movement tick. Emits `enemyMoved` for every enemy.
pub fn step_enemies<R: Rng + ?Sized>(world: &mut World, steering: &Steering, rng: &mut R) -> Vec<ServerEvent> {
    let sightings = survey(world);
    let border_max = world.border.max();
    let mut events = Vec::new();

    for (&id, enemy) in world.enemies_mut() {
        let speed = enemy.speed(steering.npc_speed, steering.enemy_speed);
        let body = enemy.body_mut();
        let targets = scan(id, body, &sightings, steering.track_distance);
        steer(body, targets, steering, rng);
        integrate(body, speed, border_max);
        events.push(ServerEvent::EnemyMoved {
            id,
            x: body.position.x,
            y: body.position.y,
        });
    }
    events
}

/// Store a human's self-reported position.
///
/// The position is clamped to the border and, when `max_step > 0`, limited
/// to `max_step` away from the previous one. Returns `None` for unknown or
/// non-human ids (a move racing a disconnect).
pub fn apply_human_move(world: &mut World, id: EntityId, target: Vec2, max_step: f32) -> Option<ServerEvent> {
    let border = world.border;
    let player = world.player_mut(id)?;
    if player.is_autonomous() {
        return None;
    }
    let body = player.body_mut();

    let mut next = target;
    if max_step > 0.0 {
        let delta = next - body.position;
        if delta.length() > max_step {
            next = body.position + delta.normalize_or_zero() * max_step;
        }
    }
    body.position = border.clamp(next);

    Some(ServerEvent::PlayerMoved {
        id,
        x: body.position.x,
        y: body.position.y,
    })
}
