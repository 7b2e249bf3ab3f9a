//! Infection engine.
//!
//! Each sweep collects the infectors (every enemy, then every player not at
//! the default tier) and converts any strictly weaker player or enemy that
//! touches one. The infector list is fixed at the start of the sweep, so an
//! entity converted in this sweep starts infecting on the next one. Within a
//! sweep the last write wins.

use crate::collision::check_contact;
use crate::entity::Mobile;
use crate::world::World;
use glam::Vec2;
use protocol::{EntityId, ServerEvent, Tier};
use tracing::debug;

/// An infector as captured at the start of the sweep.
#[derive(Debug, Clone, Copy)]
struct Infector {
    id: EntityId,
    position: Vec2,
    tier: Tier,
}

fn infectors(world: &World) -> Vec<Infector> {
    let enemies = world.enemies().map(|(&id, e)| (id, e as &dyn Mobile));
    let players = world.players().map(|(&id, p)| (id, p as &dyn Mobile));
    enemies
        .chain(players)
        .filter(|(_, mobile)| mobile.is_infector())
        .map(|(id, mobile)| Infector {
            id,
            position: mobile.position(),
            tier: mobile.tier(),
        })
        .collect()
}

/// Convert `victim` if it is weaker than `infector` and touching it.
fn try_infect(infector: &Infector, victim: &mut dyn Mobile, radius: f32) -> bool {
    if victim.tier() >= infector.tier {
        return false;
    }
    if !check_contact(infector.position, victim.position(), radius).is_touching() {
        return false;
    }
    victim.body_mut().tier = infector.tier;
    true
}

/// Run one infection sweep, returning an emoji-change event per conversion.
pub fn sweep(world: &mut World, collision_radius: f32) -> Vec<ServerEvent> {
    let mut events = Vec::new();

    for infector in infectors(world) {
        for (&id, player) in world.players_mut() {
            if id != infector.id && try_infect(&infector, player, collision_radius) {
                debug!("{} infected {} ({})", infector.id, id, infector.tier);
                events.push(ServerEvent::PlayerEmojiChanged {
                    id,
                    emoji: infector.tier,
                });
            }
        }
        for (&id, enemy) in world.enemies_mut() {
            if id != infector.id && try_infect(&infector, enemy, collision_radius) {
                debug!("{} infected {} ({})", infector.id, id, infector.tier);
                events.push(ServerEvent::EnemyEmojiChanged {
                    id,
                    emoji: infector.tier,
                });
            }
        }
    }
    events
}
