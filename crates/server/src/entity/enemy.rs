//! Stage enemies.

use super::body::{Body, Mobile};
use glam::Vec2;
use protocol::Tier;

/// An enemy spawned by the stage scheduler. Always autonomous, always an
/// infector.
#[derive(Debug, Clone)]
pub struct Enemy {
    body: Body,
}

impl Enemy {
    /// Create an enemy at its spawn tier.
    pub fn new(tier: Tier, position: Vec2) -> Self {
        Self {
            body: Body::new(tier, position),
        }
    }
}

impl Mobile for Enemy {
    fn body(&self) -> &Body {
        &self.body
    }

    fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    fn is_autonomous(&self) -> bool {
        true
    }

    fn speed(&self, _npc_speed: f32, enemy_speed: f32) -> f32 {
        enemy_speed
    }

    fn is_infector(&self) -> bool {
        true
    }
}
