//! Shared body data and the mobile entity trait.

use glam::Vec2;
use protocol::{EntityView, Tier};

/// State shared by every mobile entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Infection tier (the avatar emoji).
    pub tier: Tier,
    /// Top-left corner of the avatar.
    pub position: Vec2,
    /// Steering direction used by autonomous entities.
    pub direction: Vec2,
    /// Ticks before the wander policy re-rolls `direction`.
    pub steps_remaining: i32,
}

impl Body {
    pub fn new(tier: Tier, position: Vec2) -> Self {
        Self {
            tier,
            position,
            direction: Vec2::ZERO,
            steps_remaining: 0,
        }
    }

    /// Clamp the position into `[0, max]` on both axes.
    #[inline]
    pub fn check_border(&mut self, max: f32) {
        self.position = self.position.clamp(Vec2::ZERO, Vec2::splat(max));
    }

    /// Client-facing view of this body.
    #[inline]
    pub fn view(&self) -> EntityView {
        EntityView {
            emoji: self.tier,
            x: self.position.x,
            y: self.position.y,
        }
    }
}

/// Trait for everything that moves in the arena.
pub trait Mobile: Send + Sync {
    /// Get the shared body.
    fn body(&self) -> &Body;

    /// Get the shared body mutably.
    fn body_mut(&mut self) -> &mut Body;

    /// Whether the server steers this entity (NPCs and enemies).
    fn is_autonomous(&self) -> bool;

    /// Pixels moved per steering tick.
    fn speed(&self, npc_speed: f32, enemy_speed: f32) -> f32;

    #[inline]
    fn tier(&self) -> Tier {
        self.body().tier
    }

    #[inline]
    fn position(&self) -> Vec2 {
        self.body().position
    }

    /// Infectors are entities allowed to convert weaker ones on contact.
    fn is_infector(&self) -> bool {
        !self.tier().is_default()
    }
}
