//! Human players and NPCs.

use super::body::{Body, Mobile};
use glam::Vec2;
use protocol::Tier;
use std::net::SocketAddr;

/// Who controls a player entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    /// A connected client; position comes from its `move` messages.
    Human { addr: SocketAddr },
    /// A server-steered bot.
    Npc,
}

/// A player avatar (human or NPC).
#[derive(Debug, Clone)]
pub struct Player {
    body: Body,
    pub kind: PlayerKind,
}

impl Player {
    /// Create a human player at the default tier.
    pub fn human(addr: SocketAddr, position: Vec2) -> Self {
        Self {
            body: Body::new(Tier::Default, position),
            kind: PlayerKind::Human { addr },
        }
    }

    /// Create an NPC with an initial wander direction.
    pub fn npc(position: Vec2, direction: Vec2, steps: i32) -> Self {
        let mut body = Body::new(Tier::Default, position);
        body.direction = direction;
        body.steps_remaining = steps;
        Self {
            body,
            kind: PlayerKind::Npc,
        }
    }

    #[inline]
    pub fn is_human(&self) -> bool {
        matches!(self.kind, PlayerKind::Human { .. })
    }

    /// Remote address of a human player.
    pub fn addr(&self) -> Option<SocketAddr> {
        match self.kind {
            PlayerKind::Human { addr } => Some(addr),
            PlayerKind::Npc => None,
        }
    }
}

impl Mobile for Player {
    fn body(&self) -> &Body {
        &self.body
    }

    fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    fn is_autonomous(&self) -> bool {
        !self.is_human()
    }

    fn speed(&self, npc_speed: f32, _enemy_speed: f32) -> f32 {
        npc_speed
    }
}
