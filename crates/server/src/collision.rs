//! Contact detection between avatars.
//!
//! Avatars are equal-sized squares addressed by their top-left corner, so
//! the corner-to-corner distance equals the centre-to-centre distance.
//! Contact is a circular check against the collision radius using squared
//! distances only.

use glam::Vec2;

/// Result of checking contact between two avatars.
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    /// Distance X component
    pub dx: f32,
    /// Distance Y component
    pub dy: f32,
    /// Squared distance
    pub squared: f32,
    /// Squared collision radius
    pub radius_squared: f32,
}

impl Contact {
    /// Check if the avatars actually touch.
    #[inline]
    pub fn is_touching(&self) -> bool {
        self.squared < self.radius_squared
    }
}

/// Check contact between two avatars.
#[inline]
pub fn check_contact(pos: Vec2, other: Vec2, radius: f32) -> Contact {
    let dx = other.x - pos.x;
    let dy = other.y - pos.y;
    Contact {
        dx,
        dy,
        squared: dx * dx + dy * dy,
        radius_squared: radius * radius,
    }
}
