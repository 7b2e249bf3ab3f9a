//! Shared protocol crate for infectmoji.
//!
//! This crate contains:
//! - Strength tiers and their emoji glyphs
//! - Typed entity identifiers with their wire spelling
//! - Event definitions for both directions (JSON text frames)

mod error;
pub mod events;

pub use error::ProtocolError;
pub use events::{ClientMessage, EntityView, InitSnapshot, ServerEvent, StageReason};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Ordered strength tier of an emoji avatar.
///
/// The derived ordering is the infection order: an entity only infects
/// entities of a strictly lower tier.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Tier {
    /// Uninfected avatar.
    #[default]
    Default = 0,
    /// First wave.
    One = 1,
    /// Second wave.
    Two = 2,
    /// Third wave.
    Three = 3,
}

impl Tier {
    /// Every tier, weakest first.
    pub const ALL: [Tier; 4] = [Tier::Default, Tier::One, Tier::Two, Tier::Three];

    /// Infection strength (0 for the default tier).
    #[inline]
    pub const fn strength(self) -> u8 {
        self as u8
    }

    /// Glyph drawn by clients and carried on the wire.
    pub const fn emoji(self) -> &'static str {
        match self {
            Tier::Default => "😊",
            Tier::One => "🤔",
            Tier::Two => "😷",
            Tier::Three => "🧟",
        }
    }

    pub fn from_emoji(glyph: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.emoji() == glyph)
    }

    /// Tier for a strength value, `None` above tier 3.
    pub const fn from_strength(strength: u8) -> Option<Self> {
        match strength {
            0 => Some(Tier::Default),
            1 => Some(Tier::One),
            2 => Some(Tier::Two),
            3 => Some(Tier::Three),
            _ => None,
        }
    }

    #[inline]
    pub fn is_default(self) -> bool {
        self == Tier::Default
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.emoji())
    }
}

impl Serialize for Tier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.emoji())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let glyph = String::deserialize(deserializer)?;
        Tier::from_emoji(&glyph)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown emoji {glyph:?}")))
    }
}

/// Identifier of anything that moves in the arena.
///
/// Humans are keyed by their connection id, NPCs by a spawn index under the
/// reserved `npc_` prefix, and enemies by the tier they were spawned at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    Human(u32),
    Npc(u32),
    Enemy(u8),
}

impl EntityId {
    /// Enemy id for a spawn tier (`enemy1`, `enemy2`, `enemy3`).
    #[inline]
    pub const fn enemy(tier: Tier) -> Self {
        EntityId::Enemy(tier.strength())
    }

    #[inline]
    pub fn is_human(&self) -> bool {
        matches!(self, EntityId::Human(_))
    }

    #[inline]
    pub fn is_npc(&self) -> bool {
        matches!(self, EntityId::Npc(_))
    }

    #[inline]
    pub fn is_enemy(&self) -> bool {
        matches!(self, EntityId::Enemy(_))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Human(id) => write!(f, "player_{id}"),
            EntityId::Npc(id) => write!(f, "npc_{id}"),
            EntityId::Enemy(tier) => write!(f, "enemy{tier}"),
        }
    }
}

impl FromStr for EntityId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidEntityId(s.to_string());
        if let Some(rest) = s.strip_prefix("player_") {
            rest.parse().map(EntityId::Human).map_err(|_| invalid())
        } else if let Some(rest) = s.strip_prefix("npc_") {
            rest.parse().map(EntityId::Npc).map_err(|_| invalid())
        } else if let Some(rest) = s.strip_prefix("enemy") {
            match rest.parse::<u8>() {
                Ok(tier @ 1..=3) => Ok(EntityId::Enemy(tier)),
                _ => Err(invalid()),
            }
        } else {
            Err(invalid())
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
