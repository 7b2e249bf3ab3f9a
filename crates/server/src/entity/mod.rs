//! Mobile entities.
//!
//! Players (humans and NPCs) and enemies share one body shape and are
//! stored in two typed collections of the world.

mod body;
mod enemy;
mod player;

pub use body::{Body, Mobile};
pub use enemy::Enemy;
pub use player::{Player, PlayerKind};
