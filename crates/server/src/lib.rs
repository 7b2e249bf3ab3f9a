//! Authoritative simulation for the infectmoji arena.

pub mod collision;
pub mod config;
pub mod entity;
pub mod infection;
pub mod movement;
pub mod server;
pub mod stage;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use server::{
    BROADCAST_CAPACITY, Broadcast, GameState, Inbound, Joined, drive_connection, publish, run,
    run_game_loop, spawn_game,
};
pub use stage::{Phase, Stage, StageScheduler, TOTAL_STAGES};
pub use world::World;
