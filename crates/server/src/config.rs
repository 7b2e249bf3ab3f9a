//! Server configuration.
//!
//! Values come from `config.toml` (written with defaults when missing) and
//! can then be overridden one by one from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Configuration errors detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for environment variable {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub npc: NpcConfig,
    #[serde(default)]
    pub enemy: EnemyConfig,
    #[serde(default)]
    pub infection: InfectionConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults, then apply
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_file(Path::new("config.toml"))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Override individual values from `lookup` (the process environment in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "PORT", &mut self.server.port)?;
        override_from(&lookup, "BIND", &mut self.server.bind)?;
        override_from(&lookup, "CANVAS_SIZE", &mut self.world.canvas_size)?;
        override_from(&lookup, "ENTITY_SIZE", &mut self.world.entity_size)?;
        override_from(&lookup, "COLLISION_RADIUS", &mut self.world.collision_radius)?;
        override_from(&lookup, "NPC_COUNT", &mut self.npc.count)?;
        override_from(&lookup, "NPC_SPEED", &mut self.npc.speed)?;
        override_from(&lookup, "TRACK_DISTANCE", &mut self.npc.track_distance)?;
        override_from(&lookup, "ENEMY_SPEED", &mut self.enemy.speed)?;
        override_from(&lookup, "STAGE_DURATION_MS", &mut self.stage.duration_ms)?;
        override_from(&lookup, "RESTART_DELAY_MS", &mut self.stage.restart_delay_ms)?;
        if let Some(raw) = lookup("RNG_SEED") {
            let seed = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "RNG_SEED",
                value: raw.clone(),
            })?;
            self.server.seed = Some(seed);
        }
        Ok(())
    }

    /// Reject combinations the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.entity_size <= 0.0 || self.world.entity_size >= self.world.canvas_size {
            return Err(ConfigError::Invalid(format!(
                "entity_size {} must be positive and smaller than canvas_size {}",
                self.world.entity_size, self.world.canvas_size
            )));
        }
        if self.npc.min_steps > self.npc.max_steps {
            return Err(ConfigError::Invalid(format!(
                "npc.min_steps {} exceeds npc.max_steps {}",
                self.npc.min_steps, self.npc.max_steps
            )));
        }
        let intervals = [
            ("npc.tick_interval_ms", self.npc.tick_interval_ms),
            ("enemy.tick_interval_ms", self.enemy.tick_interval_ms),
            ("infection.tick_interval_ms", self.infection.tick_interval_ms),
            ("stage.watcher_interval_ms", self.stage.watcher_interval_ms),
            ("stage.duration_ms", self.stage.duration_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        Ok(())
    }
}

fn override_from<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key,
            value: raw.clone(),
        })?;
    }
    Ok(())
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections (headless listener).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit (headless listener).
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Seed for the simulation RNG. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            seed: None,
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    256
}
fn default_ip_limit() -> usize {
    16
}

/// Arena geometry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    /// Side of the square arena.
    #[serde(default = "default_canvas_size")]
    pub canvas_size: f32,
    /// Side of an avatar's bounding square.
    #[serde(default = "default_entity_size")]
    pub entity_size: f32,
    /// Centre distance below which two avatars touch.
    #[serde(default = "default_collision_radius")]
    pub collision_radius: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            canvas_size: default_canvas_size(),
            entity_size: default_entity_size(),
            collision_radius: default_collision_radius(),
        }
    }
}

fn default_canvas_size() -> f32 {
    600.0
}
fn default_entity_size() -> f32 {
    32.0
}
fn default_collision_radius() -> f32 {
    default_entity_size() / 2.0
}

/// NPC (bot) population and steering.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NpcConfig {
    #[serde(default = "default_npc_count")]
    pub count: u32,
    /// Pixels per movement tick.
    #[serde(default = "default_npc_speed")]
    pub speed: f32,
    #[serde(default = "default_min_steps")]
    pub min_steps: i32,
    #[serde(default = "default_max_steps")]
    pub max_steps: i32,
    /// Radius of the chase/flee scan (shared by enemies).
    #[serde(default = "default_track_distance")]
    pub track_distance: f32,
    #[serde(default = "default_npc_tick")]
    pub tick_interval_ms: u64,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            count: default_npc_count(),
            speed: default_npc_speed(),
            min_steps: default_min_steps(),
            max_steps: default_max_steps(),
            track_distance: default_track_distance(),
            tick_interval_ms: default_npc_tick(),
        }
    }
}

fn default_npc_count() -> u32 {
    100
}
fn default_npc_speed() -> f32 {
    2.0
}
fn default_min_steps() -> i32 {
    10
}
fn default_max_steps() -> i32 {
    30
}
fn default_track_distance() -> f32 {
    150.0
}
fn default_npc_tick() -> u64 {
    50
}

/// Enemy steering.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnemyConfig {
    /// Pixels per enemy tick.
    #[serde(default = "default_enemy_speed")]
    pub speed: f32,
    #[serde(default = "default_enemy_tick")]
    pub tick_interval_ms: u64,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            speed: default_enemy_speed(),
            tick_interval_ms: default_enemy_tick(),
        }
    }
}

fn default_enemy_speed() -> f32 {
    3.0
}
fn default_enemy_tick() -> u64 {
    100
}

/// Infection sweep cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InfectionConfig {
    #[serde(default = "default_infection_tick")]
    pub tick_interval_ms: u64,
}

impl Default for InfectionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_infection_tick(),
        }
    }
}

fn default_infection_tick() -> u64 {
    50
}

/// Stage cycle timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
    /// Fallback duration of each stage.
    #[serde(default = "default_stage_duration")]
    pub duration_ms: u64,
    /// Early-advance check cadence.
    #[serde(default = "default_watcher_interval")]
    pub watcher_interval_ms: u64,
    /// Pause between game over and the next cycle.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_stage_duration(),
            watcher_interval_ms: default_watcher_interval(),
            restart_delay_ms: default_restart_delay(),
        }
    }
}

fn default_stage_duration() -> u64 {
    60_000
}
fn default_watcher_interval() -> u64 {
    500
}
fn default_restart_delay() -> u64 {
    10_000
}

/// Human player input handling.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Largest distance a single `move` may cover (0 disables the limit).
    #[serde(default)]
    pub max_move_step: f32,
}
