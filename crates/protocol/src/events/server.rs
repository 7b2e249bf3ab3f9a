//! Server -> Client event building.

use crate::{EntityId, ProtocolError, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position and avatar of one entity as clients see it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub emoji: Tier,
    pub x: f32,
    pub y: f32,
}

/// Full world snapshot sent to a client right after it connects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSnapshot {
    /// The receiving client's own entity.
    pub id: EntityId,
    pub players: BTreeMap<EntityId, EntityView>,
    pub enemies: BTreeMap<EntityId, EntityView>,
    /// Wall-clock start of the current stage (ms since the Unix epoch).
    pub stage_epoch: u64,
    /// Fallback duration of each stage in ms.
    pub stage_duration: u64,
    pub total_stages: u8,
    /// Current 1-based stage.
    pub stage: u8,
}

/// Why the scheduler left a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageReason {
    /// The fixed stage duration elapsed.
    Timeout,
    /// Nobody was left below the stage tier.
    Cleared,
}

/// Events broadcast to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Init(InitSnapshot),
    PlayerJoined { id: EntityId, player: EntityView },
    PlayerMoved { id: EntityId, x: f32, y: f32 },
    PlayerLeft { id: EntityId },
    EnemyJoined { id: EntityId, emoji: Tier, x: f32, y: f32 },
    EnemyMoved { id: EntityId, x: f32, y: f32 },
    PlayerEmojiChanged { id: EntityId, emoji: Tier },
    EnemyEmojiChanged { id: EntityId, emoji: Tier },
    StageChanged { stage: u8, stage_epoch: u64, reason: StageReason },
    GameOver { survivors: Vec<EntityId>, restart_delay: u64 },
    GameRestart { stage_epoch: u64, stage_duration: u64, total_stages: u8 },
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Init(_) => "init",
            ServerEvent::PlayerJoined { .. } => "playerJoined",
            ServerEvent::PlayerMoved { .. } => "playerMoved",
            ServerEvent::PlayerLeft { .. } => "playerLeft",
            ServerEvent::EnemyJoined { .. } => "enemyJoined",
            ServerEvent::EnemyMoved { .. } => "enemyMoved",
            ServerEvent::PlayerEmojiChanged { .. } => "playerEmojiChanged",
            ServerEvent::EnemyEmojiChanged { .. } => "enemyEmojiChanged",
            ServerEvent::StageChanged { .. } => "stageChanged",
            ServerEvent::GameOver { .. } => "gameOver",
            ServerEvent::GameRestart { .. } => "gameRestart",
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame (used by clients and tests).
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}
