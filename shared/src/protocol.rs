//! Wire protocol: one closed sum type per message kind, carried over a TCP
//! stream as length-prefixed bincode frames.
//!
//! Dispatch on `Message` is exhaustive pattern matching, so adding a kind
//! forces every handler to consider it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::{Direction, ItemKind, ResourceKind};
use crate::world::{RespawnEntry, StateDelta, WorldSnapshot};

/// Hard cap on one serialized message. Frames announcing more than this are
/// protocol errors.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Message {
    // Client -> server
    Join {
        name: String,
    },
    Heartbeat,
    Ping {
        timestamp: u64,
    },
    Disconnect,
    PlayerMovement {
        player_id: String,
        x: f32,
        y: f32,
        direction: Direction,
        timestamp: u64,
    },
    AttackAction {
        attacker_id: String,
        target_id: String,
    },
    ItemPickup {
        item_id: String,
        player_id: String,
    },
    PlantRequest {
        player_id: String,
        item: ItemKind,
        x: f32,
        y: f32,
    },

    // Server -> client
    ConnectionAccepted {
        session_id: u32,
        player_id: String,
        world_seed: u64,
        planting_max_range: f32,
        /// Cadence at which the client is expected to send `Heartbeat`.
        heartbeat_interval_secs: u64,
    },
    ConnectionRejected {
        reason: String,
    },
    Pong {
        timestamp: u64,
    },
    WorldStateSnapshot {
        snapshot: WorldSnapshot,
        pending_respawns: Vec<RespawnEntry>,
    },
    WorldStateDelta {
        delta: StateDelta,
    },
    PositionCorrection {
        x: f32,
        y: f32,
        reason: String,
    },
    HealthUpdate {
        entity_id: String,
        health: i32,
    },
    ResourceDestroyed {
        resource_id: String,
    },
    ResourceRespawn {
        resource_id: String,
        kind: ResourceKind,
        x: f32,
        y: f32,
    },
    ItemSpawn {
        item_id: String,
        kind: ItemKind,
        x: f32,
        y: f32,
    },
    PlantCreated {
        planted_id: String,
        kind: ItemKind,
        x: f32,
        y: f32,
    },
    PlantTransform {
        planted_id: String,
        resource_id: String,
        kind: ResourceKind,
    },
    PlayerJoin {
        player_id: String,
        name: String,
        x: f32,
        y: f32,
    },
    PlayerLeave {
        player_id: String,
    },
    ServerShutdown,
}

/// Framing failures surfaced to the transport layer.
#[derive(Debug)]
pub enum FrameError {
    /// Serialized message exceeds `MAX_FRAME_LEN`.
    Oversized(usize),
    Codec(bincode::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Oversized(len) => {
                write!(f, "frame of {} bytes exceeds cap of {}", len, MAX_FRAME_LEN)
            }
            FrameError::Codec(e) => write!(f, "codec error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<bincode::Error> for FrameError {
    fn from(e: bincode::Error) -> Self {
        FrameError::Codec(e)
    }
}

/// Serializes a message as a `u32` little-endian length prefix followed by
/// the bincode payload.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, FrameError> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::Oversized(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Deserializes one frame payload (without the length prefix).
pub fn decode_message(payload: &[u8]) -> Result<Message, FrameError> {
    Ok(bincode::deserialize(payload)?)
}
