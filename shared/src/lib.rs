//! Types shared between the authoritative world server and its clients.
//!
//! Everything in this crate is pure data: the synchronized entity model
//! (`entity`), the canonical world aggregate with its snapshot/delta
//! machinery (`world`), and the wire protocol with length-prefixed framing
//! (`protocol`). No networking or clocks live here; callers supply
//! millisecond timestamps explicitly, which keeps every operation
//! deterministic and unit-testable.

pub mod entity;
pub mod protocol;
pub mod world;

pub use entity::{
    biome_at, distance, quantize, Biome, Direction, ItemEntity, ItemKind, PlantedEntity,
    PlayerEntity, RainZone, ResourceEntity, ResourceKind, TilePos,
};
pub use protocol::{decode_message, encode_frame, FrameError, Message, MAX_FRAME_LEN};
pub use world::{RespawnEntry, StateDelta, WorldSnapshot, WorldState};

/// Side length of one terrain tile in world-space pixels. All measurements
/// (attack range, pickup radius, planting range) share this pixel unit.
pub const TILE_SIZE: f32 = 32.0;

pub const WORLD_WIDTH: f32 = 2048.0;
pub const WORLD_HEIGHT: f32 = 2048.0;

pub const PLAYER_MAX_HEALTH: i32 = 100;
/// Maximum legitimate player speed in pixels per second, used by the
/// server's movement validation.
pub const PLAYER_SPEED: f32 = 200.0;

pub const ATTACK_RANGE: f32 = 100.0;
pub const ATTACK_DAMAGE: i32 = 10;
/// Minimum interval between two attacks by the same attacker on the same
/// target. Attacks on different targets are tracked independently.
pub const ATTACK_COOLDOWN_MS: u64 = 500;

pub const PICKUP_RADIUS: f32 = 48.0;

/// Time a planted item needs before it matures into its resource.
pub const GROWTH_DURATION_MS: u64 = 120_000;

/// Distance from a destroyed resource at which dropped items appear.
pub const DROP_SCATTER: f32 = 24.0;
