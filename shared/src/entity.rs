//! Synchronized entity kinds and the terrain/biome lookup.
//!
//! Resource and item behavior differences (health pools, respawn timing,
//! drop tables, planting targets) are table lookups keyed by a closed enum
//! tag rather than per-type structs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{PLAYER_MAX_HEALTH, TILE_SIZE};

/// Rounds a world-space coordinate to a whole pixel.
///
/// Positions are quantized before storage so that deltas stay compact and
/// repeated float arithmetic cannot diverge between server and clients.
pub fn quantize(v: f32) -> f32 {
    v.round()
}

/// Euclidean distance between two world-space points.
pub fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    (dx * dx + dy * dy).sqrt()
}

/// Integer tile coordinates, one tile per `TILE_SIZE` pixels.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub fn from_world(x: f32, y: f32) -> Self {
        Self {
            x: (x / TILE_SIZE).floor() as i32,
            y: (y / TILE_SIZE).floor() as i32,
        }
    }

    /// World-space position of the tile's top-left corner.
    pub fn to_world(self) -> (f32, f32) {
        (self.x as f32 * TILE_SIZE, self.y as f32 * TILE_SIZE)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Biome {
    Grass,
    Sand,
    Rock,
}

/// Deterministic biome lookup derived purely from the world seed.
///
/// Tiles are grouped into 8x8 regions so biomes form contiguous patches.
/// Every participant that knows the seed computes identical terrain, so
/// biomes never travel over the wire.
pub fn biome_at(seed: u64, tile: TilePos) -> Biome {
    const REGION: i32 = 8;
    let rx = tile.x.div_euclid(REGION) as i64 as u64;
    let ry = tile.y.div_euclid(REGION) as i64 as u64;

    // splitmix64 over (seed, region) for a stable pseudo-random spread
    let mut h = seed
        .wrapping_add(rx.wrapping_mul(0x9e37_79b9_7f4a_7c15))
        .wrapping_add(ry.wrapping_mul(0xbf58_476d_1ce4_e5b9));
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^= h >> 31;

    match h % 8 {
        0..=4 => Biome::Grass,
        5 | 6 => Biome::Sand,
        _ => Biome::Rock,
    }
}

/// Destructible world resource variants.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    SmallTree,
    AppleTree,
    BananaTree,
    Cactus,
    Rock,
}

impl ResourceKind {
    pub fn max_health(self) -> i32 {
        match self {
            ResourceKind::SmallTree => 30,
            ResourceKind::AppleTree => 50,
            ResourceKind::BananaTree => 50,
            ResourceKind::Cactus => 20,
            ResourceKind::Rock => 80,
        }
    }

    /// How long a destroyed resource of this kind stays gone.
    pub fn respawn_duration_ms(self) -> u64 {
        match self {
            ResourceKind::SmallTree => 60_000,
            ResourceKind::AppleTree => 90_000,
            ResourceKind::BananaTree => 90_000,
            ResourceKind::Cactus => 60_000,
            ResourceKind::Rock => 120_000,
        }
    }

    /// Items spawned around the resource when it is destroyed.
    pub fn drops(self) -> &'static [ItemKind] {
        match self {
            ResourceKind::SmallTree => &[ItemKind::Wood],
            ResourceKind::AppleTree => &[ItemKind::Wood, ItemKind::Apple],
            ResourceKind::BananaTree => &[ItemKind::Wood, ItemKind::Banana],
            ResourceKind::Cactus => &[ItemKind::CactusFruit],
            ResourceKind::Rock => &[ItemKind::Stone],
        }
    }

    /// Biome this kind appears in during world generation.
    pub fn native_biome(self) -> Biome {
        match self {
            ResourceKind::Cactus => Biome::Sand,
            ResourceKind::Rock => Biome::Rock,
            _ => Biome::Grass,
        }
    }
}

/// Collectible item variants.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Wood,
    Stone,
    Apple,
    Banana,
    CactusFruit,
}

impl ItemKind {
    /// The resource this item grows into when planted, with the biome the
    /// target tile must have. `None` means the item cannot be planted.
    pub fn plants_into(self) -> Option<(ResourceKind, Biome)> {
        match self {
            ItemKind::Wood => Some((ResourceKind::SmallTree, Biome::Grass)),
            ItemKind::Apple => Some((ResourceKind::AppleTree, Biome::Grass)),
            ItemKind::Banana => Some((ResourceKind::BananaTree, Biome::Grass)),
            ItemKind::CactusFruit => Some((ResourceKind::Cactus, Biome::Sand)),
            ItemKind::Stone => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerEntity {
    pub id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    pub health: i32,
    pub inventory: HashMap<ItemKind, u32>,
    /// Millisecond stamp of the last mutation, drives delta computation.
    pub updated_at: u64,
}

impl PlayerEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, x: f32, y: f32, now: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            x: quantize(x),
            y: quantize(y),
            direction: Direction::default(),
            health: PLAYER_MAX_HEALTH,
            inventory: HashMap::new(),
            updated_at: now,
        }
    }

    pub fn inventory_count(&self, kind: ItemKind) -> u32 {
        self.inventory.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResourceEntity {
    pub id: String,
    pub kind: ResourceKind,
    pub x: f32,
    pub y: f32,
    pub health: i32,
    pub updated_at: u64,
}

impl ResourceEntity {
    pub fn new(id: impl Into<String>, kind: ResourceKind, x: f32, y: f32, now: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            x: quantize(x),
            y: quantize(y),
            health: kind.max_health(),
            updated_at: now,
        }
    }

    pub fn tile(&self) -> TilePos {
        TilePos::from_world(self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ItemEntity {
    pub id: String,
    pub kind: ItemKind,
    pub x: f32,
    pub y: f32,
    pub updated_at: u64,
}

impl ItemEntity {
    pub fn new(id: impl Into<String>, kind: ItemKind, x: f32, y: f32, now: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            x: quantize(x),
            y: quantize(y),
            updated_at: now,
        }
    }
}

/// An in-progress growth: a planted item that has not yet matured.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlantedEntity {
    pub id: String,
    pub kind: ItemKind,
    pub x: f32,
    pub y: f32,
    /// Wall-clock millisecond stamp of planting. Stored absolute so growth
    /// that elapsed while the server was stopped counts after a restore.
    pub planted_at: u64,
    pub updated_at: u64,
}

impl PlantedEntity {
    pub fn new(id: impl Into<String>, kind: ItemKind, x: f32, y: f32, now: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            x: quantize(x),
            y: quantize(y),
            planted_at: now,
            updated_at: now,
        }
    }

    pub fn growth_elapsed_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.planted_at)
    }

    pub fn is_mature(&self, now: u64, maturation_ms: u64) -> bool {
        self.growth_elapsed_ms(now) >= maturation_ms
    }

    pub fn tile(&self) -> TilePos {
        TilePos::from_world(self.x, self.y)
    }
}

/// Active weather zone; rain falls within `radius` of the center.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RainZone {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}
