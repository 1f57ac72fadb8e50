//! Canonical world state and its snapshot/delta machinery.
//!
//! `WorldState` is the aggregate the server mutates through a single
//! serialized decision path; clients rebuild read-only projections from a
//! `WorldSnapshot` plus an ordered stream of `StateDelta`s. Applying the
//! same delta stream from the same snapshot always converges on the same
//! state, and reapplying a delta is a no-op.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::entity::{
    quantize, Direction, ItemEntity, ItemKind, PlantedEntity, PlayerEntity, RainZone,
    ResourceEntity, ResourceKind, TilePos,
};

/// Upper bound on remembered removals for delta computation. Clients that
/// fall further behind than this receive a fresh snapshot instead.
const REMOVAL_LOG_CAP: usize = 4096;

/// A pending regeneration of a destroyed resource.
///
/// Consumed exactly once: when due, the same resource id reappears at the
/// same position with full health.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RespawnEntry {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub x: f32,
    pub y: f32,
    /// Absolute wall-clock milliseconds; survives save/restore so timers
    /// that matured while the process was stopped fire immediately on load.
    pub destroyed_at: u64,
    pub respawn_duration_ms: u64,
}

impl RespawnEntry {
    pub fn is_due(&self, now: u64) -> bool {
        now.saturating_sub(self.destroyed_at) >= self.respawn_duration_ms
    }
}

/// Immutable full copy of the synchronized world, sent to joining clients
/// and written to save files.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub seed: u64,
    pub players: Vec<PlayerEntity>,
    pub resources: Vec<ResourceEntity>,
    pub items: Vec<ItemEntity>,
    pub planted: Vec<PlantedEntity>,
    pub cleared_positions: Vec<TilePos>,
    pub rain_zones: Vec<RainZone>,
}

/// Partial update containing only entities changed since a reference point.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct StateDelta {
    pub timestamp: u64,
    pub players: Vec<PlayerEntity>,
    pub resources: Vec<ResourceEntity>,
    pub items: Vec<ItemEntity>,
    pub planted: Vec<PlantedEntity>,
    pub removed_players: Vec<String>,
    pub removed_resources: Vec<String>,
    pub removed_items: Vec<String>,
    pub removed_planted: Vec<String>,
    /// Full replacement sets, present only when they changed.
    pub cleared_positions: Option<Vec<TilePos>>,
    pub rain_zones: Option<Vec<RainZone>>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
            && self.resources.is_empty()
            && self.items.is_empty()
            && self.planted.is_empty()
            && self.removed_players.is_empty()
            && self.removed_resources.is_empty()
            && self.removed_items.is_empty()
            && self.removed_planted.is_empty()
            && self.cleared_positions.is_none()
            && self.rain_zones.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Players,
    Resources,
    Items,
    Planted,
}

#[derive(Debug, Clone)]
struct Removal {
    at: u64,
    collection: Collection,
    id: String,
}

/// The canonical, mutable world. Exclusively owned by the server's decision
/// path; every mutator quantizes positions and stamps `updated_at` so
/// `compute_delta` can pick up the change.
#[derive(Debug)]
pub struct WorldState {
    pub seed: u64,
    pub players: HashMap<String, PlayerEntity>,
    pub resources: HashMap<String, ResourceEntity>,
    pub items: HashMap<String, ItemEntity>,
    pub planted: HashMap<String, PlantedEntity>,
    /// Tiles where a destroyed resource stood; regeneration skips them
    /// until the pending respawn consumes the entry.
    pub cleared_positions: HashSet<TilePos>,
    pub rain_zones: Vec<RainZone>,
    removals: VecDeque<Removal>,
    sets_updated_at: u64,
    next_entity_id: u64,
}

impl WorldState {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            players: HashMap::new(),
            resources: HashMap::new(),
            items: HashMap::new(),
            planted: HashMap::new(),
            cleared_positions: HashSet::new(),
            rain_zones: Vec::new(),
            removals: VecDeque::new(),
            sets_updated_at: 0,
            next_entity_id: 1,
        }
    }

    /// Allocates a fresh unique entity id with the given prefix.
    pub fn alloc_id(&mut self, prefix: &str) -> String {
        let id = format!("{}-{}", prefix, self.next_entity_id);
        self.next_entity_id += 1;
        id
    }

    // ---- snapshot / delta -------------------------------------------------

    /// Rebuilds a world from a snapshot, e.g. on a client or after a load.
    pub fn apply_snapshot(snapshot: WorldSnapshot) -> Self {
        let max_numeric_suffix = |ids: &mut dyn Iterator<Item = &String>| -> u64 {
            ids.filter_map(|id| id.rsplit('-').next())
                .filter_map(|n| n.parse::<u64>().ok())
                .max()
                .unwrap_or(0)
        };

        let mut world = WorldState::new(snapshot.seed);
        for player in snapshot.players {
            world.players.insert(player.id.clone(), player);
        }
        for resource in snapshot.resources {
            world.resources.insert(resource.id.clone(), resource);
        }
        for item in snapshot.items {
            world.items.insert(item.id.clone(), item);
        }
        for planted in snapshot.planted {
            world.planted.insert(planted.id.clone(), planted);
        }
        world.cleared_positions = snapshot.cleared_positions.into_iter().collect();
        world.rain_zones = snapshot.rain_zones;

        // Continue id allocation above anything restored.
        let mut all_ids = world
            .players
            .keys()
            .chain(world.resources.keys())
            .chain(world.items.keys())
            .chain(world.planted.keys());
        world.next_entity_id = max_numeric_suffix(&mut all_ids) + 1;
        world
    }

    pub fn create_snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            seed: self.seed,
            players: self.players.values().cloned().collect(),
            resources: self.resources.values().cloned().collect(),
            items: self.items.values().cloned().collect(),
            planted: self.planted.values().cloned().collect(),
            cleared_positions: self.cleared_positions.iter().copied().collect(),
            rain_zones: self.rain_zones.clone(),
        }
    }

    /// Collects everything that changed strictly after `since_ms`.
    pub fn compute_delta(&self, since_ms: u64, now: u64) -> StateDelta {
        let mut delta = StateDelta {
            timestamp: now,
            ..StateDelta::default()
        };

        for player in self.players.values() {
            if player.updated_at > since_ms {
                delta.players.push(player.clone());
            }
        }
        for resource in self.resources.values() {
            if resource.updated_at > since_ms {
                delta.resources.push(resource.clone());
            }
        }
        for item in self.items.values() {
            if item.updated_at > since_ms {
                delta.items.push(item.clone());
            }
        }
        for planted in self.planted.values() {
            if planted.updated_at > since_ms {
                delta.planted.push(planted.clone());
            }
        }

        for removal in &self.removals {
            if removal.at > since_ms {
                let target = match removal.collection {
                    Collection::Players => &mut delta.removed_players,
                    Collection::Resources => &mut delta.removed_resources,
                    Collection::Items => &mut delta.removed_items,
                    Collection::Planted => &mut delta.removed_planted,
                };
                target.push(removal.id.clone());
            }
        }

        if self.sets_updated_at > since_ms {
            delta.cleared_positions = Some(self.cleared_positions.iter().copied().collect());
            delta.rain_zones = Some(self.rain_zones.clone());
        }

        delta
    }

    /// Applies a delta. Idempotent: upserts overwrite with identical data
    /// and removals of absent ids are no-ops.
    pub fn apply_delta(&mut self, delta: &StateDelta) {
        for player in &delta.players {
            self.players.insert(player.id.clone(), player.clone());
        }
        for resource in &delta.resources {
            self.resources.insert(resource.id.clone(), resource.clone());
        }
        for item in &delta.items {
            self.items.insert(item.id.clone(), item.clone());
        }
        for planted in &delta.planted {
            self.planted.insert(planted.id.clone(), planted.clone());
        }

        // A delta window can span both the removal and the re-creation of
        // the same id (resource destroyed, then respawned). The upsert above
        // carries the live entity, so the stale removal must not win.
        for id in &delta.removed_players {
            if !delta.players.iter().any(|p| &p.id == id) {
                self.players.remove(id);
            }
        }
        for id in &delta.removed_resources {
            if !delta.resources.iter().any(|r| &r.id == id) {
                self.resources.remove(id);
            }
        }
        for id in &delta.removed_items {
            if !delta.items.iter().any(|i| &i.id == id) {
                self.items.remove(id);
            }
        }
        for id in &delta.removed_planted {
            if !delta.planted.iter().any(|p| &p.id == id) {
                self.planted.remove(id);
            }
        }

        if let Some(cleared) = &delta.cleared_positions {
            self.cleared_positions = cleared.iter().copied().collect();
        }
        if let Some(zones) = &delta.rain_zones {
            self.rain_zones = zones.clone();
        }
    }

    fn record_removal(&mut self, collection: Collection, id: String, now: u64) {
        self.removals.push_back(Removal {
            at: now,
            collection,
            id,
        });
        while self.removals.len() > REMOVAL_LOG_CAP {
            self.removals.pop_front();
        }
    }

    // ---- player mutators --------------------------------------------------

    pub fn upsert_player(&mut self, player: PlayerEntity) {
        self.players.insert(player.id.clone(), player);
    }

    pub fn move_player(&mut self, id: &str, x: f32, y: f32, direction: Direction, now: u64) {
        match self.players.get_mut(id) {
            Some(player) => {
                player.x = quantize(x);
                player.y = quantize(y);
                player.direction = direction;
                player.updated_at = now;
            }
            None => warn!("move_player: unknown player {}", id),
        }
    }

    /// Subtracts damage, clamping to [0, max]. Returns the new health, or
    /// `None` when the player does not exist.
    pub fn damage_player(&mut self, id: &str, damage: i32, now: u64) -> Option<i32> {
        match self.players.get_mut(id) {
            Some(player) => {
                player.health = (player.health - damage).clamp(0, crate::PLAYER_MAX_HEALTH);
                player.updated_at = now;
                Some(player.health)
            }
            None => {
                warn!("damage_player: unknown player {}", id);
                None
            }
        }
    }

    /// Resets a dead player at a new location with full health.
    pub fn respawn_player(&mut self, id: &str, x: f32, y: f32, now: u64) {
        match self.players.get_mut(id) {
            Some(player) => {
                player.x = quantize(x);
                player.y = quantize(y);
                player.health = crate::PLAYER_MAX_HEALTH;
                player.updated_at = now;
            }
            None => warn!("respawn_player: unknown player {}", id),
        }
    }

    pub fn grant_item(&mut self, id: &str, kind: ItemKind, count: u32, now: u64) {
        match self.players.get_mut(id) {
            Some(player) => {
                *player.inventory.entry(kind).or_insert(0) += count;
                player.updated_at = now;
            }
            None => warn!("grant_item: unknown player {}", id),
        }
    }

    /// Removes one unit of `kind` from the player's inventory. Returns false
    /// without mutating when the player is missing or holds none.
    pub fn consume_item(&mut self, id: &str, kind: ItemKind, now: u64) -> bool {
        match self.players.get_mut(id) {
            Some(player) => match player.inventory.get_mut(&kind) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    if *count == 0 {
                        player.inventory.remove(&kind);
                    }
                    player.updated_at = now;
                    true
                }
                _ => false,
            },
            None => {
                warn!("consume_item: unknown player {}", id);
                false
            }
        }
    }

    pub fn remove_player(&mut self, id: &str, now: u64) -> Option<PlayerEntity> {
        let removed = self.players.remove(id);
        if removed.is_some() {
            self.record_removal(Collection::Players, id.to_string(), now);
        }
        removed
    }

    // ---- resource mutators ------------------------------------------------

    pub fn add_resource(&mut self, resource: ResourceEntity) {
        self.resources.insert(resource.id.clone(), resource);
    }

    pub fn damage_resource(&mut self, id: &str, damage: i32, now: u64) -> Option<i32> {
        match self.resources.get_mut(id) {
            Some(resource) => {
                resource.health = (resource.health - damage).clamp(0, resource.kind.max_health());
                resource.updated_at = now;
                Some(resource.health)
            }
            None => {
                warn!("damage_resource: unknown resource {}", id);
                None
            }
        }
    }

    /// Removes a destroyed resource and marks its tile cleared so terrain
    /// generation does not regenerate over the pending respawn.
    pub fn remove_resource(&mut self, id: &str, now: u64) -> Option<ResourceEntity> {
        let removed = self.resources.remove(id);
        if let Some(resource) = &removed {
            self.cleared_positions.insert(resource.tile());
            self.sets_updated_at = now;
            self.record_removal(Collection::Resources, id.to_string(), now);
        } else {
            warn!("remove_resource: unknown resource {}", id);
        }
        removed
    }

    /// Consumes the cleared marker when a respawn re-occupies the tile.
    pub fn unclear_position(&mut self, tile: TilePos, now: u64) {
        if self.cleared_positions.remove(&tile) {
            self.sets_updated_at = now;
        }
    }

    // ---- item / planted mutators ------------------------------------------

    pub fn add_item(&mut self, item: ItemEntity) {
        self.items.insert(item.id.clone(), item);
    }

    /// The compare-and-remove primitive behind pickup exclusivity: exactly
    /// one caller gets `Some` for a given item id.
    pub fn remove_item(&mut self, id: &str, now: u64) -> Option<ItemEntity> {
        let removed = self.items.remove(id);
        if removed.is_some() {
            self.record_removal(Collection::Items, id.to_string(), now);
        }
        removed
    }

    pub fn add_planted(&mut self, planted: PlantedEntity) {
        self.planted.insert(planted.id.clone(), planted);
    }

    pub fn remove_planted(&mut self, id: &str, now: u64) -> Option<PlantedEntity> {
        let removed = self.planted.remove(id);
        if removed.is_some() {
            self.record_removal(Collection::Planted, id.to_string(), now);
        } else {
            warn!("remove_planted: unknown planted entity {}", id);
        }
        removed
    }

    /// True when a mature resource or an in-progress planting already sits
    /// on the tile.
    pub fn tile_occupied(&self, tile: TilePos) -> bool {
        self.resources.values().any(|r| r.tile() == tile)
            || self.planted.values().any(|p| p.tile() == tile)
    }

    pub fn set_rain_zones(&mut self, zones: Vec<RainZone>, now: u64) {
        self.rain_zones = zones;
        self.sets_updated_at = now;
    }
}
