//! Deterministic seed-driven world generation.
//!
//! The same seed always yields the same resource layout and initial rain
//! zones, so clients that know the seed can derive terrain locally and the
//! server only synchronizes the entities on top of it.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    biome_at, Biome, RainZone, ResourceEntity, ResourceKind, TilePos, WorldState, TILE_SIZE,
    WORLD_HEIGHT, WORLD_WIDTH,
};

/// Number of resource placement attempts during generation.
const RESOURCE_PLACEMENTS: usize = 120;
const RAIN_ZONE_COUNT: usize = 3;

/// Players spawn at least this far from the world edge.
const SPAWN_MARGIN: f32 = 128.0;

/// Builds the initial world for a seed: scattered resources matching their
/// native biome plus the starting rain zones.
pub fn generate_world(seed: u64) -> WorldState {
    let mut world = WorldState::new(seed);
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..RESOURCE_PLACEMENTS {
        let x = rng.gen_range(0.0..WORLD_WIDTH - TILE_SIZE);
        let y = rng.gen_range(0.0..WORLD_HEIGHT - TILE_SIZE);
        let tile = TilePos::from_world(x, y);
        if world.tile_occupied(tile) {
            continue;
        }

        let kind = match biome_at(seed, tile) {
            Biome::Grass => match rng.gen_range(0..3) {
                0 => ResourceKind::SmallTree,
                1 => ResourceKind::AppleTree,
                _ => ResourceKind::BananaTree,
            },
            Biome::Sand => ResourceKind::Cactus,
            Biome::Rock => ResourceKind::Rock,
        };

        let (tx, ty) = tile.to_world();
        let id = world.alloc_id("res");
        world.add_resource(ResourceEntity::new(id, kind, tx, ty, 0));
    }

    world.set_rain_zones(generate_rain_zones(&mut rng), 0);
    info!(
        "generated world from seed {}: {} resources, {} rain zones",
        seed,
        world.resources.len(),
        world.rain_zones.len()
    );
    world
}

/// Fresh rain zones for the weather cycle.
pub fn generate_rain_zones(rng: &mut StdRng) -> Vec<RainZone> {
    (0..RAIN_ZONE_COUNT)
        .map(|_| RainZone {
            x: rng.gen_range(0.0..WORLD_WIDTH),
            y: rng.gen_range(0.0..WORLD_HEIGHT),
            radius: rng.gen_range(128.0..384.0),
        })
        .collect()
}

/// A spawn (or respawn) position away from the world edge.
pub fn spawn_position(rng: &mut StdRng) -> (f32, f32) {
    (
        rng.gen_range(SPAWN_MARGIN..WORLD_WIDTH - SPAWN_MARGIN),
        rng.gen_range(SPAWN_MARGIN..WORLD_HEIGHT - SPAWN_MARGIN),
    )
}
