//! Save/load of the synchronized world, keyed by save name.
//!
//! A save bundles the world snapshot with the scheduler's pending respawn
//! entries. Timestamps inside are absolute wall-clock milliseconds, so any
//! respawn or growth that matured while the process was stopped fires on
//! the first tick after a load.

use log::info;
use serde::{Deserialize, Serialize};
use shared::{RespawnEntry, WorldSnapshot, WorldState};
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use crate::scheduler::RespawnScheduler;

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveFile {
    pub saved_at: u64,
    pub snapshot: WorldSnapshot,
    pub pending_respawns: Vec<RespawnEntry>,
}

pub fn save_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{}.save", name))
}

pub fn save(
    name: &str,
    world: &WorldState,
    scheduler: &RespawnScheduler,
    now: u64,
) -> Result<PathBuf, Box<dyn Error>> {
    let file = SaveFile {
        saved_at: now,
        snapshot: world.create_snapshot(),
        pending_respawns: scheduler.pending().to_vec(),
    };

    let path = save_path(name);
    fs::write(&path, bincode::serialize(&file)?)?;
    info!(
        "saved world '{}' ({} players, {} resources, {} pending respawns)",
        name,
        file.snapshot.players.len(),
        file.snapshot.resources.len(),
        file.pending_respawns.len()
    );
    Ok(path)
}

pub fn load(name: &str) -> Result<(WorldState, RespawnScheduler), Box<dyn Error>> {
    let bytes = fs::read(save_path(name))?;
    let file: SaveFile = bincode::deserialize(&bytes)?;

    let world = WorldState::apply_snapshot(file.snapshot);
    let mut scheduler = RespawnScheduler::new();
    scheduler.restore(file.pending_respawns);

    info!("loaded world '{}' (saved at {})", name, file.saved_at);
    Ok((world, scheduler))
}

pub fn save_exists(name: &str) -> bool {
    save_path(name).exists()
}
