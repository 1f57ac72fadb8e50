//! Time-driven world changes: resource respawns, plant growth, and the
//! weather cycle.
//!
//! The scheduler never mutates the world itself. Each tick it reports what
//! came due and the server's decision path applies the changes, so timer
//! firings are linearized with client actions exactly like any other event.

use log::{debug, info};
use shared::{RespawnEntry, WorldState, GROWTH_DURATION_MS};

/// How often the weather cycle rotates the active rain zones.
pub const WEATHER_CYCLE_MS: u64 = 60_000;

pub struct RespawnScheduler {
    pending: Vec<RespawnEntry>,
    last_weather_shift: u64,
}

impl RespawnScheduler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            last_weather_shift: 0,
        }
    }

    /// Queues a destroyed resource for regeneration.
    pub fn schedule(&mut self, entry: RespawnEntry) {
        debug!(
            "scheduled respawn of {} in {}ms",
            entry.resource_id, entry.respawn_duration_ms
        );
        self.pending.push(entry);
    }

    /// Pending entries, included in the snapshot sent to joining clients.
    pub fn pending(&self) -> &[RespawnEntry] {
        &self.pending
    }

    /// Removes and returns every entry that is due. Each entry is consumed
    /// exactly once; an entry never fires before its duration has elapsed.
    pub fn collect_due(&mut self, now: u64) -> Vec<RespawnEntry> {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|entry| entry.is_due(now));
        self.pending = pending;
        due
    }

    /// Replaces the pending set, used when restoring a save.
    pub fn restore(&mut self, entries: Vec<RespawnEntry>) {
        info!("restored {} pending respawn entries", entries.len());
        self.pending = entries;
    }

    /// Anchors the weather cycle at server start so the worldgen-seeded
    /// rain zones live out a full cycle before the first rotation.
    pub fn start_weather_cycle(&mut self, now: u64) {
        self.last_weather_shift = now;
    }

    /// True once per weather cycle.
    pub fn weather_due(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_weather_shift) >= WEATHER_CYCLE_MS {
            self.last_weather_shift = now;
            true
        } else {
            false
        }
    }
}

impl Default for RespawnScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids of planted entities whose growth duration has fully elapsed.
pub fn matured_planted(world: &WorldState, now: u64) -> Vec<String> {
    world
        .planted
        .values()
        .filter(|p| p.is_mature(now, GROWTH_DURATION_MS))
        .map(|p| p.id.clone())
        .collect()
}
