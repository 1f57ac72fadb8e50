//! Server configuration loaded from a properties-style file.
//!
//! Every option has a documented default; a malformed value falls back to
//! the default with a logged warning. A single bad key never fails startup,
//! only an unreadable file does.

use log::warn;
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_PORT: u16 = 25565;
pub const DEFAULT_MAX_CLIENTS: usize = 20;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 100;
pub const DEFAULT_PLANTING_MAX_RANGE: f32 = 512.0;
pub const PLANTING_RANGE_MIN: f32 = 64.0;
pub const PLANTING_RANGE_MAX: f32 = 1024.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub max_clients: usize,
    /// 0 means pick a random seed at startup.
    pub world_seed: u64,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub rate_limit_per_sec: u32,
    /// Maximum planting distance in pixels, clamped to 64..=1024. Sent to
    /// every connecting client so client-side prediction uses the same
    /// bound as server-side validation.
    pub planting_max_range: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            world_seed: 0,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            client_timeout_secs: DEFAULT_CLIENT_TIMEOUT_SECS,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
            planting_max_range: DEFAULT_PLANTING_MAX_RANGE,
        }
    }
}

impl ServerConfig {
    /// Reads a config file. An unreadable file is a fatal startup error;
    /// everything inside the file is recoverable.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_properties(&text))
    }

    /// Parses `key=value` lines; `#` starts a comment.
    pub fn from_properties(text: &str) -> Self {
        let mut config = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => config.apply(key.trim(), value.trim()),
                None => warn!("config: ignoring malformed line '{}'", line),
            }
        }
        config
    }

    pub fn client_timeout_ms(&self) -> u64 {
        self.client_timeout_secs * 1_000
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "server.port" => match value.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(
                    "config: invalid server.port '{}', keeping {}",
                    value, self.port
                ),
            },
            "server.max-clients" => match value.parse() {
                Ok(n) if n > 0 => self.max_clients = n,
                _ => warn!(
                    "config: invalid server.max-clients '{}', keeping {}",
                    value, self.max_clients
                ),
            },
            "world.seed" => match value.parse() {
                Ok(seed) => self.world_seed = seed,
                Err(_) => warn!("config: invalid world.seed '{}', keeping 0 (random)", value),
            },
            "server.heartbeat-interval" => match value.parse() {
                Ok(secs) if secs > 0 => self.heartbeat_interval_secs = secs,
                _ => warn!(
                    "config: invalid server.heartbeat-interval '{}', keeping {}s",
                    value, self.heartbeat_interval_secs
                ),
            },
            "server.client-timeout" => match value.parse() {
                Ok(secs) if secs > 0 => self.client_timeout_secs = secs,
                _ => warn!(
                    "config: invalid server.client-timeout '{}', keeping {}s",
                    value, self.client_timeout_secs
                ),
            },
            "server.rate-limit" => match value.parse() {
                Ok(n) if n > 0 => self.rate_limit_per_sec = n,
                _ => warn!(
                    "config: invalid server.rate-limit '{}', keeping {}/s",
                    value, self.rate_limit_per_sec
                ),
            },
            "planting.max.range" => match value.parse::<f32>() {
                Ok(range) if (PLANTING_RANGE_MIN..=PLANTING_RANGE_MAX).contains(&range) => {
                    self.planting_max_range = range
                }
                _ => warn!(
                    "config: planting.max.range '{}' outside {}..={}, using default {}",
                    value, PLANTING_RANGE_MIN, PLANTING_RANGE_MAX, DEFAULT_PLANTING_MAX_RANGE
                ),
            },
            _ => warn!("config: unrecognized key '{}'", key),
        }
    }
}
