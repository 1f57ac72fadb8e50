//! Session registry: binds transport connections to player identities and
//! tracks the per-session bookkeeping the validation engine relies on.
//!
//! The registry handles:
//! - Session lifecycle (register, deregister, capacity enforcement)
//! - Heartbeat liveness and timeout sweeps
//! - Per-(attacker, target) attack cooldown stamps
//! - Rolling one-second inbound rate limiting
//!
//! All mutation happens on the server's single decision path, so the
//! registry itself needs no internal locking.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;

/// One connected participant.
#[derive(Debug)]
pub struct Session {
    /// Session identifier, equal to the transport connection id.
    pub id: u32,
    /// Id of the PlayerEntity this session controls (owned by WorldState).
    pub player_id: String,
    pub addr: SocketAddr,
    /// Millisecond stamp of the last heartbeat or any inbound message.
    last_heartbeat: u64,
    /// Millisecond stamp of the last accepted movement, for speed checks.
    pub last_movement_ms: u64,
    /// Last attack stamp per target id. Keying per target lets one attacker
    /// hit two different targets back to back without waiting.
    cooldowns: HashMap<String, u64>,
    /// Rolling one-second rate-limit window.
    rate_window_start: u64,
    rate_count: u32,
}

impl Session {
    pub fn new(id: u32, player_id: String, addr: SocketAddr, now: u64) -> Self {
        Self {
            id,
            player_id,
            addr,
            last_heartbeat: now,
            last_movement_ms: now,
            cooldowns: HashMap::new(),
            rate_window_start: now,
            rate_count: 0,
        }
    }

    pub fn touch_heartbeat(&mut self, now: u64) {
        self.last_heartbeat = now;
    }

    pub fn is_expired(&self, now: u64, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_heartbeat) > timeout_ms
    }

    /// Milliseconds since this session last attacked `target_id`, if ever.
    pub fn cooldown_elapsed(&self, target_id: &str, now: u64) -> Option<u64> {
        self.cooldowns
            .get(target_id)
            .map(|last| now.saturating_sub(*last))
    }

    pub fn set_cooldown(&mut self, target_id: &str, now: u64) {
        self.cooldowns.insert(target_id.to_string(), now);
    }

    /// Counts one inbound message against the rolling window. Returns false
    /// when the message should be dropped.
    pub fn allow_message(&mut self, now: u64, limit_per_sec: u32) -> bool {
        if now.saturating_sub(self.rate_window_start) >= 1_000 {
            self.rate_window_start = now;
            self.rate_count = 0;
        }
        if self.rate_count >= limit_per_sec {
            return false;
        }
        self.rate_count += 1;
        true
    }
}

/// All live sessions, indexed by session id.
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    max_clients: usize,
}

impl SessionRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_clients,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.sessions.len() < self.max_clients
    }

    /// Registers a session. Returns false when the server is full; the
    /// caller rejects the connection explicitly.
    pub fn register(&mut self, session: Session) -> bool {
        if !self.has_capacity() {
            return false;
        }
        info!(
            "session {} registered for player {} from {}",
            session.id, session.player_id, session.addr
        );
        self.sessions.insert(session.id, session);
        true
    }

    pub fn deregister(&mut self, session_id: u32) -> Option<Session> {
        let removed = self.sessions.remove(&session_id);
        if let Some(session) = &removed {
            info!(
                "session {} deregistered (player {})",
                session.id, session.player_id
            );
        }
        removed
    }

    pub fn get(&self, session_id: u32) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn get_mut(&mut self, session_id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&session_id)
    }

    /// Ids of every session whose heartbeat lapsed. The caller deregisters
    /// them and broadcasts the corresponding leave notifications.
    pub fn expired_sessions(&self, now: u64, timeout_ms: u64) -> Vec<u32> {
        self.sessions
            .values()
            .filter(|s| s.is_expired(now, timeout_ms))
            .map(|s| s.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
