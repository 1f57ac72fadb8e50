//! Authoritative world synchronization server.
//!
//! The server owns the canonical `WorldState` and is the only place it
//! mutates. Clients submit actions; the validation engine accepts or
//! rejects each one against the current state, and accepted changes fan out
//! through the broadcast router as granular events plus periodic deltas.
//! Everything flows through one decision loop in `network`, which is what
//! makes conflicting concurrent actions resolve deterministically.

pub mod broadcast;
pub mod config;
pub mod network;
pub mod persistence;
pub mod scheduler;
pub mod session;
pub mod utils;
pub mod validation;
pub mod worldgen;
