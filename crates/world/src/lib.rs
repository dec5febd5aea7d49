//! The authoritative core: instance registry, deferred scheduler,
//! per-session visibility and the whole packet-dispatch state machine.
//!
//! Everything in here runs on the tick thread. Network tasks only feed
//! bytes in and carry bytes out; no other code mutates shared state.

mod actions;
mod entry;
mod gather;
mod join;
mod play;
pub mod registry;
pub mod scheduler;
pub mod stacking;
mod visibility;
mod world;

use thiserror::Error;

pub use registry::{Instance, Registry};
pub use scheduler::{ScheduledAction, Scheduler};
pub use world::World;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Db(#[from] world_db::DbError),

    #[error(transparent)]
    Crypto(#[from] proto::CryptoError),
}

/// Tunables for the tick loop and game rules.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Ticks per second.
    pub tick_rate: u32,
    pub motd: String,
    /// Room and position new players spawn into.
    pub spawn_room_id: i64,
    pub spawn_pos: (i32, i32),
    /// Directory holding room map JSON files.
    pub map_dir: String,
    pub weather_interval_secs: u64,
    pub save_interval_secs: u64,
    /// Lifetime of a dropped ground stack before it is cleaned up.
    pub despawn_secs: u64,
    pub gather_interval_secs: u64,
    /// Success probability of a single gathering attempt.
    pub gather_chance: f64,
    /// Bound on a session's inbound frame queue.
    pub inbound_queue_cap: usize,
    /// RSA modulus size. Tests use smaller keys than the 2048-bit default.
    pub rsa_bits: usize,
    /// Fixed RNG seed for deterministic tests; None seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate: 10,
            motd: "Welcome, traveler".to_string(),
            spawn_room_id: 1,
            spawn_pos: (5, 5),
            map_dir: "maps".to_string(),
            weather_interval_secs: 30,
            save_interval_secs: 60,
            despawn_secs: 60,
            gather_interval_secs: 3,
            gather_chance: 0.3,
            inbound_queue_cap: 32,
            rsa_bits: 2048,
            rng_seed: None,
        }
    }
}

impl WorldConfig {
    /// Convert a wall-clock interval into ticks, never less than one.
    pub fn ticks(&self, secs: u64) -> u64 {
        (secs * self.tick_rate as u64).max(1)
    }
}

/// Inventories are bounded to this many distinct stacks.
pub const INVENTORY_SLOTS: usize = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_conversion() {
        let cfg = WorldConfig {
            tick_rate: 10,
            ..Default::default()
        };
        assert_eq!(cfg.ticks(3), 30);
        assert_eq!(cfg.ticks(0), 1);
    }
}
