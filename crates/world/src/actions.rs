//! Interpretation of scheduled actions. These run inside the tick loop and
//! never propagate errors outward; a failure is logged and the world keeps
//! ticking.

use proto::{Packet, Weather};
use rand::Rng;
use world_db::DbError;

use crate::registry::Instance;
use crate::scheduler::ScheduledAction;
use crate::World;

impl World {
    pub(crate) fn run_action(&mut self, action: ScheduledAction) {
        match action {
            ScheduledAction::RespawnInstance { instance_id } => self.respawn_instance(instance_id),
            ScheduledAction::DespawnGroundItem { instance_id } => {
                self.despawn_ground_item(instance_id)
            }
            ScheduledAction::GatherAttempt {
                session_id,
                instance_id,
            } => {
                if let Err(e) = self.gather_attempt(session_id, instance_id) {
                    tracing::error!(?session_id, instance_id, error = %e, "gather attempt failed");
                }
            }
            ScheduledAction::SaveAll => self.save_all(),
            ScheduledAction::WeatherCheck => self.weather_check(),
        }
    }

    /// Clear the OOB sentinel by restoring the spawn coordinates the
    /// database row kept while the instance was gone.
    fn respawn_instance(&mut self, instance_id: i64) {
        let row = match self.db.instances().get(instance_id) {
            Ok(row) => row,
            Err(DbError::RowNotFound(..)) => {
                // The instance was permanently deleted meanwhile.
                tracing::debug!(instance_id, "respawn target vanished");
                self.registry.remove(instance_id);
                return;
            }
            Err(e) => {
                tracing::error!(instance_id, error = %e, "respawn lookup failed");
                return;
            }
        };
        let room = row.room_id;
        let restored = Instance::from(row);
        tracing::debug!(instance_id, room, "instance respawned");
        self.registry.insert(restored);
        self.mark_dirty(room);
    }

    /// A dropped stack nobody picked up expires permanently.
    fn despawn_ground_item(&mut self, instance_id: i64) {
        let room = match self.registry.get(instance_id) {
            Some(inst) if inst.pos.is_some() => inst.room_id,
            _ => return,
        };
        if let Err(e) = self.db.instances().delete(instance_id) {
            tracing::error!(instance_id, error = %e, "failed to delete expired ground item");
            return;
        }
        self.registry.remove(instance_id);
        self.mark_dirty(room);
        tracing::debug!(instance_id, room, "ground item expired");
    }

    fn save_all(&mut self) {
        let mut saved = 0u32;
        for sid in self.sessions.play_ids() {
            let instance_id = match self.sessions.get(sid).and_then(|s| s.instance_id) {
                Some(id) => id,
                None => continue,
            };
            let (pos, room) = match self.registry.get(instance_id) {
                Some(inst) => (inst.pos, inst.room_id),
                None => continue,
            };
            let result = self
                .db
                .instances()
                .update_room(instance_id, room)
                .and_then(|_| {
                    self.db
                        .instances()
                        .update_position(instance_id, pos.map(|p| (p.y, p.x)))
                });
            match result {
                Ok(()) => saved += 1,
                Err(e) => tracing::error!(?sid, instance_id, error = %e, "player save failed"),
            }
        }
        if saved > 0 {
            tracing::info!(saved, "saved player instances");
            self.broadcast_play(Packet::ServerLog {
                text: "Game has been saved.".to_string(),
            });
        }
    }

    fn weather_check(&mut self) {
        let roll: f64 = self.rng.gen();
        let next = match self.weather {
            Weather::Clear => {
                if roll < 0.35 {
                    Weather::Rain
                } else {
                    Weather::Clear
                }
            }
            Weather::Rain => {
                if roll < 0.30 {
                    Weather::Clear
                } else if roll < 0.50 {
                    Weather::Storm
                } else {
                    Weather::Rain
                }
            }
            Weather::Storm => {
                if roll < 0.50 {
                    Weather::Rain
                } else {
                    Weather::Storm
                }
            }
        };
        if next != self.weather {
            self.change_weather(next);
        }
    }

    pub(crate) fn change_weather(&mut self, next: Weather) {
        tracing::info!(from = ?self.weather, to = ?next, "weather changed");
        self.weather = next;
        self.broadcast_play(Packet::WeatherChange { state: next });
        let flavor = match next {
            Weather::Clear => "The rain has cleared.",
            Weather::Rain => "It has begun to rain...",
            Weather::Storm => "The rain whips up into a storm!",
        };
        self.broadcast_play(Packet::ServerLog {
            text: flavor.to_string(),
        });
    }

    pub(crate) fn save_players(&mut self) {
        self.save_all();
    }
}
