//! The room-join sequence, shared by login and portal transitions.

use proto::{Model, Packet};
use session::{SessionId, SessionState};
use space::{Coord, Layer};

use crate::{World, WorldError};

impl World {
    /// Move a bound session into a room at a concrete position and send the
    /// full join bundle: MoveRooms, Ok, TickRate, then Room / PlayerInfo /
    /// own-instance / Weather snapshots (inventory only on first entry).
    pub(crate) fn join_room(
        &mut self,
        sid: SessionId,
        dest_room: i64,
        pos: (i32, i32),
    ) -> Result<(), WorldError> {
        let (instance_id, username, was_play, old_room) = match self.sessions.get(sid) {
            Some(s) => (
                s.instance_id,
                s.username.clone().unwrap_or_default(),
                s.state == SessionState::Play,
                s.room_id,
            ),
            None => return Ok(()),
        };
        let instance_id = match instance_id {
            Some(id) => id,
            None => return Ok(()),
        };

        if was_play {
            if let Some(old) = old_room {
                self.broadcast_room(old, Packet::Goodbye { instance_id }, &[sid]);
                self.mark_dirty(old);
            }
        }
        if let Some(rt) = self.runtime.get_mut(&sid) {
            rt.visible.clear();
        }

        self.db.instances().update_room(instance_id, dest_room)?;
        self.db.instances().update_position(instance_id, Some(pos))?;
        if let Some(inst) = self.registry.get_mut(instance_id) {
            inst.room_id = dest_room;
            inst.pos = Some(Coord::new(pos.0, pos.1));
        }
        self.ensure_layout(dest_room)?;

        let (player_id, entity_id, inventory_id, view_radius) = match self.sessions.get_mut(sid) {
            Some(s) => {
                s.room_id = Some(dest_room);
                s.state = SessionState::Play;
                (
                    s.player_id.unwrap_or_default(),
                    s.entity_id.unwrap_or_default(),
                    s.inventory_id,
                    s.view_radius,
                )
            }
            None => return Ok(()),
        };

        self.send(
            sid,
            Packet::MoveRooms {
                room_id: Some(dest_room),
            },
        );
        self.send(sid, Packet::Ok);
        self.send(
            sid,
            Packet::TickRate {
                hz: self.cfg.tick_rate,
            },
        );

        let room_row = self.db.rooms().get(dest_room)?;
        let room_model = {
            let layout = self
                .layout(dest_room)
                .expect("layout ensured before snapshot");
            Model::Room {
                id: room_row.id,
                name: room_row.name.clone(),
                height: layout.height(),
                width: layout.width(),
                ground: layout.layer_cells(Layer::Ground),
                solid: layout.layer_cells(Layer::Solid),
                roof: layout.layer_cells(Layer::Roof),
            }
        };
        self.send(sid, Packet::ModelUpdate { model: room_model });
        self.send(
            sid,
            Packet::ModelUpdate {
                model: Model::PlayerInfo {
                    player_id,
                    entity_id,
                    username: username.clone(),
                    view_radius,
                },
            },
        );
        if let Some(inst) = self.registry.get(instance_id) {
            let model = crate::visibility::instance_model(inst);
            self.send(sid, Packet::ModelUpdate { model });
        }
        self.send(
            sid,
            Packet::WeatherChange {
                state: self.weather,
            },
        );

        let first_entry = self
            .runtime
            .get(&sid)
            .map(|rt| !rt.sent_inventory)
            .unwrap_or(false);
        if first_entry {
            if let Some(inv) = inventory_id {
                for row in self.db.inventories().list(inv)? {
                    self.send(
                        sid,
                        Packet::ModelUpdate {
                            model: Model::ContainerItem {
                                id: row.id,
                                item_entity_id: row.item_entity_id,
                                name: row.name,
                                amount: row.amount,
                                max_stack_amt: row.max_stack_amt,
                            },
                        },
                    );
                }
            }
            if let Some(rt) = self.runtime.get_mut(&sid) {
                rt.sent_inventory = true;
            }
        }

        self.broadcast_room(
            dest_room,
            Packet::ServerLog {
                text: format!("{username} has arrived."),
            },
            &[],
        );
        self.mark_dirty(dest_room);
        tracing::info!(?sid, room = dest_room, ?pos, "joined room");
        Ok(())
    }
}
