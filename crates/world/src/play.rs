//! PLAY-state handlers: movement, chat, item pickup/drop, logout.

use proto::packet::CHAT_LIMIT;
use proto::{Direction, Model, Packet};
use session::SessionId;
use space::Coord;
use world_db::ItemRow;

use crate::registry::Instance;
use crate::scheduler::ScheduledAction;
use crate::stacking::{self, RebalanceStep};
use crate::{World, WorldError};

impl World {
    pub(crate) fn handle_move(
        &mut self,
        sid: SessionId,
        direction: Direction,
    ) -> Result<(), WorldError> {
        let (instance_id, room) = match self.sessions.get(sid) {
            Some(s) => match (s.instance_id, s.room_id) {
                (Some(i), Some(r)) => (i, r),
                _ => return Ok(()),
            },
            None => return Ok(()),
        };
        let pos = match self.registry.get(instance_id).and_then(|i| i.pos) {
            Some(pos) => pos,
            None => return Ok(()),
        };
        let (dy, dx) = direction.delta();
        let dest = pos.step(dy, dx);

        // A portal at the destination teleports instead of moving.
        let portal_entity = self
            .registry
            .at(room, dest)
            .find(|i| i.typename == "Portal")
            .map(|i| i.entity_id);
        if let Some(entity_id) = portal_entity {
            if let Some(portal) = self.db.rooms().portal_by_entity(entity_id)? {
                self.cancel_gather(sid);
                let target = Coord::new(portal.linked_y, portal.linked_x);
                if portal.linked_room_id == room {
                    self.set_player_position(sid, instance_id, room, target)?;
                } else {
                    self.join_room(sid, portal.linked_room_id, (target.y, target.x))?;
                }
                return Ok(());
            }
        }

        // A gatherable node at the destination starts working it.
        let node = self
            .registry
            .at(room, dest)
            .find(|i| crate::gather::required_tool(&i.typename).is_some())
            .cloned();
        if let Some(node) = node {
            return self.start_gather(sid, node);
        }

        let passable = self
            .layout(room)
            .map(|l| l.in_bounds(dest.y, dest.x) && !l.is_solid(dest.y, dest.x))
            .unwrap_or(false);
        if passable {
            self.cancel_gather(sid);
            self.set_player_position(sid, instance_id, room, dest)?;
        } else {
            self.deny(sid, "Can't move there");
        }
        Ok(())
    }

    /// Commit a position, persist it and sync the mover's own avatar.
    pub(crate) fn set_player_position(
        &mut self,
        sid: SessionId,
        instance_id: i64,
        room: i64,
        dest: Coord,
    ) -> Result<(), WorldError> {
        self.db
            .instances()
            .update_position(instance_id, Some((dest.y, dest.x)))?;
        if let Some(inst) = self.registry.get_mut(instance_id) {
            inst.pos = Some(dest);
        }
        self.send(
            sid,
            Packet::ModelUpdate {
                model: Model::InstanceDelta {
                    id: instance_id,
                    y: Some(dest.y),
                    x: Some(dest.x),
                    amount: None,
                },
            },
        );
        self.mark_dirty(room);
        Ok(())
    }

    pub(crate) fn handle_chat(&mut self, sid: SessionId, message: &str) -> Result<(), WorldError> {
        if message.trim().is_empty() {
            self.deny(sid, "Chat message cannot be blank");
            return Ok(());
        }
        let (room, username) = match self.sessions.get(sid) {
            Some(s) => match (s.room_id, s.username.clone()) {
                (Some(r), Some(u)) => (r, u),
                _ => return Ok(()),
            },
            None => return Ok(()),
        };
        let truncated: String = message.chars().take(CHAT_LIMIT).collect();
        let text = format!("{username} says: {truncated}");
        tracing::info!(target: "chat", room, "{text}");
        // Chat deliberately includes the sender.
        self.broadcast_room(room, Packet::ServerLog { text }, &[]);
        Ok(())
    }

    pub(crate) fn handle_grab(&mut self, sid: SessionId) -> Result<(), WorldError> {
        let (room, pos) = match self.play_position(sid) {
            Some(v) => v,
            None => return Ok(()),
        };

        // First item-like instance exactly at the player's feet.
        let candidates: Vec<(i64, i64, u32)> = self
            .registry
            .at(room, pos)
            .map(|i| (i.id, i.entity_id, i.amount))
            .collect();
        let mut target: Option<(i64, u32, ItemRow)> = None;
        for (instance_id, entity_id, amount) in candidates {
            if let Some(item) = self.db.inventories().item_by_entity(entity_id)? {
                target = Some((instance_id, amount, item));
                break;
            }
        }
        let (instance_id, amount, item) = match target {
            Some(t) => t,
            None => {
                self.send_log(sid, "There is nothing here to pick up.");
                return Ok(());
            }
        };

        let inserted = self.grant_item(sid, &item, amount)?;
        if inserted == 0 {
            self.send_log(sid, "Your inventory is full.");
            return Ok(());
        }

        let leftover = amount - inserted;
        if leftover > 0 {
            // Partial pickup leaves the remainder on the ground.
            self.db.instances().update_amount(instance_id, leftover)?;
            if let Some(inst) = self.registry.get_mut(instance_id) {
                inst.amount = leftover;
            }
        } else {
            self.despawn_instance(instance_id)?;
        }
        self.mark_dirty(room);
        self.send_log(sid, format!("You pick up {} {}.", inserted, item.name));
        Ok(())
    }

    pub(crate) fn handle_drop(
        &mut self,
        sid: SessionId,
        container_item_id: i64,
        amount: u32,
    ) -> Result<(), WorldError> {
        let (room, pos) = match self.play_position(sid) {
            Some(v) => v,
            None => return Ok(()),
        };
        let inventory_id = match self.sessions.get(sid).and_then(|s| s.inventory_id) {
            Some(inv) => inv,
            None => return Ok(()),
        };

        let rows = self.db.inventories().list(inventory_id)?;
        let row = match rows.iter().find(|r| r.id == container_item_id) {
            Some(row) => row.clone(),
            None => {
                self.deny(sid, "You don't have that");
                return Ok(());
            }
        };
        if amount == 0 || amount > row.amount {
            self.deny(sid, "You don't have that many");
            return Ok(());
        }
        let item = self.db.inventories().item(row.item_id)?;

        // Merge into a compatible under-capacity ground stack if one is
        // already at the player's feet; overflow stays in the inventory.
        let ground = self
            .registry
            .at(room, pos)
            .find(|i| i.entity_id == item.entity_id && i.amount < item.max_stack_amt)
            .map(|i| (i.id, i.amount));

        let dropped = match ground {
            Some((ground_id, ground_amount)) => {
                let moved = amount.min(item.max_stack_amt - ground_amount);
                let merged = ground_amount + moved;
                self.db.instances().update_amount(ground_id, merged)?;
                if let Some(inst) = self.registry.get_mut(ground_id) {
                    inst.amount = merged;
                }
                moved
            }
            None => {
                let new_id = self.db.instances().create(
                    item.entity_id,
                    room,
                    pos.y,
                    pos.x,
                    amount,
                    0,
                )?;
                self.registry.insert(Instance {
                    id: new_id,
                    entity_id: item.entity_id,
                    typename: item.typename.clone(),
                    name: item.name.clone(),
                    room_id: room,
                    pos: Some(pos),
                    amount,
                    respawn_time: 0,
                });
                let fire = self.tick + self.cfg.ticks(self.cfg.despawn_secs);
                self.scheduler.schedule_once(
                    fire,
                    ScheduledAction::DespawnGroundItem {
                        instance_id: new_id,
                    },
                );
                amount
            }
        };

        let remaining = row.amount - dropped;
        if remaining == 0 {
            self.db.inventories().delete(row.id)?;
            self.send_container_update(sid, row.id, &item, 0);
        } else {
            self.db.inventories().update_amount(row.id, remaining)?;
            self.send_container_update(sid, row.id, &item, remaining);
        }
        self.rebalance_inventory(sid, inventory_id)?;
        self.mark_dirty(room);
        self.send_log(sid, format!("You drop {} {}.", dropped, item.name));
        Ok(())
    }

    pub(crate) fn handle_logout(&mut self, sid: SessionId) -> Result<(), WorldError> {
        self.depart(sid);
        self.send(sid, Packet::Ok);
        Ok(())
    }

    /// Shared teardown for logout, disconnect and fatal closes: cancel the
    /// gather deferred, announce the departure, clear world bindings.
    pub(crate) fn depart(&mut self, sid: SessionId) {
        self.cancel_gather(sid);
        let (room, instance_id, username) = match self.sessions.get(sid) {
            Some(s) => (
                s.room_id,
                s.instance_id,
                s.username.clone().unwrap_or_default(),
            ),
            None => return,
        };
        if let (Some(room), Some(instance_id)) = (room, instance_id) {
            self.broadcast_room(room, Packet::Goodbye { instance_id }, &[sid]);
            self.broadcast_room(
                room,
                Packet::ServerLog {
                    text: format!("{username} has departed."),
                },
                &[sid],
            );
            self.mark_dirty(room);
        }
        self.sessions.unbind_player(sid);
        if let Some(rt) = self.runtime.get_mut(&sid) {
            rt.visible.clear();
            rt.sent_inventory = false;
        }
        tracing::info!(?sid, username = %username, "departed");
    }

    // ---- inventory plumbing ----------------------------------------------

    /// Insert up to `amount` of an item, filling existing stacks first.
    /// Returns how much actually fit; every touched slot is mirrored to the
    /// session as a ContainerItem update.
    pub(crate) fn grant_item(
        &mut self,
        sid: SessionId,
        item: &ItemRow,
        amount: u32,
    ) -> Result<u32, WorldError> {
        let inventory_id = match self.sessions.get(sid).and_then(|s| s.inventory_id) {
            Some(inv) => inv,
            None => return Ok(0),
        };
        let rows = self.db.inventories().list(inventory_id)?;
        let plan = stacking::plan_insert(&rows, item.id, item.max_stack_amt, amount);

        for &(slot_id, new_amount) in &plan.fills {
            self.db.inventories().update_amount(slot_id, new_amount)?;
            self.send_container_update(sid, slot_id, item, new_amount);
        }
        for &stack_amount in &plan.new_stacks {
            let slot_id = self
                .db
                .inventories()
                .create_stack(inventory_id, item.id, stack_amount)?;
            self.send_container_update(sid, slot_id, item, stack_amount);
        }
        Ok(plan.inserted)
    }

    /// Re-coalesce an inventory and mirror every correction to the client.
    pub(crate) fn rebalance_inventory(
        &mut self,
        sid: SessionId,
        inventory_id: i64,
    ) -> Result<(), WorldError> {
        let rows = self.db.inventories().list(inventory_id)?;
        for step in stacking::plan_rebalance(&rows) {
            match step {
                RebalanceStep::SetAmount { slot_id, amount } => {
                    self.db.inventories().update_amount(slot_id, amount)?;
                    if let Some(row) = rows.iter().find(|r| r.id == slot_id) {
                        let item = self.db.inventories().item(row.item_id)?;
                        self.send_container_update(sid, slot_id, &item, amount);
                    }
                }
                RebalanceStep::Delete { slot_id } => {
                    self.db.inventories().delete(slot_id)?;
                    if let Some(row) = rows.iter().find(|r| r.id == slot_id) {
                        let item = self.db.inventories().item(row.item_id)?;
                        self.send_container_update(sid, slot_id, &item, 0);
                    }
                }
            }
        }
        Ok(())
    }

    /// An amount of zero tells the client the slot is gone.
    pub(crate) fn send_container_update(
        &mut self,
        sid: SessionId,
        slot_id: i64,
        item: &ItemRow,
        amount: u32,
    ) {
        self.send(
            sid,
            Packet::ModelUpdate {
                model: Model::ContainerItem {
                    id: slot_id,
                    item_entity_id: item.entity_id,
                    name: item.name.clone(),
                    amount,
                    max_stack_amt: item.max_stack_amt,
                },
            },
        );
    }

    /// Despawn an instance: schedule a respawn if it has one, otherwise
    /// delete it permanently. The database row keeps the spawn coordinates
    /// while the instance is out of bounds.
    pub(crate) fn despawn_instance(&mut self, instance_id: i64) -> Result<(), WorldError> {
        let (room, respawn_time) = match self.registry.get(instance_id) {
            Some(inst) => (inst.room_id, inst.respawn_time),
            None => return Ok(()),
        };
        if respawn_time > 0 {
            if let Some(inst) = self.registry.get_mut(instance_id) {
                inst.pos = None;
            }
            let fire = self.tick + self.cfg.ticks(respawn_time as u64);
            self.scheduler
                .schedule_once(fire, ScheduledAction::RespawnInstance { instance_id });
        } else {
            self.db.instances().delete(instance_id)?;
            self.registry.remove(instance_id);
        }
        self.mark_dirty(room);
        Ok(())
    }

    fn play_position(&self, sid: SessionId) -> Option<(i64, Coord)> {
        let s = self.sessions.get(sid)?;
        let room = s.room_id?;
        let instance_id = s.instance_id?;
        let pos = self.registry.get(instance_id)?.pos?;
        Some((room, pos))
    }
}
