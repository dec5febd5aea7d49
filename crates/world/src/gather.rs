//! The resource-gathering micro-state-machine.
//!
//! Idle -> Active(node, deferred) on walking into a node with the right
//! tool; each scheduled attempt rolls a fixed success chance; success rolls
//! the node's drop table, despawns it and returns to Idle.

use rand::Rng;
use session::{SessionId, SessionState};

use crate::registry::Instance;
use crate::scheduler::ScheduledAction;
use crate::stacking;
use crate::world::Gather;
use crate::{World, WorldError};

/// The tool required to work a node type. Non-node typenames return None.
pub(crate) fn required_tool(typename: &str) -> Option<&'static str> {
    match typename {
        "OreNode" => Some("Pickaxe"),
        "TreeNode" => Some("Axe"),
        _ => None,
    }
}

impl World {
    pub(crate) fn start_gather(
        &mut self,
        sid: SessionId,
        node: Instance,
    ) -> Result<(), WorldError> {
        match self.runtime.get(&sid).map(|rt| rt.gather) {
            Some(Gather::Active { instance_id, .. }) if instance_id == node.id => {
                // Already working this node; keep swinging.
                return Ok(());
            }
            Some(Gather::Active { .. }) => self.cancel_gather(sid),
            _ => {}
        }

        let tool = match required_tool(&node.typename) {
            Some(tool) => tool,
            None => return Ok(()),
        };
        let inventory_id = match self.sessions.get(sid).and_then(|s| s.inventory_id) {
            Some(inv) => inv,
            None => return Ok(()),
        };
        let rows = self.db.inventories().list(inventory_id)?;
        if !rows.iter().any(|r| r.typename == tool) {
            self.send_log(sid, format!("You do not have a {tool}."));
            return Ok(());
        }
        if !stacking::has_capacity(&rows) {
            self.send_log(sid, "Your inventory is full.");
            return Ok(());
        }

        let deferred_id = self.scheduler.schedule_repeating(
            self.tick,
            self.cfg.ticks(self.cfg.gather_interval_secs),
            ScheduledAction::GatherAttempt {
                session_id: sid,
                instance_id: node.id,
            },
        );
        if let Some(rt) = self.runtime.get_mut(&sid) {
            rt.gather = Gather::Active {
                instance_id: node.id,
                deferred_id,
            };
        }
        self.send_log(sid, format!("You begin working the {}.", node.name));
        Ok(())
    }

    pub(crate) fn cancel_gather(&mut self, sid: SessionId) {
        if let Some(rt) = self.runtime.get_mut(&sid) {
            if let Gather::Active { deferred_id, .. } = rt.gather {
                self.scheduler.cancel(deferred_id);
                rt.gather = Gather::Idle;
            }
        }
    }

    pub(crate) fn gather_attempt(
        &mut self,
        sid: SessionId,
        instance_id: i64,
    ) -> Result<(), WorldError> {
        let active = matches!(
            self.runtime.get(&sid).map(|rt| rt.gather),
            Some(Gather::Active { instance_id: id, .. }) if id == instance_id
        );
        let playing = self.sessions.get(sid).map(|s| s.state) == Some(SessionState::Play);
        if !active || !playing {
            self.cancel_gather(sid);
            return Ok(());
        }

        let node = match self.registry.get(instance_id) {
            Some(node) => node.clone(),
            None => {
                self.cancel_gather(sid);
                return Ok(());
            }
        };
        if node.pos.is_none() {
            // Someone else consumed the node; stand down silently.
            self.cancel_gather(sid);
            return Ok(());
        }

        let chance = self.cfg.gather_chance.clamp(0.0, 1.0);
        if !self.rng.gen_bool(chance) {
            self.send_log(sid, format!("You work the {} to no avail.", node.name));
            return Ok(());
        }

        let table = self.db.rooms().node_by_entity(node.entity_id)?;
        let entries = match table {
            Some(node_row) => self.db.drops().items_for_table(node_row.drop_table_id)?,
            None => Vec::new(),
        };
        for entry in entries {
            // Each drop entry rolls independently.
            if !self.rng.gen_bool(entry.chance.clamp(0.0, 1.0)) {
                continue;
            }
            let quantity = if entry.max_amt > entry.min_amt {
                self.rng.gen_range(entry.min_amt..=entry.max_amt)
            } else {
                entry.min_amt
            };
            let item = self.db.inventories().item(entry.item_id)?;
            let granted = self.grant_item(sid, &item, quantity)?;
            if granted > 0 {
                self.send_log(sid, format!("You gather {} {}.", granted, item.name));
            }
        }

        self.despawn_instance(instance_id)?;
        self.cancel_gather(sid);
        Ok(())
    }
}
