//! Per-session viewport diffing.
//!
//! Rooms are marked dirty by any position-changing mutation; once per tick
//! every Play session in a dirty room diffs its visible set against the
//! last state it was sent. Identical state produces no traffic at all.

use std::collections::BTreeMap;

use proto::{Model, Packet};
use session::{SessionId, SessionState};
use space::View;

use crate::registry::Instance;
use crate::world::{OutFrame, VisibleState};
use crate::World;

/// Full wire snapshot of an instance.
pub(crate) fn instance_model(inst: &Instance) -> Model {
    Model::Instance {
        id: inst.id,
        entity_id: inst.entity_id,
        typename: inst.typename.clone(),
        name: inst.name.clone(),
        room_id: inst.room_id,
        y: inst.pos.map(|p| p.y),
        x: inst.pos.map(|p| p.x),
        amount: inst.amount,
    }
}

impl World {
    pub(crate) fn recompute_room(&mut self, room_id: i64) {
        for sid in self.sessions.play_sessions_in_room(room_id) {
            self.recompute_session(sid);
        }
    }

    pub(crate) fn recompute_session(&mut self, sid: SessionId) {
        let (own_instance, radius, room_id) = match self.sessions.get(sid) {
            Some(s) if s.state == SessionState::Play => match (s.instance_id, s.room_id) {
                (Some(instance_id), Some(room_id)) => (instance_id, s.view_radius, room_id),
                _ => return,
            },
            _ => return,
        };
        let center = match self.registry.get(own_instance).and_then(|i| i.pos) {
            Some(center) => center,
            None => return,
        };
        let view = View::centered(center, radius);

        let mut new_visible: BTreeMap<i64, VisibleState> = BTreeMap::new();
        for inst in self.registry.in_room(room_id) {
            // The viewer's own avatar is synced on its own cadence.
            if inst.id == own_instance {
                continue;
            }
            let pos = match inst.pos {
                Some(pos) => pos,
                None => continue,
            };
            if !view.contains(pos) {
                continue;
            }
            // Avatars of sessions that left Play are not part of the world.
            if inst.typename == "Player"
                && self.sessions.play_session_for_entity(inst.entity_id).is_none()
            {
                continue;
            }
            new_visible.insert(
                inst.id,
                VisibleState {
                    pos,
                    amount: inst.amount,
                },
            );
        }

        let old = match self.runtime.get(&sid) {
            Some(rt) => rt.visible.clone(),
            None => return,
        };

        let mut packets = Vec::new();
        for &id in old.keys() {
            if !new_visible.contains_key(&id) {
                packets.push(Packet::Goodbye { instance_id: id });
            }
        }
        for (&id, state) in &new_visible {
            match old.get(&id) {
                None => {
                    if let Some(inst) = self.registry.get(id) {
                        packets.push(Packet::ModelUpdate {
                            model: instance_model(inst),
                        });
                    }
                }
                Some(prev) if prev != state => {
                    let model = Model::InstanceDelta {
                        id,
                        y: (prev.pos.y != state.pos.y).then_some(state.pos.y),
                        x: (prev.pos.x != state.pos.x).then_some(state.pos.x),
                        amount: (prev.amount != state.amount).then_some(state.amount),
                    };
                    if !model.is_empty_delta() {
                        packets.push(Packet::ModelUpdate { model });
                    }
                }
                Some(_) => {}
            }
        }

        if let Some(rt) = self.runtime.get_mut(&sid) {
            rt.visible = new_visible;
            for packet in packets {
                rt.outbound.push(OutFrame::Pkt(packet));
            }
        }
    }
}
