use std::collections::BTreeMap;

use space::Coord;
use world_db::InstanceRow;

/// In-memory copy of a placed entity.
///
/// `pos` of `None` is the out-of-bounds sentinel: the instance is removed
/// from the world pending respawn (or deletion). The database row keeps the
/// original spawn coordinates so respawn can restore them.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: i64,
    pub entity_id: i64,
    pub typename: String,
    pub name: String,
    pub room_id: i64,
    pub pos: Option<Coord>,
    pub amount: u32,
    pub respawn_time: u32,
}

impl From<InstanceRow> for Instance {
    fn from(row: InstanceRow) -> Self {
        let pos = match (row.y, row.x) {
            (Some(y), Some(x)) => Some(Coord::new(y, x)),
            _ => None,
        };
        Self {
            id: row.id,
            entity_id: row.entity_id,
            typename: row.typename,
            name: row.name,
            room_id: row.room_id,
            pos,
            amount: row.amount,
            respawn_time: row.respawn_time,
        }
    }
}

/// Index of every instance across all rooms, keyed by instance id.
///
/// Only the tick loop mutates this.
#[derive(Debug, Default)]
pub struct Registry {
    instances: BTreeMap<i64, Instance>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(rows: Vec<InstanceRow>) -> Self {
        let mut registry = Self::new();
        for row in rows {
            let instance = Instance::from(row);
            registry.instances.insert(instance.id, instance);
        }
        registry
    }

    pub fn insert(&mut self, instance: Instance) {
        self.instances.insert(instance.id, instance);
    }

    pub fn remove(&mut self, id: i64) -> Option<Instance> {
        self.instances.remove(&id)
    }

    pub fn get(&self, id: i64) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    pub fn by_entity(&self, entity_id: i64) -> Option<&Instance> {
        self.instances.values().find(|i| i.entity_id == entity_id)
    }

    /// Instances placed in a room, in id order.
    pub fn in_room(&self, room_id: i64) -> impl Iterator<Item = &Instance> {
        self.instances
            .values()
            .filter(move |i| i.room_id == room_id)
    }

    /// Instances occupying an exact cell of a room, in id order.
    pub fn at(&self, room_id: i64, pos: Coord) -> impl Iterator<Item = &Instance> {
        self.in_room(room_id).filter(move |i| i.pos == Some(pos))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(id: i64, room: i64, pos: Option<(i32, i32)>, typename: &str) -> Instance {
        Instance {
            id,
            entity_id: id * 10,
            typename: typename.to_string(),
            name: typename.to_string(),
            room_id: room,
            pos: pos.map(|(y, x)| Coord::new(y, x)),
            amount: 1,
            respawn_time: 0,
        }
    }

    #[test]
    fn room_and_cell_queries() {
        let mut reg = Registry::new();
        reg.insert(make(1, 1, Some((2, 2)), "Player"));
        reg.insert(make(2, 1, Some((2, 2)), "Ore"));
        reg.insert(make(3, 2, Some((2, 2)), "Player"));
        reg.insert(make(4, 1, None, "OreNode"));

        let in_room: Vec<i64> = reg.in_room(1).map(|i| i.id).collect();
        assert_eq!(in_room, vec![1, 2, 4]);

        let at: Vec<i64> = reg.at(1, Coord::new(2, 2)).map(|i| i.id).collect();
        assert_eq!(at, vec![1, 2]);

        // OOB instances never occupy a cell.
        assert!(reg.at(1, Coord::new(0, 0)).next().is_none());
    }

    #[test]
    fn by_entity_lookup() {
        let mut reg = Registry::new();
        reg.insert(make(7, 1, Some((1, 1)), "Player"));
        assert_eq!(reg.by_entity(70).map(|i| i.id), Some(7));
        assert!(reg.by_entity(99).is_none());
    }

    #[test]
    fn oob_row_loads_as_none_position() {
        let row = InstanceRow {
            id: 1,
            entity_id: 2,
            typename: "OreNode".into(),
            name: "Ore vein".into(),
            room_id: 1,
            y: None,
            x: None,
            amount: 1,
            respawn_time: 30,
        };
        let reg = Registry::load(vec![row]);
        assert_eq!(reg.get(1).unwrap().pos, None);
    }
}
