use rusqlite::Connection;

use crate::error::DbError;

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: i64,
    pub name: String,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct PortalRow {
    pub id: i64,
    pub entity_id: i64,
    pub linked_room_id: i64,
    pub linked_y: i32,
    pub linked_x: i32,
}

#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: i64,
    pub entity_id: i64,
    pub drop_table_id: i64,
}

pub struct RoomRepo<'a> {
    conn: &'a Connection,
}

impl<'a> RoomRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: i64) -> Result<RoomRow, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, file_name FROM rooms WHERE id = ?1")?;
        stmt.query_row(rusqlite::params![id], |row| {
            Ok(RoomRow {
                id: row.get(0)?,
                name: row.get(1)?,
                file_name: row.get(2)?,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::RowNotFound("room", id),
            other => other.into(),
        })
    }

    pub fn list(&self) -> Result<Vec<RoomRow>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, file_name FROM rooms ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(RoomRow {
                id: row.get(0)?,
                name: row.get(1)?,
                file_name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn create(&self, name: &str, file_name: &str) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO rooms (name, file_name) VALUES (?1, ?2)",
            rusqlite::params![name, file_name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Portal data for a portal-typed entity.
    pub fn portal_by_entity(&self, entity_id: i64) -> Result<Option<PortalRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_id, linked_room_id, linked_y, linked_x \
             FROM portals WHERE entity_id = ?1",
        )?;
        let result = stmt.query_row(rusqlite::params![entity_id], |row| {
            Ok(PortalRow {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                linked_room_id: row.get(2)?,
                linked_y: row.get(3)?,
                linked_x: row.get(4)?,
            })
        });
        match result {
            Ok(portal) => Ok(Some(portal)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Gatherable-node data for a node-typed entity.
    pub fn node_by_entity(&self, entity_id: i64) -> Result<Option<NodeRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_id, drop_table_id FROM resource_nodes WHERE entity_id = ?1",
        )?;
        let result = stmt.query_row(rusqlite::params![entity_id], |row| {
            Ok(NodeRow {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                drop_table_id: row.get(2)?,
            })
        });
        match result {
            Ok(node) => Ok(Some(node)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::WorldDb;
    use crate::error::DbError;

    #[test]
    fn create_get_list() {
        let db = WorldDb::open_memory().unwrap();
        let a = db.rooms().create("Overworld", "overworld.json").unwrap();
        let b = db.rooms().create("Cavern", "cavern.json").unwrap();

        let room = db.rooms().get(a).unwrap();
        assert_eq!(room.name, "Overworld");

        let all = db.rooms().list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, b);
    }

    #[test]
    fn missing_room_errors() {
        let db = WorldDb::open_memory().unwrap();
        assert!(matches!(
            db.rooms().get(42),
            Err(DbError::RowNotFound("room", 42))
        ));
    }

    #[test]
    fn portal_lookup() {
        let db = WorldDb::open_memory().unwrap();
        let room = db.rooms().create("Overworld", "o.json").unwrap();
        db.conn()
            .execute(
                "INSERT INTO entities (typename, name) VALUES ('Portal', 'Cave mouth')",
                [],
            )
            .unwrap();
        let entity = db.conn().last_insert_rowid();
        db.conn()
            .execute(
                "INSERT INTO portals (entity_id, linked_room_id, linked_y, linked_x) \
                 VALUES (?1, ?2, 4, 6)",
                rusqlite::params![entity, room],
            )
            .unwrap();

        let portal = db.rooms().portal_by_entity(entity).unwrap().unwrap();
        assert_eq!(portal.linked_room_id, room);
        assert_eq!((portal.linked_y, portal.linked_x), (4, 6));
        assert!(db.rooms().portal_by_entity(999).unwrap().is_none());
    }
}
