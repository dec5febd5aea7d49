use rusqlite::Connection;

use crate::error::DbError;

/// A placed entity, joined with its entity row for display data.
/// `y`/`x` of NULL is the out-of-bounds sentinel: removed pending respawn.
#[derive(Debug, Clone)]
pub struct InstanceRow {
    pub id: i64,
    pub entity_id: i64,
    pub typename: String,
    pub name: String,
    pub room_id: i64,
    pub y: Option<i32>,
    pub x: Option<i32>,
    pub amount: u32,
    pub respawn_time: u32,
}

const SELECT: &str = "SELECT i.id, i.entity_id, e.typename, e.name, i.room_id, i.y, i.x, \
                      i.amount, i.respawn_time \
                      FROM instanced_entities i JOIN entities e ON e.id = i.entity_id";

fn row_to_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstanceRow> {
    Ok(InstanceRow {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        typename: row.get(2)?,
        name: row.get(3)?,
        room_id: row.get(4)?,
        y: row.get(5)?,
        x: row.get(6)?,
        amount: row.get(7)?,
        respawn_time: row.get(8)?,
    })
}

pub struct InstanceRepo<'a> {
    conn: &'a Connection,
}

impl<'a> InstanceRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Every instance in the database, ordered by id.
    pub fn load_all(&self) -> Result<Vec<InstanceRow>, DbError> {
        let mut stmt = self.conn.prepare(&format!("{SELECT} ORDER BY i.id"))?;
        let rows = stmt.query_map([], row_to_instance)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn get(&self, id: i64) -> Result<InstanceRow, DbError> {
        let mut stmt = self.conn.prepare(&format!("{SELECT} WHERE i.id = ?1"))?;
        stmt.query_row(rusqlite::params![id], row_to_instance)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::RowNotFound("instance", id),
                other => other.into(),
            })
    }

    pub fn get_by_entity(&self, entity_id: i64) -> Result<InstanceRow, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT} WHERE i.entity_id = ?1"))?;
        stmt.query_row(rusqlite::params![entity_id], row_to_instance)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::RowNotFound("instance", entity_id),
                other => other.into(),
            })
    }

    /// Place a new instance; returns its freshly allocated id.
    pub fn create(
        &self,
        entity_id: i64,
        room_id: i64,
        y: i32,
        x: i32,
        amount: u32,
        respawn_time: u32,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO instanced_entities (entity_id, room_id, y, x, amount, respawn_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![entity_id, room_id, y, x, amount, respawn_time],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_position(&self, id: i64, pos: Option<(i32, i32)>) -> Result<(), DbError> {
        let (y, x) = match pos {
            Some((y, x)) => (Some(y), Some(x)),
            None => (None, None),
        };
        let rows = self.conn.execute(
            "UPDATE instanced_entities SET y = ?1, x = ?2 WHERE id = ?3",
            rusqlite::params![y, x, id],
        )?;
        if rows == 0 {
            return Err(DbError::RowNotFound("instance", id));
        }
        Ok(())
    }

    pub fn update_room(&self, id: i64, room_id: i64) -> Result<(), DbError> {
        let rows = self.conn.execute(
            "UPDATE instanced_entities SET room_id = ?1 WHERE id = ?2",
            rusqlite::params![room_id, id],
        )?;
        if rows == 0 {
            return Err(DbError::RowNotFound("instance", id));
        }
        Ok(())
    }

    pub fn update_amount(&self, id: i64, amount: u32) -> Result<(), DbError> {
        let rows = self.conn.execute(
            "UPDATE instanced_entities SET amount = ?1 WHERE id = ?2",
            rusqlite::params![amount, id],
        )?;
        if rows == 0 {
            return Err(DbError::RowNotFound("instance", id));
        }
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM instanced_entities WHERE id = ?1",
            rusqlite::params![id],
        )?;
        Ok(())
    }
}
