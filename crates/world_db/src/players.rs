use rusqlite::Connection;

use crate::error::DbError;

#[derive(Debug, Clone)]
pub struct PlayerRow {
    pub id: i64,
    pub user_id: i64,
    pub entity_id: i64,
    pub view_radius: i32,
}

pub struct PlayerRepo<'a> {
    conn: &'a Connection,
}

impl<'a> PlayerRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get_by_user(&self, user_id: i64) -> Result<PlayerRow, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, entity_id, view_radius FROM players WHERE user_id = ?1",
        )?;
        stmt.query_row(rusqlite::params![user_id], |row| {
            Ok(PlayerRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                entity_id: row.get(2)?,
                view_radius: row.get(3)?,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::RowNotFound("player", user_id),
            other => other.into(),
        })
    }
}
