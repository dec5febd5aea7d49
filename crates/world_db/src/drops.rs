use rusqlite::Connection;

use crate::error::DbError;

/// One weighted entry of a drop table.
#[derive(Debug, Clone)]
pub struct DropTableItemRow {
    pub id: i64,
    pub drop_table_id: i64,
    pub item_id: i64,
    pub min_amt: u32,
    pub max_amt: u32,
    pub chance: f64,
}

pub struct DropRepo<'a> {
    conn: &'a Connection,
}

impl<'a> DropRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn items_for_table(&self, drop_table_id: i64) -> Result<Vec<DropTableItemRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, drop_table_id, item_id, min_amt, max_amt, chance \
             FROM drop_table_items WHERE drop_table_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![drop_table_id], |row| {
            Ok(DropTableItemRow {
                id: row.get(0)?,
                drop_table_id: row.get(1)?,
                item_id: row.get(2)?,
                min_amt: row.get(3)?,
                max_amt: row.get(4)?,
                chance: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}
