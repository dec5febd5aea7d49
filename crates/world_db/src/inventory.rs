use rusqlite::Connection;

use crate::error::DbError;

/// Catalog data for an item-typed entity.
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub id: i64,
    pub entity_id: i64,
    pub typename: String,
    pub name: String,
    pub max_stack_amt: u32,
}

/// One inventory slot.
#[derive(Debug, Clone)]
pub struct ContainerItemRow {
    pub id: i64,
    pub inventory_id: i64,
    pub item_id: i64,
    pub item_entity_id: i64,
    pub typename: String,
    pub name: String,
    pub amount: u32,
    pub max_stack_amt: u32,
}

pub struct InventoryRepo<'a> {
    conn: &'a Connection,
}

impl<'a> InventoryRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get_or_create_for_player(&self, player_id: i64) -> Result<i64, DbError> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM inventories WHERE player_id = ?1",
                rusqlite::params![player_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO inventories (player_id) VALUES (?1)",
            rusqlite::params![player_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Slots of an inventory, joined with item data, ordered by slot id.
    pub fn list(&self, inventory_id: i64) -> Result<Vec<ContainerItemRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.inventory_id, c.item_id, it.entity_id, e.typename, e.name, \
             c.amount, it.max_stack_amt \
             FROM container_items c \
             JOIN items it ON it.id = c.item_id \
             JOIN entities e ON e.id = it.entity_id \
             WHERE c.inventory_id = ?1 ORDER BY c.id",
        )?;
        let rows = stmt.query_map(rusqlite::params![inventory_id], |row| {
            Ok(ContainerItemRow {
                id: row.get(0)?,
                inventory_id: row.get(1)?,
                item_id: row.get(2)?,
                item_entity_id: row.get(3)?,
                typename: row.get(4)?,
                name: row.get(5)?,
                amount: row.get(6)?,
                max_stack_amt: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn create_stack(
        &self,
        inventory_id: i64,
        item_id: i64,
        amount: u32,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO container_items (inventory_id, item_id, amount) VALUES (?1, ?2, ?3)",
            rusqlite::params![inventory_id, item_id, amount],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_amount(&self, container_item_id: i64, amount: u32) -> Result<(), DbError> {
        let rows = self.conn.execute(
            "UPDATE container_items SET amount = ?1 WHERE id = ?2",
            rusqlite::params![amount, container_item_id],
        )?;
        if rows == 0 {
            return Err(DbError::RowNotFound("container item", container_item_id));
        }
        Ok(())
    }

    pub fn delete(&self, container_item_id: i64) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM container_items WHERE id = ?1",
            rusqlite::params![container_item_id],
        )?;
        Ok(())
    }

    /// Item catalog row for an item-typed entity, if the entity is an item.
    pub fn item_by_entity(&self, entity_id: i64) -> Result<Option<ItemRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT it.id, it.entity_id, e.typename, e.name, it.max_stack_amt \
             FROM items it JOIN entities e ON e.id = it.entity_id WHERE it.entity_id = ?1",
        )?;
        let result = stmt.query_row(rusqlite::params![entity_id], |row| {
            Ok(ItemRow {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                typename: row.get(2)?,
                name: row.get(3)?,
                max_stack_amt: row.get(4)?,
            })
        });
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn item(&self, item_id: i64) -> Result<ItemRow, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT it.id, it.entity_id, e.typename, e.name, it.max_stack_amt \
             FROM items it JOIN entities e ON e.id = it.entity_id WHERE it.id = ?1",
        )?;
        stmt.query_row(rusqlite::params![item_id], |row| {
            Ok(ItemRow {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                typename: row.get(2)?,
                name: row.get(3)?,
                max_stack_amt: row.get(4)?,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::RowNotFound("item", item_id),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::WorldDb;

    fn setup() -> (WorldDb, i64, i64) {
        let db = WorldDb::open_memory().unwrap();
        db.conn()
            .execute("INSERT INTO users (username, password_hash) VALUES ('u', 'h')", [])
            .unwrap();
        let user = db.conn().last_insert_rowid();
        db.conn()
            .execute("INSERT INTO entities (typename, name) VALUES ('Player', 'u')", [])
            .unwrap();
        let pentity = db.conn().last_insert_rowid();
        db.conn()
            .execute(
                "INSERT INTO players (user_id, entity_id) VALUES (?1, ?2)",
                rusqlite::params![user, pentity],
            )
            .unwrap();
        let player = db.conn().last_insert_rowid();

        db.conn()
            .execute("INSERT INTO entities (typename, name) VALUES ('Ore', 'Ore')", [])
            .unwrap();
        let ore_entity = db.conn().last_insert_rowid();
        db.conn()
            .execute(
                "INSERT INTO items (entity_id, max_stack_amt) VALUES (?1, 100)",
                rusqlite::params![ore_entity],
            )
            .unwrap();
        let ore_item = db.conn().last_insert_rowid();
        (db, player, ore_item)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (db, player, _) = setup();
        let a = db.inventories().get_or_create_for_player(player).unwrap();
        let b = db.inventories().get_or_create_for_player(player).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stack_lifecycle() {
        let (db, player, ore_item) = setup();
        let inv = db.inventories().get_or_create_for_player(player).unwrap();

        let slot = db.inventories().create_stack(inv, ore_item, 25).unwrap();
        let rows = db.inventories().list(inv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, slot);
        assert_eq!(rows[0].name, "Ore");
        assert_eq!(rows[0].amount, 25);
        assert_eq!(rows[0].max_stack_amt, 100);

        db.inventories().update_amount(slot, 99).unwrap();
        assert_eq!(db.inventories().list(inv).unwrap()[0].amount, 99);

        db.inventories().delete(slot).unwrap();
        assert!(db.inventories().list(inv).unwrap().is_empty());
    }

    #[test]
    fn item_by_entity_distinguishes_items() {
        let (db, _, _) = setup();
        db.conn()
            .execute("INSERT INTO entities (typename, name) VALUES ('Portal', 'Door')", [])
            .unwrap();
        let portal_entity = db.conn().last_insert_rowid();

        let ore_entity: i64 = db
            .conn()
            .query_row("SELECT entity_id FROM items LIMIT 1", [], |r| r.get(0))
            .unwrap();
        let item = db.inventories().item_by_entity(ore_entity).unwrap();
        assert!(item.is_some());
        assert_eq!(item.unwrap().typename, "Ore");
        assert!(db.inventories().item_by_entity(portal_entity).unwrap().is_none());
    }
}
