use std::time::Duration;

use rusqlite::Connection;

use crate::drops::DropRepo;
use crate::error::DbError;
use crate::instances::InstanceRepo;
use crate::inventory::InventoryRepo;
use crate::players::PlayerRepo;
use crate::rooms::RoomRepo;
use crate::schema;
use crate::users::UserRepo;

/// Ids created by a successful registration.
#[derive(Debug, Clone, Copy)]
pub struct NewPlayer {
    pub user_id: i64,
    pub player_id: i64,
    pub entity_id: i64,
    pub inventory_id: i64,
    pub instance_id: i64,
}

/// Database handle wrapping a SQLite connection.
///
/// Calls are synchronous and per-call transactional; the busy timeout keeps
/// a contended database from stalling the caller indefinitely.
pub struct WorldDb {
    conn: Connection,
}

impl WorldDb {
    /// Open (or create) a database at the given file path.
    pub fn open(path: &str) -> Result<Self, DbError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::create_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn users(&self) -> UserRepo<'_> {
        UserRepo::new(&self.conn)
    }

    pub fn players(&self) -> PlayerRepo<'_> {
        PlayerRepo::new(&self.conn)
    }

    pub fn rooms(&self) -> RoomRepo<'_> {
        RoomRepo::new(&self.conn)
    }

    pub fn instances(&self) -> InstanceRepo<'_> {
        InstanceRepo::new(&self.conn)
    }

    pub fn inventories(&self) -> InventoryRepo<'_> {
        InventoryRepo::new(&self.conn)
    }

    pub fn drops(&self) -> DropRepo<'_> {
        DropRepo::new(&self.conn)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Atomically create user, entity, player, inventory and spawn instance.
    ///
    /// Everything happens inside one transaction: a duplicate username (or
    /// any other failure) leaves no partial rows behind.
    pub fn register_player(
        &self,
        username: &str,
        password: &str,
        room_id: i64,
        spawn: (i32, i32),
    ) -> Result<NewPlayer, DbError> {
        let tx = self.conn.unchecked_transaction()?;

        let user = UserRepo::new(&tx).create(username, password)?;

        tx.execute(
            "INSERT INTO entities (typename, name) VALUES ('Player', ?1)",
            rusqlite::params![username],
        )?;
        let entity_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO players (user_id, entity_id) VALUES (?1, ?2)",
            rusqlite::params![user.id, entity_id],
        )?;
        let player_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO inventories (player_id) VALUES (?1)",
            rusqlite::params![player_id],
        )?;
        let inventory_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO instanced_entities (entity_id, room_id, y, x, amount, respawn_time) \
             VALUES (?1, ?2, ?3, ?4, 1, 0)",
            rusqlite::params![entity_id, room_id, spawn.0, spawn.1],
        )?;
        let instance_id = tx.last_insert_rowid();

        tx.commit()?;
        tracing::info!(username, player_id, "registered new player");

        Ok(NewPlayer {
            user_id: user.id,
            player_id,
            entity_id,
            inventory_id,
            instance_id,
        })
    }
}
