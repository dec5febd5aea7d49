use rusqlite::Connection;

use crate::db::WorldDb;
use crate::error::DbError;

/// Populate an empty database with the starter world: two linked rooms,
/// tools on the ground, and gatherable resource nodes.
///
/// A database that already has rooms is left untouched.
pub fn ensure_seeded(db: &WorldDb) -> Result<bool, DbError> {
    if !db.rooms().list()?.is_empty() {
        return Ok(false);
    }

    let conn = db.conn();
    let overworld = db.rooms().create("Overworld", "overworld.json")?;
    let cavern = db.rooms().create("Mossy Cavern", "cavern.json")?;

    // Portals between the two rooms.
    let cave_mouth = entity(conn, "Portal", "Cave mouth")?;
    instance(conn, cave_mouth, overworld, 10, 27, 1, 0)?;
    portal(conn, cave_mouth, cavern, 10, 5)?;

    let cave_exit = entity(conn, "Portal", "Way out")?;
    instance(conn, cave_exit, cavern, 10, 4, 1, 0)?;
    portal(conn, cave_exit, overworld, 10, 26)?;

    // Tools, lying on the ground near the spawn.
    let pickaxe = entity(conn, "Pickaxe", "Worn pickaxe")?;
    item(conn, pickaxe, 1)?;
    instance(conn, pickaxe, overworld, 8, 6, 1, 60)?;

    let axe = entity(conn, "Axe", "Rusty axe")?;
    item(conn, axe, 1)?;
    instance(conn, axe, overworld, 12, 6, 1, 60)?;

    // Stackable resources and their drop tables.
    let ore = entity(conn, "Ore", "Ore")?;
    let ore_item = item(conn, ore, 100)?;
    let logs = entity(conn, "Logs", "Logs")?;
    let logs_item = item(conn, logs, 100)?;

    let ore_table = drop_table(conn, "ore_node")?;
    drop_entry(conn, ore_table, ore_item, 1, 3, 1.0)?;
    let tree_table = drop_table(conn, "tree_node")?;
    drop_entry(conn, tree_table, logs_item, 1, 2, 1.0)?;

    let vein = entity(conn, "OreNode", "Ore vein")?;
    instance(conn, vein, overworld, 8, 10, 1, 30)?;
    node(conn, vein, ore_table)?;

    let tree = entity(conn, "TreeNode", "Sturdy tree")?;
    instance(conn, tree, overworld, 14, 10, 1, 30)?;
    node(conn, tree, tree_table)?;

    tracing::info!("seeded starter world");
    Ok(true)
}

fn entity(conn: &Connection, typename: &str, name: &str) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO entities (typename, name) VALUES (?1, ?2)",
        rusqlite::params![typename, name],
    )?;
    Ok(conn.last_insert_rowid())
}

fn instance(
    conn: &Connection,
    entity_id: i64,
    room_id: i64,
    y: i32,
    x: i32,
    amount: u32,
    respawn_time: u32,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO instanced_entities (entity_id, room_id, y, x, amount, respawn_time) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![entity_id, room_id, y, x, amount, respawn_time],
    )?;
    Ok(conn.last_insert_rowid())
}

fn item(conn: &Connection, entity_id: i64, max_stack_amt: u32) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO items (entity_id, max_stack_amt) VALUES (?1, ?2)",
        rusqlite::params![entity_id, max_stack_amt],
    )?;
    Ok(conn.last_insert_rowid())
}

fn portal(
    conn: &Connection,
    entity_id: i64,
    linked_room_id: i64,
    linked_y: i32,
    linked_x: i32,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO portals (entity_id, linked_room_id, linked_y, linked_x) \
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![entity_id, linked_room_id, linked_y, linked_x],
    )?;
    Ok(conn.last_insert_rowid())
}

fn drop_table(conn: &Connection, name: &str) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO drop_tables (name) VALUES (?1)",
        rusqlite::params![name],
    )?;
    Ok(conn.last_insert_rowid())
}

fn drop_entry(
    conn: &Connection,
    drop_table_id: i64,
    item_id: i64,
    min_amt: u32,
    max_amt: u32,
    chance: f64,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO drop_table_items (drop_table_id, item_id, min_amt, max_amt, chance) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![drop_table_id, item_id, min_amt, max_amt, chance],
    )?;
    Ok(conn.last_insert_rowid())
}

fn node(conn: &Connection, entity_id: i64, drop_table_id: i64) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO resource_nodes (entity_id, drop_table_id) VALUES (?1, ?2)",
        rusqlite::params![entity_id, drop_table_id],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_empty_database_once() {
        let db = WorldDb::open_memory().unwrap();
        assert!(ensure_seeded(&db).unwrap());
        assert!(!ensure_seeded(&db).unwrap());

        let rooms = db.rooms().list().unwrap();
        assert_eq!(rooms.len(), 2);

        let instances = db.instances().load_all().unwrap();
        // Two portals, two tools, two nodes.
        assert_eq!(instances.len(), 6);
        assert!(instances.iter().any(|i| i.typename == "OreNode"));
        assert!(instances.iter().any(|i| i.typename == "Portal"));
    }

    #[test]
    fn seeded_node_has_drop_table() {
        let db = WorldDb::open_memory().unwrap();
        ensure_seeded(&db).unwrap();

        let vein = db
            .instances()
            .load_all()
            .unwrap()
            .into_iter()
            .find(|i| i.typename == "OreNode")
            .unwrap();
        let node = db.rooms().node_by_entity(vein.entity_id).unwrap().unwrap();
        let entries = db.drops().items_for_table(node.drop_table_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].min_amt, entries[0].max_amt), (1, 3));
    }

    #[test]
    fn seeded_portals_link_both_ways() {
        let db = WorldDb::open_memory().unwrap();
        ensure_seeded(&db).unwrap();

        let portals: Vec<_> = db
            .instances()
            .load_all()
            .unwrap()
            .into_iter()
            .filter(|i| i.typename == "Portal")
            .collect();
        assert_eq!(portals.len(), 2);
        let a = db.rooms().portal_by_entity(portals[0].entity_id).unwrap().unwrap();
        let b = db.rooms().portal_by_entity(portals[1].entity_id).unwrap().unwrap();
        assert_eq!(a.linked_room_id, portals[1].room_id);
        assert_eq!(b.linked_room_id, portals[0].room_id);
    }
}
