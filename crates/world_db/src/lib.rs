//! Persistence gateway: users, players, entities, instances, inventories,
//! rooms, portals, drop tables. All operations are synchronous and
//! per-call transactional.

pub mod db;
pub mod drops;
pub mod error;
pub mod instances;
pub mod inventory;
pub mod players;
pub mod rooms;
mod schema;
pub mod seed;
pub mod users;

pub use db::{NewPlayer, WorldDb};
pub use drops::DropTableItemRow;
pub use error::DbError;
pub use instances::InstanceRow;
pub use inventory::{ContainerItemRow, ItemRow};
pub use players::PlayerRow;
pub use rooms::{NodeRow, PortalRow, RoomRow};
pub use seed::ensure_seeded;
pub use users::User;
