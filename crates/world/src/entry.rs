//! GET_ENTRY handlers: login and registration.

use proto::Packet;
use session::SessionId;
use world_db::DbError;

use crate::registry::Instance;
use crate::{World, WorldError};

impl World {
    pub(crate) fn handle_login(
        &mut self,
        sid: SessionId,
        username: &str,
        password: &str,
    ) -> Result<(), WorldError> {
        let user = match self.db.users().get_by_username(username)? {
            Some(user) => user,
            None => {
                self.deny(sid, "I don't know anybody by that name");
                return Ok(());
            }
        };
        let player = self.db.players().get_by_user(user.id)?;
        if self.sessions.player_active(player.id) {
            self.deny(sid, "You are already inhabiting this realm");
            return Ok(());
        }
        match self.db.users().verify_password(username, password) {
            Ok(_) => {}
            Err(DbError::InvalidPassword) => {
                self.deny(sid, "Incorrect password");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let instance = match self.registry.by_entity(player.entity_id) {
            Some(instance) => instance.clone(),
            None => {
                // Not resident yet (created since boot): pull it in.
                let row = self.db.instances().get_by_entity(player.entity_id)?;
                let instance = Instance::from(row);
                self.registry.insert(instance.clone());
                instance
            }
        };
        let inventory_id = self.db.inventories().get_or_create_for_player(player.id)?;

        self.sessions.bind_player(
            sid,
            &user.username,
            player.id,
            player.entity_id,
            instance.id,
            inventory_id,
            player.view_radius,
        );
        self.send(sid, Packet::Ok);

        let pos = instance
            .pos
            .map(|p| (p.y, p.x))
            .unwrap_or(self.cfg.spawn_pos);
        self.join_room(sid, instance.room_id, pos)?;
        tracing::info!(?sid, username = %user.username, "login");
        Ok(())
    }

    pub(crate) fn handle_register(
        &mut self,
        sid: SessionId,
        username: &str,
        password: &str,
    ) -> Result<(), WorldError> {
        if username.trim().is_empty() || password.is_empty() {
            self.deny(sid, "Username and password must not be blank");
            return Ok(());
        }
        match self.db.register_player(
            username,
            password,
            self.cfg.spawn_room_id,
            self.cfg.spawn_pos,
        ) {
            Ok(new) => {
                let row = self.db.instances().get(new.instance_id)?;
                self.registry.insert(Instance::from(row));
                self.send(sid, Packet::Ok);
                tracing::info!(?sid, username, "registration");
                Ok(())
            }
            Err(DbError::UserExists(_)) => {
                self.deny(sid, "Somebody else already goes by that name");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
