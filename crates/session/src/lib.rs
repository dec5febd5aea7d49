use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// Bytes ready for a session's socket, produced once per tick flush.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub session_id: SessionId,
    pub bytes: Vec<u8>,
    /// When true, the output router drops the session's write channel after
    /// delivery, closing the TCP connection.
    pub disconnect: bool,
}

impl SessionOutput {
    pub fn new(session_id: SessionId, bytes: Vec<u8>) -> Self {
        Self {
            session_id,
            bytes,
            disconnect: false,
        }
    }

    /// Final flush for a session that must be closed after delivery.
    pub fn with_disconnect(session_id: SessionId, bytes: Vec<u8>) -> Self {
        Self {
            session_id,
            bytes,
            disconnect: true,
        }
    }
}

/// Connection-level protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Unauthenticated: only login/registration traffic is meaningful.
    GetEntry,
    /// Authenticated and placed in a room.
    Play,
    /// Connection gone; the session is awaiting removal.
    Disconnected,
}

/// Per-connection identity and world bindings.
///
/// The binding fields are all set together on login and cleared together on
/// logout; `state` is `Play` exactly when they are populated.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub session_id: SessionId,
    pub state: SessionState,
    pub username: Option<String>,
    pub player_id: Option<i64>,
    pub entity_id: Option<i64>,
    pub instance_id: Option<i64>,
    pub inventory_id: Option<i64>,
    pub room_id: Option<i64>,
    pub view_radius: i32,
}

impl PlayerSession {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: SessionState::GetEntry,
            username: None,
            player_id: None,
            entity_id: None,
            instance_id: None,
            inventory_id: None,
            room_id: None,
            view_radius: 10,
        }
    }
}

/// Registry of active sessions.
///
/// Invariant: a player id maps to at most one session in `Play` state.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: BTreeMap<SessionId, PlayerSession>,
    player_to_session: BTreeMap<i64, SessionId>,
    entity_to_session: BTreeMap<i64, SessionId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, id: SessionId) {
        self.sessions.insert(id, PlayerSession::new(id));
    }

    pub fn get(&self, id: SessionId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&id)
    }

    /// Whether this player already has a live Play session.
    pub fn player_active(&self, player_id: i64) -> bool {
        self.player_to_session
            .get(&player_id)
            .and_then(|sid| self.sessions.get(sid))
            .map(|s| s.state == SessionState::Play)
            .unwrap_or(false)
    }

    /// Bind a session to its player after successful authentication.
    pub fn bind_player(
        &mut self,
        id: SessionId,
        username: &str,
        player_id: i64,
        entity_id: i64,
        instance_id: i64,
        inventory_id: i64,
        view_radius: i32,
    ) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.username = Some(username.to_string());
            session.player_id = Some(player_id);
            session.entity_id = Some(entity_id);
            session.instance_id = Some(instance_id);
            session.inventory_id = Some(inventory_id);
            session.view_radius = view_radius;
            self.player_to_session.insert(player_id, id);
            self.entity_to_session.insert(entity_id, id);
        }
    }

    /// Clear world bindings, returning the session to `GetEntry`.
    pub fn unbind_player(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            if let Some(pid) = session.player_id.take() {
                self.player_to_session.remove(&pid);
            }
            if let Some(eid) = session.entity_id.take() {
                self.entity_to_session.remove(&eid);
            }
            session.username = None;
            session.instance_id = None;
            session.inventory_id = None;
            session.room_id = None;
            session.state = SessionState::GetEntry;
        }
    }

    /// Remove a session entirely (connection gone).
    pub fn remove(&mut self, id: SessionId) {
        self.unbind_player(id);
        self.sessions.remove(&id);
    }

    /// Session currently playing the given entity, if any.
    pub fn play_session_for_entity(&self, entity_id: i64) -> Option<&PlayerSession> {
        self.entity_to_session
            .get(&entity_id)
            .and_then(|sid| self.sessions.get(sid))
            .filter(|s| s.state == SessionState::Play)
    }

    /// Session ids in Play state inside a room, sorted.
    pub fn play_sessions_in_room(&self, room_id: i64) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Play && s.room_id == Some(room_id))
            .map(|s| s.session_id)
            .collect()
    }

    pub fn all_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn play_ids(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Play)
            .map(|s| s.session_id)
            .collect()
    }
}
