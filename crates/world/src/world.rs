use std::collections::{BTreeMap, BTreeSet, VecDeque};

use proto::{netstring, Packet, ProtoError, ServerKeyPair, SessionCipher, Weather};
use rand::rngs::StdRng;
use rand::SeedableRng;
use session::{SessionId, SessionManager, SessionOutput, SessionState};
use space::{Coord, RoomLayout};
use world_db::WorldDb;

use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::{WorldConfig, WorldError};

/// Gathering micro-state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gather {
    Idle,
    Active { instance_id: i64, deferred_id: u64 },
}

/// An outbound frame waiting for the end-of-tick flush.
///
/// `Raw` bypasses the session cipher; the only raw frame is the public key
/// bootstrap at the very start of a connection.
#[derive(Debug)]
pub(crate) enum OutFrame {
    Raw(Vec<u8>),
    Pkt(Packet),
}

/// Last state sent to a viewer for one visible instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VisibleState {
    pub pos: Coord,
    pub amount: u32,
}

/// Tick-thread-side state of a connection: crypto, queues and caches.
#[derive(Debug)]
pub(crate) struct SessionRuntime {
    pub cipher: SessionCipher,
    pub inbound: VecDeque<Vec<u8>>,
    pub outbound: Vec<OutFrame>,
    pub visible: BTreeMap<i64, VisibleState>,
    pub gather: Gather,
    pub sent_inventory: bool,
    pub close: bool,
}

impl SessionRuntime {
    fn new() -> Self {
        Self {
            cipher: SessionCipher::new(),
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            visible: BTreeMap::new(),
            gather: Gather::Idle,
            sent_inventory: false,
            close: false,
        }
    }
}

/// The single ordering authority. Owns every piece of shared world state;
/// all mutation happens through the tick loop that drives this struct.
pub struct World {
    pub(crate) cfg: WorldConfig,
    pub(crate) db: WorldDb,
    keypair: ServerKeyPair,
    pub(crate) registry: Registry,
    pub(crate) sessions: SessionManager,
    pub(crate) runtime: BTreeMap<SessionId, SessionRuntime>,
    pub(crate) layouts: BTreeMap<i64, RoomLayout>,
    pub(crate) scheduler: Scheduler,
    pub(crate) weather: Weather,
    pub(crate) dirty_rooms: BTreeSet<i64>,
    pub(crate) rng: StdRng,
    pub(crate) tick: u64,
}

impl World {
    pub fn new(cfg: WorldConfig, db: WorldDb) -> Result<Self, WorldError> {
        let keypair = ServerKeyPair::generate(cfg.rsa_bits)?;
        let registry = Registry::load(db.instances().load_all()?);
        let rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut world = Self {
            keypair,
            registry,
            db,
            sessions: SessionManager::new(),
            runtime: BTreeMap::new(),
            layouts: BTreeMap::new(),
            scheduler: Scheduler::new(),
            weather: Weather::Clear,
            dirty_rooms: BTreeSet::new(),
            rng,
            tick: 0,
            cfg,
        };
        world.scheduler.schedule_repeating(
            0,
            world.cfg.ticks(world.cfg.weather_interval_secs),
            crate::ScheduledAction::WeatherCheck,
        );
        world.scheduler.schedule_repeating(
            0,
            world.cfg.ticks(world.cfg.save_interval_secs),
            crate::ScheduledAction::SaveAll,
        );
        tracing::info!(instances = world.registry.len(), "world loaded");
        Ok(world)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn weather(&self) -> Weather {
        self.weather
    }

    pub fn session_count(&self) -> usize {
        self.runtime.len()
    }

    /// A new TCP connection. The first outbound frame is the unencrypted
    /// RSA public key.
    pub fn on_connect(&mut self, sid: SessionId) {
        self.sessions.create(sid);
        let mut rt = SessionRuntime::new();
        rt.outbound.push(OutFrame::Raw(self.keypair.public_key_frame()));
        self.runtime.insert(sid, rt);
        tracing::info!(?sid, "session connected");
    }

    /// A complete netstring payload arrived. Queued, bounded; drained at
    /// most one per session per tick.
    pub fn on_frame(&mut self, sid: SessionId, frame: Vec<u8>) {
        let cap = self.cfg.inbound_queue_cap;
        if let Some(rt) = self.runtime.get_mut(&sid) {
            if rt.inbound.len() >= cap {
                tracing::warn!(?sid, cap, "inbound queue full, dropping oldest frame");
                rt.inbound.pop_front();
            }
            rt.inbound.push_back(frame);
        }
    }

    /// Connection lost: synthesize a logout, then deregister the session.
    pub fn on_disconnect(&mut self, sid: SessionId) {
        if self.sessions.get(sid).map(|s| s.state) == Some(SessionState::Play) {
            self.depart(sid);
        }
        if let Some(s) = self.sessions.get_mut(sid) {
            s.state = SessionState::Disconnected;
        }
        self.sessions.remove(sid);
        self.runtime.remove(&sid);
        tracing::info!(?sid, "session disconnected");
    }

    /// One full tick: dispatch one inbound packet per session, fire due
    /// deferreds, recompute visibility for dirty rooms, flush outbound.
    pub fn tick(&mut self) -> Vec<SessionOutput> {
        self.tick += 1;

        let ids: Vec<SessionId> = self.runtime.keys().copied().collect();
        for sid in ids {
            let frame = self
                .runtime
                .get_mut(&sid)
                .and_then(|rt| rt.inbound.pop_front());
            if let Some(frame) = frame {
                self.handle_frame(sid, frame);
            }
        }

        let due = self.scheduler.due(self.tick);
        for task in due {
            self.run_action(task.action);
        }

        let rooms: Vec<i64> = std::mem::take(&mut self.dirty_rooms).into_iter().collect();
        for room in rooms {
            self.recompute_room(room);
        }

        self.flush()
    }

    /// Persist player state and produce a final goodbye flush for every
    /// connected session. Called once when the process is shutting down.
    pub fn shutdown(&mut self) -> Vec<SessionOutput> {
        self.save_players();
        for sid in self.sessions.all_ids() {
            self.send(
                sid,
                Packet::ServerLog {
                    text: "The server is going down. Farewell!".to_string(),
                },
            );
            if let Some(rt) = self.runtime.get_mut(&sid) {
                rt.close = true;
            }
        }
        self.flush()
    }

    fn handle_frame(&mut self, sid: SessionId, frame: Vec<u8>) {
        let established = self
            .runtime
            .get(&sid)
            .map(|rt| rt.cipher.established())
            .unwrap_or(false);

        if !established {
            // Key bootstrap: the frame must be the RSA-wrapped ClientKey.
            let plain = match self.keypair.unwrap_bootstrap(&frame) {
                Ok(plain) => plain,
                Err(e) => {
                    tracing::warn!(?sid, error = %e, "rsa bootstrap failed, closing");
                    self.force_close(sid);
                    return;
                }
            };
            match Packet::decode(&plain) {
                Ok(Packet::ClientKey { key }) => self.install_key(sid, &key),
                Ok(other) => {
                    tracing::warn!(?sid, action = other.action(), "expected ClientKey, closing");
                    self.force_close(sid);
                }
                Err(e) => {
                    tracing::warn!(?sid, error = %e, "malformed bootstrap, closing");
                    self.force_close(sid);
                }
            }
            return;
        }

        let plain = {
            let rt = match self.runtime.get(&sid) {
                Some(rt) => rt,
                None => return,
            };
            match rt.cipher.open(&frame) {
                Ok(plain) => plain,
                Err(e) => {
                    // One bad frame is dropped; the connection survives.
                    tracing::warn!(?sid, error = %e, "dropping undecryptable frame");
                    return;
                }
            }
        };

        match Packet::decode(&plain) {
            Ok(packet) => self.dispatch(sid, packet),
            Err(ProtoError::UnknownAction(tag)) => {
                tracing::warn!(?sid, tag, "unknown action, closing connection");
                self.force_close(sid);
            }
            Err(ProtoError::Malformed(reason)) => {
                // Indistinguishable from a frame garbled by a bad key:
                // treated like a decryption failure and dropped.
                tracing::warn!(?sid, reason, "dropping malformed frame");
            }
        }
    }

    fn install_key(&mut self, sid: SessionId, hex_key: &str) {
        let key = match hex::decode(hex_key) {
            Ok(key) => key,
            Err(_) => {
                tracing::warn!(?sid, "client key is not valid hex, closing");
                self.force_close(sid);
                return;
            }
        };
        let install = self
            .runtime
            .get_mut(&sid)
            .map(|rt| rt.cipher.install(&key));
        match install {
            Some(Ok(())) => {
                tracing::debug!(?sid, "session key established");
                self.send(
                    sid,
                    Packet::Welcome {
                        motd: self.cfg.motd.clone(),
                    },
                );
            }
            Some(Err(e)) => {
                tracing::warn!(?sid, error = %e, "rejecting session key, closing");
                self.force_close(sid);
            }
            None => {}
        }
    }

    fn dispatch(&mut self, sid: SessionId, packet: Packet) {
        let state = match self.sessions.get(sid) {
            Some(s) => s.state,
            None => return,
        };
        let result = match (state, packet) {
            (SessionState::GetEntry, Packet::Login { username, password }) => {
                self.handle_login(sid, &username, &password)
            }
            (SessionState::GetEntry, Packet::Register { username, password }) => {
                self.handle_register(sid, &username, &password)
            }
            (SessionState::Play, Packet::Move { direction }) => self.handle_move(sid, direction),
            (SessionState::Play, Packet::Chat { message }) => self.handle_chat(sid, &message),
            (SessionState::Play, Packet::GrabItem) => self.handle_grab(sid),
            (
                SessionState::Play,
                Packet::DropItem {
                    container_item_id,
                    amount,
                },
            ) => self.handle_drop(sid, container_item_id, amount),
            (SessionState::Play, Packet::Logout { .. }) => self.handle_logout(sid),
            (SessionState::Play, Packet::Disconnect { .. }) => {
                self.force_close(sid);
                Ok(())
            }
            (_, other) => {
                tracing::debug!(?sid, ?state, action = other.action(), "packet ignored in state");
                Ok(())
            }
        };
        if let Err(e) = result {
            // Per-session failure only; the world keeps ticking.
            tracing::error!(?sid, error = %e, "request failed");
            self.deny(sid, "The server could not complete that request");
        }
    }

    // ---- outbound helpers -------------------------------------------------

    pub(crate) fn send(&mut self, sid: SessionId, packet: Packet) {
        if let Some(rt) = self.runtime.get_mut(&sid) {
            rt.outbound.push(OutFrame::Pkt(packet));
        }
    }

    pub(crate) fn send_log(&mut self, sid: SessionId, text: impl Into<String>) {
        self.send(sid, Packet::ServerLog { text: text.into() });
    }

    pub(crate) fn deny(&mut self, sid: SessionId, reason: &str) {
        self.send(
            sid,
            Packet::Deny {
                reason: reason.to_string(),
            },
        );
    }

    /// Send to every Play session in a room, minus an exclusion set.
    pub(crate) fn broadcast_room(&mut self, room_id: i64, packet: Packet, excluding: &[SessionId]) {
        for sid in self.sessions.play_sessions_in_room(room_id) {
            if !excluding.contains(&sid) {
                self.send(sid, packet.clone());
            }
        }
    }

    pub(crate) fn broadcast_play(&mut self, packet: Packet) {
        for sid in self.sessions.play_ids() {
            self.send(sid, packet.clone());
        }
    }

    pub(crate) fn mark_dirty(&mut self, room_id: i64) {
        self.dirty_rooms.insert(room_id);
    }

    /// Protocol-fatal path: synthesize a logout and close at next flush.
    pub(crate) fn force_close(&mut self, sid: SessionId) {
        if self.sessions.get(sid).map(|s| s.state) == Some(SessionState::Play) {
            self.depart(sid);
        }
        if let Some(rt) = self.runtime.get_mut(&sid) {
            rt.close = true;
        }
    }

    pub(crate) fn ensure_layout(&mut self, room_id: i64) -> Result<(), WorldError> {
        if self.layouts.contains_key(&room_id) {
            return Ok(());
        }
        let room = self.db.rooms().get(room_id)?;
        let path = std::path::Path::new(&self.cfg.map_dir).join(&room.file_name);
        let layout = match RoomLayout::load(&path) {
            Ok(layout) => layout,
            Err(e) => {
                tracing::warn!(room_id, file = %room.file_name, error = %e,
                    "map file unavailable, using fallback field");
                RoomLayout::field(20, 30)
            }
        };
        self.layouts.insert(room_id, layout);
        Ok(())
    }

    pub(crate) fn layout(&self, room_id: i64) -> Option<&RoomLayout> {
        self.layouts.get(&room_id)
    }

    fn flush(&mut self) -> Vec<SessionOutput> {
        let mut outputs = Vec::new();
        let mut closed = Vec::new();
        let ids: Vec<SessionId> = self.runtime.keys().copied().collect();

        for sid in ids {
            let rt = match self.runtime.get_mut(&sid) {
                Some(rt) => rt,
                None => continue,
            };
            let frames = std::mem::take(&mut rt.outbound);
            let mut bytes = Vec::new();
            for frame in frames {
                match frame {
                    OutFrame::Raw(payload) => bytes.extend_from_slice(&netstring::encode(&payload)),
                    OutFrame::Pkt(packet) => match rt.cipher.seal(&packet.encode()) {
                        Ok(sealed) => bytes.extend_from_slice(&netstring::encode(&sealed)),
                        Err(e) => {
                            tracing::warn!(?sid, error = %e, "dropping packet without session key");
                        }
                    },
                }
            }
            if !bytes.is_empty() || rt.close {
                outputs.push(SessionOutput {
                    session_id: sid,
                    bytes,
                    disconnect: rt.close,
                });
            }
            if rt.close {
                closed.push(sid);
            }
        }

        for sid in closed {
            if let Some(s) = self.sessions.get_mut(sid) {
                s.state = SessionState::Disconnected;
            }
            self.sessions.remove(sid);
            self.runtime.remove(&sid);
        }
        outputs
    }
}
