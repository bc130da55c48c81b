//! WebSocket Gateway
//!
//! Tracks live sessions and the rooms they joined, and fans events out to
//! them. A session joins the room keyed by its user's id on identify.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::messages::{GatewaySend, PresencePayload, PresenceStatus};
use crate::application::services::{RelayEvent, RoomEmitter};
use crate::domain::User;
use crate::infrastructure::metrics;

/// Connected session with message sender
pub struct ConnectedSession {
    pub user_id: i64,
    pub session_id: String,
    pub sender: mpsc::UnboundedSender<GatewaySend>,
}

/// WebSocket gateway managing all connections
pub struct Gateway {
    /// Identified sessions by session_id
    sessions: DashMap<String, Arc<ConnectedSession>>,
    /// Room name to joined session ids
    rooms: DashMap<String, Vec<String>>,
    /// Open sockets, identified or not
    connections: AtomicI64,
    heartbeat_interval_ms: u64,
}

impl Gateway {
    pub fn new(heartbeat_interval_ms: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            connections: AtomicI64::new(0),
            heartbeat_interval_ms,
        }
    }

    /// Get the heartbeat interval
    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.update_metrics();
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
        self.update_metrics();
    }

    /// Register an identified session and join it to its user's room.
    ///
    /// Returns the rooms the session joined. The user's first session
    /// announces them online to everyone else.
    pub fn register_session(
        &self,
        session_id: String,
        user_id: i64,
        sender: mpsc::UnboundedSender<GatewaySend>,
    ) -> Vec<String> {
        let room = User::room_for(user_id);
        let session = Arc::new(ConnectedSession {
            user_id,
            session_id: session_id.clone(),
            sender,
        });
        self.sessions.insert(session_id.clone(), session);

        {
            // Presence goes out under the room lock so a racing last
            // disconnect cannot reorder online and offline.
            let mut members = self.rooms.entry(room.clone()).or_default();
            members.push(session_id.clone());
            if members.len() == 1 {
                self.broadcast_presence(user_id, PresenceStatus::Online, &session_id);
            }
        }
        self.update_metrics();

        tracing::info!(user_id, session_id = %session_id, room = %room, "Session joined room");
        vec![room]
    }

    /// Unregister a session. The user's last session announces them offline.
    pub fn unregister_session(&self, session_id: &str) {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return;
        };

        let room = User::room_for(session.user_id);
        self.rooms.remove_if_mut(&room, |_, members| {
            members.retain(|s| s != session_id);
            let went_offline = members.is_empty();
            if went_offline {
                self.broadcast_presence(session.user_id, PresenceStatus::Offline, session_id);
            }
            went_offline
        });
        self.update_metrics();

        tracing::info!(
            user_id = session.user_id,
            session_id = %session_id,
            "Session unregistered"
        );
    }

    /// Send a frame to every session joined to `room`; returns how many took it.
    pub fn send_to_room(&self, room: &str, message: &GatewaySend) -> usize {
        let members = match self.rooms.get(room) {
            Some(members) => members.clone(),
            None => return 0,
        };

        members
            .iter()
            .filter_map(|session_id| self.sessions.get(session_id))
            .filter(|session| session.sender.send(message.clone()).is_ok())
            .count()
    }

    /// Identified session count
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Rooms with at least one session
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Check if user is online (has at least one session)
    pub fn is_user_online(&self, user_id: i64) -> bool {
        self.rooms
            .get(&User::room_for(user_id))
            .map(|members| !members.is_empty())
            .unwrap_or(false)
    }

    fn broadcast_presence(&self, user_id: i64, status: PresenceStatus, origin: &str) {
        let payload = PresencePayload {
            user_id: user_id.to_string(),
            status,
        };
        let frame = match serde_json::to_value(&payload) {
            Ok(d) => GatewaySend::dispatch("PRESENCE_UPDATE", d),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode presence update");
                return;
            }
        };

        for session in self.sessions.iter() {
            if session.session_id != origin {
                let _ = session.sender.send(frame.clone());
            }
        }
    }

    fn update_metrics(&self) {
        metrics::set_websocket_sessions(
            self.connections.load(Ordering::Relaxed),
            self.sessions.len() as i64,
        );
    }
}

impl RoomEmitter for Gateway {
    fn emit_to_room(&self, room: &str, event: RelayEvent) -> usize {
        let d = match serde_json::to_value(event.payload()) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, event = event.name(), "Failed to encode event");
                return 0;
            }
        };
        let delivered = self.send_to_room(room, &GatewaySend::dispatch(event.name(), d));
        tracing::debug!(room, event = event.name(), delivered, "Event emitted");
        delivered
    }
}
