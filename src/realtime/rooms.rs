//! Room registry.
//!
//! Maps realtime connections to the rooms they joined and fans frames out to
//! room members. Membership is kept in two indices (room -> members and
//! connection -> rooms) so that a dropped connection can be removed from every
//! room without scanning. Empty rooms are reaped.

use super::protocol::OutboundFrame;
use crate::metrics;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Connection identifier (UUID string assigned by the gateway).
pub type ConnectionId = String;

/// Outbound queue of one connection.
pub type FrameSink = mpsc::Sender<Arc<OutboundFrame>>;

/// Room membership and delivery.
#[derive(Default)]
pub struct RoomRegistry {
    /// Room id -> member connections.
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// Connection -> rooms it belongs to.
    memberships: DashMap<ConnectionId, HashSet<String>>,
    /// Connection -> outbound queue.
    sinks: DashMap<ConnectionId, FrameSink>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound queue of a new connection.
    pub fn register(&self, conn: &str, sink: FrameSink) {
        self.sinks.insert(conn.to_string(), sink);
    }

    /// Add `conn` to `room`. Returns `false` if it was already a member.
    pub fn join(&self, conn: &str, room: &str) -> bool {
        let added = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn.to_string());
        self.memberships
            .entry(conn.to_string())
            .or_default()
            .insert(room.to_string());
        if added {
            metrics::set_active_rooms(self.rooms.len());
        }
        added
    }

    /// Remove `conn` from `room`. No-op if it is not a member.
    pub fn leave(&self, conn: &str, room: &str) -> bool {
        let removed = self
            .rooms
            .get_mut(room)
            .map(|mut members| members.remove(conn))
            .unwrap_or(false);
        if removed {
            self.rooms.remove_if(room, |_, members| members.is_empty());
            metrics::set_active_rooms(self.rooms.len());
        }

        if let Some(mut rooms) = self.memberships.get_mut(conn) {
            rooms.remove(room);
        }
        self.memberships.remove_if(conn, |_, rooms| rooms.is_empty());
        removed
    }

    /// Drop every membership of `conn` along with its outbound queue.
    ///
    /// Returns the rooms it was removed from.
    pub fn remove_connection(&self, conn: &str) -> Vec<String> {
        self.sinks.remove(conn);
        let rooms = self
            .memberships
            .remove(conn)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default();

        for room in &rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(conn);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
        if !rooms.is_empty() {
            metrics::set_active_rooms(self.rooms.len());
        }
        rooms.into_iter().collect()
    }

    /// Deliver `event`/`payload` to every member of `room` except `exclude`.
    ///
    /// Delivery never waits: a member whose queue is full misses this frame.
    /// Returns the number of members the frame was queued for.
    pub fn broadcast_to_room(
        &self,
        room: &str,
        event: &str,
        payload: Value,
        exclude: Option<&str>,
    ) -> usize {
        let recipients: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .filter(|member| Some(member.as_str()) != exclude)
                .cloned()
                .collect(),
            None => return 0,
        };

        let frame = Arc::new(OutboundFrame::new(event, payload));
        let mut delivered = 0;
        for member in recipients {
            let Some(sink) = self.sinks.get(&member).map(|s| s.value().clone()) else {
                continue;
            };
            match sink.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    metrics::record_frame_dropped();
                    debug!(conn = %member, room = %room, event = %event, "Outbound queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn = %member, room = %room, "Outbound queue closed");
                }
            }
        }
        metrics::record_fanout(delivered);
        delivered
    }

    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, conn: &str) -> Vec<String> {
        self.memberships
            .get(conn)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, conn: &str, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(conn))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Connections with a registered outbound queue.
    pub fn connection_count(&self) -> usize {
        self.sinks.len()
    }
}
