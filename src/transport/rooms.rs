//! Room subscription controller
//!
//! Computes the room set for an identity and keeps join/leave bookkeeping
//! so no stale room membership leaks across identity changes.

use std::sync::Mutex;
use tracing::{debug, warn};

use crate::types::{ClientEvent, Role, User};

use super::connection::ConnectionManager;

/// Supervisors-wide room
pub const ROOM_SUPERVISORS: &str = "supervisors";
/// National-authority oversight room
pub const ROOM_AUTHORITY: &str = "authority";

/// Room set for a role and assigned block.
///
/// The mapping is an exhaustive match: adding a role without deciding its
/// rooms fails to compile instead of silently joining nothing.
pub fn rooms_for(role: Role, block_id: Option<&str>) -> Vec<String> {
    match role {
        Role::Cleaner => match block_id {
            Some(block) => vec![format!("block:{}", block)],
            None => {
                warn!("Cleaner without an assigned block joins no rooms");
                Vec::new()
            }
        },
        Role::Supervisor => vec![ROOM_SUPERVISORS.to_string()],
        Role::Authority => vec![ROOM_AUTHORITY.to_string()],
    }
}

/// Tracks the joined room set for the live connection
#[derive(Default)]
pub struct RoomSubscriptions {
    joined: Mutex<Vec<String>>,
}

impl RoomSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rooms currently believed joined
    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().expect("room lock poisoned").clone()
    }

    /// Join the room set for `user`, leaving any previous set first.
    ///
    /// Join requests are fire-and-forget; the server does not acknowledge
    /// them in this protocol.
    pub async fn join_for(&self, transport: &ConnectionManager, user: &User) {
        self.leave_all(transport).await;

        let rooms = rooms_for(user.role, user.block_id.as_deref());
        for room in &rooms {
            debug!(room = %room, "Joining room");
            if let Err(e) = transport
                .send(ClientEvent::JoinRoom { room: room.clone() })
                .await
            {
                warn!(room = %room, "Join request not sent: {}", e);
            }
        }

        *self.joined.lock().expect("room lock poisoned") = rooms;
    }

    /// Leave every previously joined room. Invoked on disconnect and before
    /// any new join set is computed on identity change.
    pub async fn leave_all(&self, transport: &ConnectionManager) {
        let rooms = std::mem::take(&mut *self.joined.lock().expect("room lock poisoned"));
        for room in rooms {
            debug!(room = %room, "Leaving room");
            if let Err(e) = transport.send(ClientEvent::LeaveRoom { room }).await {
                // Connection already gone; server-side membership died with it
                debug!("Leave request not sent: {}", e);
            }
        }
    }

    /// Forget the joined set without emitting leave events. Used when the
    /// connection dropped: server-side membership is already gone.
    pub fn reset(&self) {
        self.joined.lock().expect("room lock poisoned").clear();
    }
}
