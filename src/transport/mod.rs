//! Event-stream transport: connection lifecycle and room subscriptions

pub mod connection;
pub mod rooms;

pub use connection::{ConnectionManager, ConnectionPhase, ConnectionState};
pub use rooms::{rooms_for, RoomSubscriptions, ROOM_AUTHORITY, ROOM_SUPERVISORS};
