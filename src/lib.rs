//! blockpulse - real-time sync client for facility-hygiene dashboards
//!
//! A presentation-free state layer for role-based hygiene-monitoring
//! dashboards: it keeps a locally cached task collection, a rolling
//! per-block hygiene-score window, and a bounded alert feed in sync with a
//! remote REST API and a push event stream, under an unreliable connection
//! that reconnects and resumes role-appropriate room subscriptions on its
//! own.
//!
//! ## Layers
//!
//! - **Session**: authenticated identity, token persistence, session epoch
//! - **Transport**: the single event-stream connection with bounded backoff
//! - **Rooms**: role/block derived subscription membership
//! - **Stores**: tasks (optimistic + reconciled), metrics, alerts
//! - **Client**: the composition root wiring the above together

pub mod api;
pub mod client;
pub mod config;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use client::{SyncClient, TaskFilter};
pub use config::{Args, SyncConfig};
pub use types::{Result, SyncError};
