//! Local stores fed by the event stream and REST reconciliation

pub mod alerts;
pub mod metrics;
pub mod tasks;

pub use alerts::{AlertFeed, FEED_CAPACITY};
pub use metrics::{MetricsBuffer, HISTORY_CAPACITY};
pub use tasks::TaskStore;
