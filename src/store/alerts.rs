//! Alert feed
//!
//! Bounded reverse-chronological list of alert events (newest first).
//! Acknowledgement is local and optimistic; the server-side record travels
//! as a fire-and-forget transport event and is never reconciled back.

use std::collections::VecDeque;
use std::sync::RwLock;

use crate::types::{Alert, Role};

/// Alerts retained in the feed
pub const FEED_CAPACITY: usize = 50;

/// Bounded alert feed, newest first
#[derive(Default)]
pub struct AlertFeed {
    alerts: RwLock<VecDeque<Alert>>,
}

impl AlertFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an alert, dropping the oldest past capacity
    pub fn ingest(&self, alert: Alert) {
        let mut alerts = self.alerts.write().expect("alert lock poisoned");
        alerts.push_front(alert);
        alerts.truncate(FEED_CAPACITY);
    }

    /// Mark an alert acknowledged. Idempotent; unknown ids are a no-op.
    /// Returns whether anything changed, so the caller knows whether to
    /// emit the outbound acknowledgement event.
    pub fn acknowledge(&self, alert_id: &str) -> bool {
        let mut alerts = self.alerts.write().expect("alert lock poisoned");
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) if !alert.acknowledged => {
                alert.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    /// Snapshot, newest first
    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .expect("alert lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Unacknowledged alerts, newest first
    pub fn unacknowledged(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .expect("alert lock poisoned")
            .iter()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect()
    }

    /// Role-scoped view for notification display: cleaners see their own
    /// block, supervisors and the authority see everything.
    pub fn for_role(&self, role: Role, block_id: Option<&str>) -> Vec<Alert> {
        let alerts = self.alerts.read().expect("alert lock poisoned");
        match role {
            Role::Cleaner => alerts
                .iter()
                .filter(|a| Some(a.block_id.as_str()) == block_id)
                .cloned()
                .collect(),
            Role::Supervisor | Role::Authority => alerts.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.read().expect("alert lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertKind, AlertSeverity};
    use chrono::Utc;

    fn alert(id: &str, block: &str) -> Alert {
        Alert {
            id: id.to_string(),
            kind: AlertKind::Cleanliness,
            block_id: block.to_string(),
            severity: AlertSeverity::Medium,
            message: "Score below threshold".to_string(),
            timestamp: Utc::now(),
            acknowledged: false,
            assigned_to: None,
        }
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let feed = AlertFeed::new();
        for i in 0..55 {
            feed.ingest(alert(&format!("a{}", i), "b1"));
        }

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.len(), FEED_CAPACITY);
        assert_eq!(snapshot.first().unwrap().id, "a54");
        // Oldest five dropped off the tail
        assert_eq!(snapshot.last().unwrap().id, "a5");
    }

    #[test]
    fn test_acknowledge_idempotent() {
        let feed = AlertFeed::new();
        feed.ingest(alert("a1", "b1"));

        assert!(feed.acknowledge("a1"));
        assert!(!feed.acknowledge("a1"));

        let snapshot = feed.snapshot();
        assert!(snapshot[0].acknowledged);
        assert!(feed.unacknowledged().is_empty());
    }

    #[test]
    fn test_acknowledge_unknown_id_is_noop() {
        let feed = AlertFeed::new();
        feed.ingest(alert("a1", "b1"));
        assert!(!feed.acknowledge("missing"));
        assert_eq!(feed.unacknowledged().len(), 1);
    }

    #[test]
    fn test_role_filtered_views() {
        let feed = AlertFeed::new();
        feed.ingest(alert("a1", "b1"));
        feed.ingest(alert("a2", "b2"));

        let mine = feed.for_role(Role::Cleaner, Some("b1"));
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "a1");

        assert_eq!(feed.for_role(Role::Supervisor, None).len(), 2);
        assert_eq!(feed.for_role(Role::Authority, None).len(), 2);
        assert!(feed.for_role(Role::Cleaner, None).is_empty());
    }
}
