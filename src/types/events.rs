//! Wire events for the dashboard event stream
//!
//! Events travel as JSON text frames of the form
//! `{"event": "<name>", "data": {...}}` in both directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Alert, BlockStatus, HygieneSample, TaskStatus};

/// Events pushed by the server to subscribed rooms
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Fresh hygiene score sample for a block
    HygieneTick(HygieneSample),
    /// A new alert was raised
    AlertCreated(Alert),
    /// A task changed state somewhere else (another actor, another client)
    TaskUpdated(TaskUpdatedEvent),
    /// A block changed operational status
    BlockStatusChanged(BlockStatusEvent),
}

/// Payload of a `task_updated` push event. Only present fields are merged
/// into the local record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdatedEvent {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Payload of a `block_status_changed` push event
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatusEvent {
    pub block_id: String,
    pub status: BlockStatus,
    pub timestamp: DateTime<Utc>,
}

/// Events the client sends over the event stream
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom { room: String },
    LeaveRoom { room: String },
    #[serde(rename_all = "camelCase")]
    TaskStatusUpdate { task_id: String, status: TaskStatus },
    #[serde(rename_all = "camelCase")]
    AcknowledgeAlert { alert_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_event_tag_names() {
        let json = serde_json::json!({
            "event": "task_updated",
            "data": {
                "taskId": "t1",
                "status": "completed",
                "completedBy": "u2"
            }
        });
        let event: ServerEvent = serde_json::from_value(json).unwrap();
        match event {
            ServerEvent::TaskUpdated(ev) => {
                assert_eq!(ev.task_id, "t1");
                assert_eq!(ev.status, TaskStatus::Completed);
                assert_eq!(ev.completed_by.as_deref(), Some("u2"));
                assert!(ev.completed_at.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        let json = r#"{"event":"unknown_thing","data":{}}"#;
        assert!(serde_json::from_str::<ServerEvent>(json).is_err());
    }

    #[test]
    fn test_client_event_encoding() {
        let event = ClientEvent::JoinRoom {
            room: "block:b1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "join_room");
        assert_eq!(json["data"]["room"], "block:b1");

        let event = ClientEvent::AcknowledgeAlert {
            alert_id: "a1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "acknowledge_alert");
        assert_eq!(json["data"]["alertId"], "a1");
    }
}
