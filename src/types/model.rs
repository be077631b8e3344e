//! Domain model for the hygiene-monitoring dashboard client
//!
//! Mirrors the wire shapes of the dashboard REST API: camelCase field
//! names, kebab-case task statuses, lowercase role/severity names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of an authenticated user. Determines which rooms the client joins
/// and which push events the server delivers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Cleaner,
    Supervisor,
    Authority,
}

/// Authenticated user as returned by `/auth/me` and the login exchange
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

/// Resolved identity: user plus the bearer token that authenticated it.
///
/// Invariant: the two fields become visible together. The session provider
/// never publishes a token without its resolved user.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub user: User,
    pub token: String,
}

/// Task priority
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

/// Task lifecycle status. Transitions are monotonic:
/// pending -> in-progress -> completed, with completed terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Ordering rank used to detect regressions out of a terminal state
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }
}

/// A hygiene task record, as held in the local task store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    pub block_id: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a task (`POST /tasks`). The server is the id
/// authority; created records come back as full [`Task`]s.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    pub block_id: String,
    pub priority: TaskPriority,
    pub due_date: DateTime<Utc>,
}

/// Partial update for a task (`PATCH /tasks/:id`). Only present fields are
/// sent and only present fields are merged locally.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_label: Option<String>,
}

impl TaskPatch {
    /// A patch with every field unset
    pub fn empty() -> Self {
        Self::default()
    }

    /// Convenience patch that only sets the status
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_to.is_none()
            && self.priority.is_none()
            && self.completed_at.is_none()
            && self.image_url.is_none()
            && self.inspection_score.is_none()
            && self.inspection_label.is_none()
    }
}

/// Per-sensor contributions to a hygiene score
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SensorBreakdown {
    pub cleanliness: f64,
    pub odor: f64,
    pub usage: f64,
    pub maintenance: f64,
}

/// One sensor-derived hygiene score sample for a facility block
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HygieneSample {
    pub block_id: String,
    /// Score in [0, 100]
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    pub sensors: SensorBreakdown,
}

/// Alert severity
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Alert category
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Maintenance,
    Cleanliness,
    Usage,
    Emergency,
}

/// An alert event pushed by the server
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    /// "type" on the wire
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub block_id: String,
    /// "level" on the wire
    #[serde(rename = "level")]
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

/// Operational status of a facility block
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Operational,
    Maintenance,
    Offline,
}

/// Standard REST response wrapper: `{success, data?, message?}`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Server-provided failure description, falling back to a generic one
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Request failed".to_string())
    }
}

/// Login request body
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Registration request body
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegisterCredentials {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Payload of a successful login/register exchange
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
}

/// `/auth/me` response payload
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MePayload {
    pub user: User,
}

/// Result of an inspection by the (external) scoring service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InspectionResult {
    pub score: f64,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        let s: TaskStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(s, TaskStatus::Pending);
    }

    #[test]
    fn test_status_rank_is_monotonic() {
        assert!(TaskStatus::Pending.rank() < TaskStatus::InProgress.rank());
        assert!(TaskStatus::InProgress.rank() < TaskStatus::Completed.rank());
    }

    #[test]
    fn test_alert_wire_renames() {
        let json = serde_json::json!({
            "id": "alert-1",
            "type": "maintenance",
            "blockId": "b1",
            "level": "critical",
            "message": "Water pressure low",
            "timestamp": "2025-06-01T10:00:00Z",
            "acknowledged": false
        });
        let alert: Alert = serde_json::from_value(json).unwrap();
        assert_eq!(alert.kind, AlertKind::Maintenance);
        assert_eq!(alert.severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_task_patch_skips_absent_fields() {
        let patch = TaskPatch::status(TaskStatus::InProgress);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert_eq!(json["status"], "in-progress");
    }

    #[test]
    fn test_envelope_failure_message_fallbacks() {
        let env: ApiEnvelope<()> = serde_json::from_str("{\"success\":false}").unwrap();
        assert_eq!(env.failure_message(), "Request failed");

        let env: ApiEnvelope<()> =
            serde_json::from_str("{\"success\":false,\"message\":\"nope\"}").unwrap();
        assert_eq!(env.failure_message(), "nope");
    }
}
