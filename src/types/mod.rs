//! Shared types: domain model, wire events, and errors

pub mod error;
pub mod events;
pub mod model;

pub use error::{Result, SyncError};
pub use events::{BlockStatusEvent, ClientEvent, ServerEvent, TaskUpdatedEvent};
pub use model::{
    Alert, AlertKind, AlertSeverity, ApiEnvelope, AuthPayload, BlockStatus, HygieneSample,
    Identity, InspectionResult, LoginCredentials, MePayload, NewTask, RegisterCredentials, Role,
    SensorBreakdown, Task, TaskPatch, TaskPriority, TaskStatus, User,
};
