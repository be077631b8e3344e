//! Task synchronization store
//!
//! The locally cached, authoritative task collection. Mutations arrive
//! three ways: local optimistic patches, server-confirmed canonical
//! records, and push-delivered events from other actors. All mutation goes
//! through these operations; conflict resolution is last-writer-wins by
//! arrival into the store, except that a locally `Completed` status never
//! regresses (completed is terminal for the status field; secondary fields
//! still update).

use chrono::Utc;
use std::sync::RwLock;
use tracing::debug;

use crate::types::{Task, TaskPatch, TaskStatus, TaskUpdatedEvent};

/// Cached task collection
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole collection with a server fetch result.
    /// Supersedes any optimistic state not yet confirmed.
    pub fn replace_all(&self, tasks: Vec<Task>) {
        *self.tasks.write().expect("task lock poisoned") = tasks;
    }

    /// Prepend a record. No-op when the id already exists (push-delivered
    /// duplicates of a locally created task).
    pub fn insert(&self, task: Task) -> bool {
        let mut tasks = self.tasks.write().expect("task lock poisoned");
        if tasks.iter().any(|t| t.id == task.id) {
            return false;
        }
        tasks.insert(0, task);
        true
    }

    /// Apply an optimistic local patch. Returns the pre-patch record so a
    /// caller choosing a rollback policy can restore it; this store never
    /// rolls back on its own.
    pub fn apply_patch(&self, id: &str, patch: &TaskPatch) -> Option<Task> {
        let mut tasks = self.tasks.write().expect("task lock poisoned");
        let task = tasks.iter_mut().find(|t| t.id == id)?;
        let previous = task.clone();

        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(ref assigned_to) = patch.assigned_to {
            task.assigned_to = assigned_to.clone();
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(completed_at) = patch.completed_at {
            task.completed_at = Some(completed_at);
        }
        if let Some(ref image_url) = patch.image_url {
            task.image_url = Some(image_url.clone());
        }
        if let Some(inspection_score) = patch.inspection_score {
            task.inspection_score = Some(inspection_score);
        }
        if let Some(ref inspection_label) = patch.inspection_label {
            task.inspection_label = Some(inspection_label.clone());
        }
        task.updated_at = Utc::now();

        Some(previous)
    }

    /// Replace a record with the server-confirmed canonical version.
    /// Server fields win entirely; this is not a field-by-field merge.
    pub fn apply_canonical(&self, task: Task) -> bool {
        let mut tasks = self.tasks.write().expect("task lock poisoned");
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => {
                *slot = task;
                true
            }
            None => false,
        }
    }

    /// Merge a push-delivered status event into the matching record.
    ///
    /// Only fields present in the event are touched. Unknown task ids are
    /// dropped; this store does not synthesize tasks from partial events.
    /// `updated_at` is set to processing time: local arrival order is the
    /// visible ordering.
    pub fn apply_remote_event(&self, event: &TaskUpdatedEvent) -> bool {
        let mut tasks = self.tasks.write().expect("task lock poisoned");
        let task = match tasks.iter_mut().find(|t| t.id == event.task_id) {
            Some(task) => task,
            None => {
                debug!(task = %event.task_id, "Dropping event for unknown task");
                return false;
            }
        };

        // Completed is terminal: a stale event must not regress the status
        // used by the UI, but may still update secondary fields.
        if !(task.status == TaskStatus::Completed && event.status.rank() < task.status.rank()) {
            task.status = event.status;
        }
        if let Some(ref completed_by) = event.completed_by {
            task.assigned_to = completed_by.clone();
        }
        if let Some(completed_at) = event.completed_at {
            task.completed_at = Some(completed_at);
        }
        task.updated_at = Utc::now();
        true
    }

    /// Remove a record by id
    pub fn remove(&self, id: &str) -> bool {
        let mut tasks = self.tasks.write().expect("task lock poisoned");
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        tasks.len() != before
    }

    /// Snapshot of one record
    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks
            .read()
            .expect("task lock poisoned")
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// Snapshot of the whole collection
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.read().expect("task lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().expect("task lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
