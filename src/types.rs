//! Core types for livetools-tasks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Allocate a fresh, process-unique id
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<u64> for TaskId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task status
///
/// `pending -> running -> {completed, error, paused, interrupted}`,
/// `paused -> {running, interrupted}`, and `pending -> interrupted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Registered, waiting for admission
    Pending,
    /// Operation in flight
    Running,
    /// Operation suspended at one of its own suspension points
    Paused,
    /// Operation resolved
    Completed,
    /// Operation rejected, or a child did not complete
    Error,
    /// Killed or interrupted by a caller
    Interrupted,
}

impl Status {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Error | Status::Interrupted)
    }

    /// Whether the task's operation is in flight (running or suspended)
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Running | Status::Paused)
    }

    /// Lowercase name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Paused => "paused",
            Status::Completed => "completed",
            Status::Error => "error",
            Status::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a task does, used by the UI to group and label rows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Upload of one video file
    UploadPart,
    /// New submission built from uploaded parts
    Submit,
    /// Edit of an existing submission
    Edit,
    /// Download of a published video
    Download,
    /// Anything else
    #[default]
    Generic,
}

/// Last-known progress reported by an operation
///
/// Each report replaces the previous one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Percentage (0.0 to 100.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f32>,
    /// Bytes transferred so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Total bytes expected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Free-form status line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Progress {
    /// Progress from transferred and total byte counts
    pub fn bytes(bytes: u64, total: u64) -> Self {
        let percentage = if total > 0 {
            Some((bytes as f64 / total as f64 * 100.0) as f32)
        } else {
            None
        };
        Self {
            percentage,
            bytes: Some(bytes),
            total: Some(total),
            message: None,
        }
    }

    /// Progress carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Point-in-time snapshot of a task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task ID
    pub id: TaskId,
    /// Display name
    pub name: String,
    /// Task kind
    pub kind: TaskKind,
    /// Current status
    pub status: Status,
    /// Last-known progress
    pub progress: Option<Progress>,
    /// Owning task, if any
    pub parent: Option<TaskId>,
    /// Owned tasks in order
    pub children: Vec<TaskId>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was admitted
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state
    pub ended_at: Option<DateTime<Utc>>,
    /// Result payload of a completed task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Failure reason of an errored or interrupted task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Number of registered tasks in each status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Tasks waiting for admission
    pub pending: usize,
    /// Tasks in flight
    pub running: usize,
    /// Suspended tasks
    pub paused: usize,
    /// Completed tasks
    pub completed: usize,
    /// Failed tasks
    pub error: usize,
    /// Interrupted tasks
    pub interrupted: usize,
}

impl StatusCounts {
    pub(crate) fn record(&mut self, status: Status) {
        match status {
            Status::Pending => self.pending += 1,
            Status::Running => self.running += 1,
            Status::Paused => self.paused += 1,
            Status::Completed => self.completed += 1,
            Status::Error => self.error += 1,
            Status::Interrupted => self.interrupted += 1,
        }
    }
}

/// Lifecycle event kind, used to filter subscriptions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Task admitted
    Start,
    /// Progress report
    Progress,
    /// Task completed
    End,
    /// Task failed or was interrupted
    Error,
}

/// Event emitted during a task's lifecycle
///
/// For any single task the order is `start`, zero or more `progress`,
/// then exactly one of `end` or `error`. A task interrupted before it
/// started emits only `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Task admitted and its operation started
    Start {
        /// Task ID
        id: TaskId,
        /// Display name of the started work
        command: String,
    },

    /// Operation reported progress
    Progress {
        /// Task ID
        id: TaskId,
        /// Reported progress
        progress: Progress,
    },

    /// Task completed
    End {
        /// Task ID
        id: TaskId,
        /// Result payload
        output: serde_json::Value,
    },

    /// Task failed or was interrupted
    Error {
        /// Task ID
        id: TaskId,
        /// Failure reason
        error: String,
    },
}

impl TaskEvent {
    /// Task this event belongs to
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Start { id, .. }
            | TaskEvent::Progress { id, .. }
            | TaskEvent::End { id, .. }
            | TaskEvent::Error { id, .. } => *id,
        }
    }

    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            TaskEvent::Start { .. } => EventKind::Start,
            TaskEvent::Progress { .. } => EventKind::Progress,
            TaskEvent::End { .. } => EventKind::End,
            TaskEvent::Error { .. } => EventKind::Error,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
        assert_eq!("42".parse::<TaskId>().unwrap(), 42);
    }

    #[test]
    fn only_completed_error_interrupted_are_terminal() {
        let terminal: Vec<Status> = [
            Status::Pending,
            Status::Running,
            Status::Paused,
            Status::Completed,
            Status::Error,
            Status::Interrupted,
        ]
        .into_iter()
        .filter(Status::is_terminal)
        .collect();
        assert_eq!(
            terminal,
            vec![Status::Completed, Status::Error, Status::Interrupted]
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TaskEvent::Progress {
            id: TaskId(9),
            progress: Progress::bytes(512, 1024),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["id"], 9);
        assert_eq!(json["progress"]["percentage"], 50.0);
        assert!(json["progress"].get("message").is_none());
        assert_eq!(event.kind(), EventKind::Progress);
    }

    #[test]
    fn zero_total_has_no_percentage() {
        assert_eq!(Progress::bytes(10, 0).percentage, None);
    }
}
