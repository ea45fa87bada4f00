//! Flat task arena: id -> entry, plus insertion order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, watch};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::task::{CompletionHook, Task, Work};
use crate::types::{Progress, Status, StatusCounts, TaskId, TaskInfo, TaskKind};

/// Registered task with its runtime state
pub(crate) struct TaskEntry {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) kind: TaskKind,
    pub(crate) status: Status,
    pub(crate) progress: Option<Progress>,
    pub(crate) parent: Option<TaskId>,
    pub(crate) children: Vec<TaskId>,
    pub(crate) work: Work,
    pub(crate) hook: Option<Arc<dyn CompletionHook>>,
    /// Added with `start = true` or started explicitly
    pub(crate) scheduled: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) output: Option<serde_json::Value>,
    pub(crate) error: Option<String>,
    pub(crate) cancel: CancellationToken,
    /// Concurrency slot held while a leaf is running or paused
    pub(crate) permit: Option<OwnedSemaphorePermit>,
    /// Broadcasts status changes; groups wait on their children's
    pub(crate) status_tx: watch::Sender<Status>,
    /// Outcome that arrived while paused, applied on resume
    pub(crate) parked: Option<Result<serde_json::Value>>,
}

impl TaskEntry {
    pub(crate) fn from_task(task: Task, scheduled: bool, cancel: CancellationToken) -> Self {
        let (status_tx, _rx) = watch::channel(Status::Pending);
        Self {
            id: task.id,
            name: task.name,
            kind: task.kind,
            status: Status::Pending,
            progress: None,
            parent: task.parent,
            children: task.children,
            work: task.work,
            hook: task.hook,
            scheduled,
            created_at: task.created_at,
            started_at: None,
            ended_at: None,
            output: None,
            error: None,
            cancel,
            permit: None,
            status_tx,
            parked: None,
        }
    }

    /// Move to `status`, stamping times and notifying watchers
    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
        match status {
            Status::Running if self.started_at.is_none() => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => {
                self.ended_at = Some(Utc::now());
                self.permit = None;
            }
            _ => {}
        }
        self.status_tx.send_replace(status);
    }

    pub(crate) fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            progress: self.progress.clone(),
            parent: self.parent,
            children: self.children.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            output: self.output.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, TaskEntry>,
}

impl Registry {
    pub(crate) fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<&TaskEntry> {
        self.tasks.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskEntry> {
        self.tasks.get_mut(&id)
    }

    pub(crate) fn insert(&mut self, entry: TaskEntry) {
        self.order.push(entry.id);
        self.tasks.insert(entry.id, entry);
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<TaskEntry> {
        let entry = self.tasks.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(entry)
    }

    /// Ids in insertion order
    pub(crate) fn ids(&self) -> &[TaskId] {
        &self.order
    }

    /// Snapshots in insertion order
    pub(crate) fn list(&self) -> Vec<TaskInfo> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(TaskEntry::info)
            .collect()
    }

    pub(crate) fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.tasks.values() {
            counts.record(entry.status);
        }
        counts
    }

    /// All descendants of `id`, parents before their children
    pub(crate) fn descendants(&self, id: TaskId) -> Vec<TaskId> {
        let mut out = Vec::new();
        let mut stack: Vec<TaskId> = match self.tasks.get(&id) {
            Some(entry) => entry.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(entry) = self.tasks.get(&next) {
                stack.extend(entry.children.iter().rev().copied());
            }
        }
        out
    }

    /// Whether `id` may be admitted now
    ///
    /// Children wait for their parent to be running; top-level tasks wait
    /// for `start`.
    pub(crate) fn is_eligible(&self, id: TaskId) -> bool {
        let Some(entry) = self.tasks.get(&id) else {
            return false;
        };
        if entry.status != Status::Pending {
            return false;
        }
        match entry.parent.and_then(|parent| self.tasks.get(&parent)) {
            Some(parent) => parent.status == Status::Running,
            // Orphaned children (parent removed) fall back to their own flag
            None => entry.scheduled,
        }
    }
}
