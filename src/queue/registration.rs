//! Adding tasks and reading snapshots.

use std::sync::atomic::Ordering;

use crate::error::{Error, Result, TaskError};
use crate::task::Task;
use crate::types::{Status, StatusCounts, TaskId, TaskInfo};

use super::TaskQueue;
use super::registry::TaskEntry;

impl TaskQueue {
    /// Register a task
    ///
    /// With `start = true` the task is scheduled right away, subject to the
    /// concurrency budget. With `start = false` it stays `pending` until its
    /// parent starts running or [`start`](Self::start) is called. Children
    /// are registered before their parent so the whole group is visible
    /// before any of it runs.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - [`TaskError::NotFound`] if a listed child is not registered
    /// - [`TaskError::InvalidGraph`] for a duplicate id, or children on a
    ///   task that runs an operation
    /// - [`TaskError::InvalidTransition`] / [`TaskError::AlreadyTerminal`] when
    ///   joining a parent that has already started
    pub async fn add_task(&self, task: Task, start: bool) -> Result<TaskId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = task.id;
        let mut task = task;
        {
            let mut registry = self.registry.lock().await;

            if registry.contains(id) {
                return Err(TaskError::InvalidGraph {
                    id,
                    reason: "already registered".into(),
                }
                .into());
            }

            // Adopt children registered earlier with only a parent id
            let adopted: Vec<TaskId> = registry
                .ids()
                .iter()
                .copied()
                .filter(|child| {
                    !task.children.contains(child)
                        && registry.get(*child).is_some_and(|c| c.parent == Some(id))
                })
                .collect();
            task.children.extend(adopted);

            if !task.children.is_empty() && !task.is_group() {
                return Err(TaskError::InvalidGraph {
                    id,
                    reason: "a task running an operation cannot own children".into(),
                }
                .into());
            }
            for child in &task.children {
                let entry = registry
                    .get(*child)
                    .ok_or_else(|| Error::task_not_found(*child))?;
                if entry.parent != Some(id) {
                    return Err(TaskError::InvalidGraph {
                        id,
                        reason: format!("task {child} names a different parent"),
                    }
                    .into());
                }
            }

            if let Some(parent_id) = task.parent
                && let Some(parent) = registry.get_mut(parent_id)
            {
                if !parent.work.is_group() {
                    return Err(TaskError::InvalidGraph {
                        id,
                        reason: format!("parent {parent_id} cannot own children"),
                    }
                    .into());
                }
                match parent.status {
                    Status::Pending => {
                        if !parent.children.contains(&id) {
                            parent.children.push(id);
                        }
                    }
                    current if current.is_terminal() => {
                        return Err(TaskError::AlreadyTerminal {
                            id: parent_id,
                            operation: "attach child to".into(),
                            current,
                        }
                        .into());
                    }
                    current => {
                        return Err(TaskError::InvalidTransition {
                            id: parent_id,
                            operation: "attach child to".into(),
                            current,
                        }
                        .into());
                    }
                }
            }

            tracing::info!(
                task_id = %id,
                name = %task.name,
                kind = ?task.kind,
                children = task.children.len(),
                start,
                "task registered"
            );
            let cancel = self.shutdown_token.child_token();
            registry.insert(TaskEntry::from_task(task, start, cancel));
        }

        if start {
            self.pump().await;
        }
        Ok(id)
    }

    /// Snapshot of every task in insertion order
    pub async fn list(&self) -> Vec<TaskInfo> {
        self.registry.lock().await.list()
    }

    /// Snapshot of one task
    pub async fn get(&self, id: TaskId) -> Result<TaskInfo> {
        self.registry
            .lock()
            .await
            .get(id)
            .map(TaskEntry::info)
            .ok_or_else(|| Error::task_not_found(id))
    }

    /// Number of tasks per status
    pub async fn counts(&self) -> StatusCounts {
        self.registry.lock().await.counts()
    }

    /// Whether new tasks are being accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}
