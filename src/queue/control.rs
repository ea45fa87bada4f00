//! Task lifecycle control: pause, resume, interrupt, kill, remove and start.

use std::sync::atomic::Ordering;

use crate::error::{Error, Result, TaskError};
use crate::events::EventBus;
use crate::task::Work;
use crate::types::{Status, TaskEvent, TaskId};

use super::TaskQueue;
use super::registry::{Registry, TaskEntry};

/// Failure reason recorded on interrupted tasks
pub(crate) const INTERRUPTED: &str = "interrupted";

/// Reject `operation` unless the task is in one of `allowed`
///
/// Terminal tasks get [`TaskError::AlreadyTerminal`], everything else
/// [`TaskError::InvalidTransition`].
fn ensure_status(entry: &TaskEntry, operation: &str, allowed: &[Status]) -> Result<()> {
    if allowed.contains(&entry.status) {
        return Ok(());
    }
    let current = entry.status;
    let error = if current.is_terminal() {
        TaskError::AlreadyTerminal {
            id: entry.id,
            operation: operation.to_string(),
            current,
        }
    } else {
        TaskError::InvalidTransition {
            id: entry.id,
            operation: operation.to_string(),
            current,
        }
    };
    Err(error.into())
}

/// Force a non-terminal entry to `interrupted`
///
/// Fires the cancellation token, asks an in-flight operation to stop, frees
/// the slot and wakes any parent waiting on this task.
pub(crate) fn interrupt_entry(entry: &mut TaskEntry, events: &EventBus) {
    let was_active = entry.status.is_active();
    entry.error = Some(INTERRUPTED.to_string());
    entry.parked = None;
    entry.set_status(Status::Interrupted);
    entry.cancel.cancel();
    if was_active && let Work::Leaf(operation) = &entry.work {
        operation.cancel();
    }
    events.emit(TaskEvent::Error {
        id: entry.id,
        error: INTERRUPTED.to_string(),
    });
}

/// Fail every running ancestor of a task that just ended unsuccessfully
///
/// Runs under the same lock as the child's transition, so the parent is
/// terminal before the caller returns. The group's own watcher later finds
/// it terminal and drops its result.
fn fail_ancestors(registry: &mut Registry, id: TaskId, events: &EventBus) {
    let Some(mut child_status) = registry.get(id).map(|entry| entry.status) else {
        return;
    };
    let mut child = id;
    while let Some(parent_id) = registry.get(child).and_then(|entry| entry.parent) {
        let Some(parent) = registry.get_mut(parent_id) else {
            break;
        };
        if !parent.status.is_active() {
            break;
        }

        let message = Error::from(TaskError::DependencyFailure {
            child,
            child_status,
        })
        .to_string();
        parent.error = Some(message.clone());
        parent.set_status(Status::Error);
        parent.cancel.cancel();
        events.emit(TaskEvent::Error {
            id: parent_id,
            error: message,
        });
        tracing::warn!(task_id = %parent_id, child = %child, %child_status, "parent failed by child");

        child = parent_id;
        child_status = Status::Error;
    }
}

impl TaskQueue {
    /// Ask a running task to suspend
    ///
    /// Returns `Ok(true)` if the operation accepted and the task is now
    /// `paused`, or `Ok(false)` if the operation cannot suspend and the task
    /// keeps running. Groups never suspend. A paused task keeps its
    /// concurrency slot.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The task doesn't exist
    /// - The task is not running (already terminal, pending or paused)
    pub async fn pause(&self, id: TaskId) -> Result<bool> {
        let mut registry = self.registry.lock().await;
        let entry = registry
            .get_mut(id)
            .ok_or_else(|| Error::task_not_found(id))?;
        ensure_status(entry, "pause", &[Status::Running])?;

        let accepted = match &entry.work {
            Work::Leaf(operation) => operation.pause(),
            Work::Group(_) => false,
        };
        if accepted {
            entry.set_status(Status::Paused);
            tracing::info!(task_id = %id, "task paused");
        } else {
            tracing::debug!(task_id = %id, "operation cannot suspend, still running");
        }
        Ok(accepted)
    }

    /// Resume a paused task
    ///
    /// An outcome the operation produced while paused is applied now.
    ///
    /// # Errors
    ///
    /// Returns an error if the task doesn't exist or is not paused.
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        let parked = {
            let mut registry = self.registry.lock().await;
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| Error::task_not_found(id))?;
            ensure_status(entry, "resume", &[Status::Paused])?;

            if let Work::Leaf(operation) = &entry.work {
                operation.resume();
            }
            entry.set_status(Status::Running);
            tracing::info!(task_id = %id, "task resumed");
            entry.parked.take()
        };

        if let Some(result) = parked {
            self.finish(id, result).await;
        }
        Ok(())
    }

    /// Interrupt one task
    ///
    /// The task ends `interrupted` and emits `error`; a running parent fails
    /// at once with [`TaskError::DependencyFailure`]. Children are left
    /// alone (see [`kill`](Self::kill)).
    /// Cancellation of the underlying call is best-effort and not awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if the task doesn't exist or is already terminal.
    pub async fn interrupt(&self, id: TaskId) -> Result<()> {
        {
            let mut registry = self.registry.lock().await;
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| Error::task_not_found(id))?;
            ensure_status(
                entry,
                "interrupt",
                &[Status::Pending, Status::Running, Status::Paused],
            )?;
            interrupt_entry(entry, &self.events);
            fail_ancestors(&mut registry, id, &self.events);
            tracing::info!(task_id = %id, "task interrupted");
        }

        // A slot may have been freed
        self.pump().await;
        Ok(())
    }

    /// Interrupt a task and every unfinished task below it
    ///
    /// A running parent of `id` fails at once, as with
    /// [`interrupt`](Self::interrupt).
    ///
    /// # Errors
    ///
    /// Returns an error if the task doesn't exist or is already terminal.
    pub async fn kill(&self, id: TaskId) -> Result<()> {
        {
            let mut registry = self.registry.lock().await;
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| Error::task_not_found(id))?;
            ensure_status(
                entry,
                "kill",
                &[Status::Pending, Status::Running, Status::Paused],
            )?;

            // Parent first, so it ends interrupted rather than failing on its children
            interrupt_entry(entry, &self.events);
            let mut killed = 1usize;
            for descendant in registry.descendants(id) {
                if let Some(entry) = registry.get_mut(descendant)
                    && !entry.status.is_terminal()
                {
                    interrupt_entry(entry, &self.events);
                    killed += 1;
                }
            }
            fail_ancestors(&mut registry, id, &self.events);
            tracing::info!(task_id = %id, killed, "task killed");
        }

        self.pump().await;
        Ok(())
    }

    /// Remove a task and its descendants from the registry
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The task doesn't exist
    /// - The task or one of its descendants is running or paused (kill it first)
    /// - The task belongs to a parent that is still running
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let entry = registry.get(id).ok_or_else(|| Error::task_not_found(id))?;
        let parent_id = entry.parent;
        let status = entry.status;

        let mut doomed = vec![id];
        doomed.extend(registry.descendants(id));
        for task in &doomed {
            if let Some(entry) = registry.get(*task)
                && entry.status.is_active()
            {
                return Err(TaskError::StillRunning {
                    id: *task,
                    current: entry.status,
                }
                .into());
            }
        }

        // A running group's children are fixed
        if let Some(parent_id) = parent_id
            && let Some(parent) = registry.get_mut(parent_id)
        {
            if parent.status.is_active() {
                return Err(TaskError::InvalidTransition {
                    id,
                    operation: "remove".into(),
                    current: status,
                }
                .into());
            }
            parent.children.retain(|child| *child != id);
        }

        for task in &doomed {
            if let Some(entry) = registry.remove(*task) {
                entry.cancel.cancel();
            }
        }
        tracing::info!(task_id = %id, removed = doomed.len(), "task removed");
        Ok(())
    }

    /// Schedule a task that was added with `start = false`
    ///
    /// A child still waits for its parent to be running.
    ///
    /// # Errors
    ///
    /// Returns an error if the task doesn't exist or is not pending, or the
    /// queue is shutting down.
    pub async fn start(&self, id: TaskId) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        {
            let mut registry = self.registry.lock().await;
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| Error::task_not_found(id))?;
            ensure_status(entry, "start", &[Status::Pending])?;
            entry.scheduled = true;
            tracing::debug!(task_id = %id, "task scheduled");
        }

        self.pump().await;
        Ok(())
    }
}
