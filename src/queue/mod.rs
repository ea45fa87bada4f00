//! Task registry and scheduler split into focused submodules.
//!
//! The `TaskQueue` struct and its methods are organized by domain:
//! - [`registry`] - Flat id -> entry arena with insertion order
//! - [`registration`] - Adding tasks and point-in-time snapshots
//! - [`admission`] - Concurrency budget, admission order and task execution
//! - [`control`] - Pause, resume, interrupt, kill, remove, start
//! - [`lifecycle`] - Shutdown coordination

mod admission;
mod control;
mod lifecycle;
mod registration;
mod registry;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::TaskConfig;
use crate::events::{EventBus, EventFilter, EventSubscription};
use crate::types::{Progress, TaskEvent, TaskId};

use registry::Registry;

/// Central task registry and scheduler (cloneable - all fields are Arc-wrapped)
///
/// Every mutation (registration, state transition, admission) happens under
/// one registry lock held for the transition only, never across a platform
/// call.
#[derive(Clone)]
pub struct TaskQueue {
    /// All registered tasks (protected by Mutex)
    pub(crate) registry: Arc<Mutex<Registry>>,
    /// Lifecycle event publisher
    pub(crate) events: EventBus,
    /// Concurrency budget for leaf tasks (respects max_concurrent_tasks config)
    pub(crate) slots: Arc<Semaphore>,
    /// Flag to indicate whether new tasks are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every task's cancellation token
    pub(crate) shutdown_token: CancellationToken,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<TaskConfig>,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new(config: TaskConfig) -> Self {
        let slots = config.max_concurrent_tasks.max(1);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            events: EventBus::new(config.event_buffer),
            slots: Arc::new(Semaphore::new(slots)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            config: Arc::new(config),
        }
    }

    /// Subscribe to every task event
    ///
    /// Returns a broadcast receiver. Multiple subscribers can exist
    /// simultaneously; each receives all events emitted after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Subscribe to one task and/or one event kind
    pub fn subscribe_to(&self, filter: EventFilter) -> EventSubscription {
        self.events.subscribe_to(filter)
    }

    /// Matching events as a stream
    pub fn event_stream(&self, filter: EventFilter) -> impl Stream<Item = TaskEvent> + use<> {
        self.events.event_stream(filter)
    }

    /// The bus this queue publishes on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Concurrency budget this queue was built with
    pub fn max_concurrent_tasks(&self) -> usize {
        self.config.max_concurrent_tasks.max(1)
    }

    pub(crate) fn reporter(&self, id: TaskId) -> ProgressReporter {
        ProgressReporter {
            id,
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("config", &self.config)
            .field("available_slots", &self.slots.available_permits())
            .finish_non_exhaustive()
    }
}

/// Progress sink handed to a running operation
///
/// Each report replaces the task's stored progress and is published as a
/// `progress` event. Reports arriving after the task ended are dropped, so
/// `progress` never follows `end` or `error`.
#[derive(Clone)]
pub struct ProgressReporter {
    id: TaskId,
    registry: Arc<Mutex<Registry>>,
    events: EventBus,
}

impl ProgressReporter {
    /// Record and publish `progress`
    pub async fn report(&self, progress: Progress) {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.get_mut(self.id) else {
            return;
        };
        if !entry.status.is_active() {
            tracing::trace!(task_id = %self.id, status = %entry.status, "dropping late progress");
            return;
        }
        entry.progress = Some(progress.clone());
        self.events.emit(TaskEvent::Progress {
            id: self.id,
            progress,
        });
    }

    /// Task this reporter belongs to
    pub fn task_id(&self) -> TaskId {
        self.id
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("task_id", &self.id)
            .finish_non_exhaustive()
    }
}
