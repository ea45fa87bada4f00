//! Shared test helpers: scripted operations and queue builders.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::TaskConfig;
use crate::error::{PlatformError, Result};
use crate::platform::{Operation, OperationContext};
use crate::queue::TaskQueue;
use crate::task::{CompletionHook, Task};
use crate::types::{Progress, Status, TaskId, TaskInfo, TaskKind};

type Outcome = std::result::Result<serde_json::Value, PlatformError>;

/// Queue with the given concurrency budget
pub(crate) fn create_test_queue(max_concurrent_tasks: usize) -> TaskQueue {
    TaskQueue::new(TaskConfig {
        max_concurrent_tasks,
        event_buffer: 256,
    })
}

/// Operation that blocks until its [`Gate`] is opened
pub(crate) struct GatedOperation {
    gate: Mutex<Option<oneshot::Receiver<Outcome>>>,
    pausable: bool,
    progress: Vec<Progress>,
    pub(crate) runs: AtomicUsize,
    pub(crate) pauses: AtomicUsize,
    pub(crate) resumes: AtomicUsize,
    pub(crate) cancels: AtomicUsize,
}

/// Releases a [`GatedOperation`]
pub(crate) struct Gate(oneshot::Sender<Outcome>);

impl Gate {
    pub(crate) fn complete(self, output: serde_json::Value) {
        self.0.send(Ok(output)).ok();
    }

    pub(crate) fn fail(self, message: &str) {
        self.0
            .send(Err(PlatformError::Request(message.to_string())))
            .ok();
    }
}

pub(crate) fn gated(pausable: bool) -> (Arc<GatedOperation>, Gate) {
    gated_with_progress(pausable, Vec::new())
}

/// Gated operation that reports `progress` before waiting
pub(crate) fn gated_with_progress(
    pausable: bool,
    progress: Vec<Progress>,
) -> (Arc<GatedOperation>, Gate) {
    let (tx, rx) = oneshot::channel();
    let operation = GatedOperation {
        gate: Mutex::new(Some(rx)),
        pausable,
        progress,
        runs: AtomicUsize::new(0),
        pauses: AtomicUsize::new(0),
        resumes: AtomicUsize::new(0),
        cancels: AtomicUsize::new(0),
    };
    (Arc::new(operation), Gate(tx))
}

#[async_trait]
impl Operation for GatedOperation {
    async fn run(&self, ctx: OperationContext) -> Outcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        let Some(gate) = gate else {
            return Err(PlatformError::Request("operation ran twice".into()));
        };
        for progress in &self.progress {
            ctx.progress.report(progress.clone()).await;
        }
        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(PlatformError::Cancelled),
            outcome = gate => outcome.unwrap_or_else(|_| Err(PlatformError::Request("gate dropped".into()))),
        }
    }

    fn pause(&self) -> bool {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.pausable
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Operation that resolves immediately
pub(crate) struct InstantOperation(pub(crate) Outcome);

#[async_trait]
impl Operation for InstantOperation {
    async fn run(&self, _ctx: OperationContext) -> Outcome {
        self.0.clone()
    }
}

/// Operation whose run panics
pub(crate) struct PanickingOperation;

#[async_trait]
impl Operation for PanickingOperation {
    async fn run(&self, _ctx: OperationContext) -> Outcome {
        panic!("upload session exploded");
    }
}

/// Leaf task around a gated operation
pub(crate) fn gated_task(name: &str) -> (Task, Arc<GatedOperation>, Gate) {
    let (operation, gate) = gated(false);
    let task = Task::new(name, TaskKind::Generic, operation.clone());
    (task, operation, gate)
}

/// Hook recording the ids it was called with
#[derive(Default)]
pub(crate) struct RecordingHook {
    pub(crate) calls: Mutex<Vec<(TaskId, serde_json::Value)>>,
    pub(crate) fail: bool,
}

#[async_trait]
impl CompletionHook for RecordingHook {
    async fn on_complete(&self, id: TaskId, output: &serde_json::Value) -> Result<()> {
        self.calls.lock().unwrap().push((id, output.clone()));
        if self.fail {
            return Err(crate::error::Error::Other("hook failed".into()));
        }
        Ok(())
    }
}

/// Poll until the task reaches `status`, failing the test after two seconds
pub(crate) async fn wait_for_status(queue: &TaskQueue, id: TaskId, status: Status) -> TaskInfo {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let info = queue.get(id).await.unwrap();
            if info.status == status {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {id} never reached {status}"))
}

/// Current status of a task
pub(crate) async fn status_of(queue: &TaskQueue, id: TaskId) -> Status {
    queue.get(id).await.unwrap().status
}
