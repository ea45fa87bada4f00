//! Admission and execution: picks eligible tasks, runs leaf operations and
//! coordinates groups.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{OwnedSemaphorePermit, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, PlatformError, Result, TaskError};
use crate::platform::{Operation, OperationContext};
use crate::task::{GroupFinalizer, Work};
use crate::types::{Status, TaskEvent, TaskId};

use super::TaskQueue;
use super::registry::Registry;

/// Work admitted under the lock, started after it is released
enum Launch {
    Leaf {
        id: TaskId,
        operation: Arc<dyn Operation>,
        cancel: CancellationToken,
    },
    Group {
        id: TaskId,
        children: Vec<(TaskId, Option<watch::Receiver<Status>>)>,
        finalizer: Option<Arc<dyn GroupFinalizer>>,
        cancel: CancellationToken,
    },
}

impl TaskQueue {
    /// Admit every task that can run now and start it
    ///
    /// Called whenever something may have changed eligibility: a task was
    /// added or started, a slot was freed, or a group began running.
    pub(crate) async fn pump(&self) {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return;
        }

        let launches = {
            let mut registry = self.registry.lock().await;
            self.admit(&mut registry)
        };

        for launch in launches {
            self.launch(launch);
        }
    }

    /// FIFO pass over the registry
    ///
    /// Repeats until nothing new is admitted, since starting a group makes
    /// its (earlier-registered) children eligible. Leaves take a slot from
    /// the semaphore; groups do not.
    fn admit(&self, registry: &mut Registry) -> Vec<Launch> {
        let mut launches = Vec::new();

        loop {
            let candidates: Vec<TaskId> = registry
                .ids()
                .iter()
                .copied()
                .filter(|id| registry.is_eligible(*id))
                .collect();

            let mut admitted = false;
            for id in candidates {
                let Some(entry) = registry.get(id) else {
                    continue;
                };

                let (launch, permit): (Launch, Option<OwnedSemaphorePermit>) = match &entry.work {
                    Work::Leaf(operation) => {
                        let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                            tracing::trace!(task_id = %id, "no free slot");
                            continue;
                        };
                        let launch = Launch::Leaf {
                            id,
                            operation: Arc::clone(operation),
                            cancel: entry.cancel.clone(),
                        };
                        (launch, Some(permit))
                    }
                    Work::Group(finalizer) => {
                        let children = entry
                            .children
                            .iter()
                            .map(|child| {
                                let rx = registry.get(*child).map(|c| c.status_tx.subscribe());
                                (*child, rx)
                            })
                            .collect();
                        let launch = Launch::Group {
                            id,
                            children,
                            finalizer: finalizer.clone(),
                            cancel: entry.cancel.clone(),
                        };
                        (launch, None)
                    }
                };

                if let Some(entry) = registry.get_mut(id) {
                    entry.permit = permit;
                    entry.set_status(Status::Running);
                    self.events.emit(TaskEvent::Start {
                        id,
                        command: entry.name.clone(),
                    });
                    tracing::debug!(task_id = %id, name = %entry.name, "task admitted");
                    launches.push(launch);
                    admitted = true;
                }
            }

            if !admitted {
                return launches;
            }
        }
    }

    fn launch(&self, launch: Launch) {
        let queue = self.clone();
        match launch {
            Launch::Leaf {
                id,
                operation,
                cancel,
            } => {
                let ctx = OperationContext {
                    task_id: id,
                    progress: self.reporter(id),
                    cancel,
                };
                tokio::spawn(async move {
                    let running = tokio::spawn(async move { operation.run(ctx).await });
                    let result = match running.await {
                        Ok(result) => result.map_err(Error::from),
                        Err(e) => {
                            tracing::error!(task_id = %id, error = %e, "operation panicked");
                            Err(PlatformError::Request(format!("operation panicked: {e}")).into())
                        }
                    };
                    queue.finish(id, result).await;
                });
            }
            Launch::Group {
                id,
                children,
                finalizer,
                cancel,
            } => {
                tokio::spawn(async move {
                    queue.coordinate(id, children, finalizer, cancel).await;
                });
            }
        }
    }

    /// Wait for a group's children and derive its outcome
    ///
    /// The first child to end in anything but `completed` fails the group.
    /// Siblings already in flight keep running.
    async fn coordinate(
        &self,
        id: TaskId,
        children: Vec<(TaskId, Option<watch::Receiver<Status>>)>,
        finalizer: Option<Arc<dyn GroupFinalizer>>,
        cancel: CancellationToken,
    ) {
        let child_ids: Vec<TaskId> = children.iter().map(|(child, _)| *child).collect();

        let mut waiting: FuturesUnordered<_> = children
            .into_iter()
            .map(|(child, rx)| async move {
                let status = match rx {
                    Some(mut rx) => rx
                        .wait_for(Status::is_terminal)
                        .await
                        .map(|status| *status)
                        .unwrap_or(Status::Interrupted),
                    None => Status::Interrupted,
                };
                (child, status)
            })
            .collect();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                next = waiting.next() => match next {
                    Some((_, Status::Completed)) => {}
                    Some((child, child_status)) => {
                        tracing::debug!(task_id = %id, child = %child, %child_status, "child did not complete");
                        let failure = TaskError::DependencyFailure { child, child_status };
                        self.finish(id, Err(failure.into())).await;
                        return;
                    }
                    None => break,
                },
            }
        }

        let outputs: Vec<serde_json::Value> = {
            let registry = self.registry.lock().await;
            child_ids
                .iter()
                .map(|child| {
                    registry
                        .get(*child)
                        .and_then(|entry| entry.output.clone())
                        .unwrap_or(serde_json::Value::Null)
                })
                .collect()
        };

        let result = match finalizer {
            Some(finalizer) => {
                let mut finalizing =
                    tokio::spawn(async move { finalizer.finalize(outputs).await });
                tokio::select! {
                    _ = cancel.cancelled() => {
                        finalizing.abort();
                        return;
                    }
                    joined = &mut finalizing => match joined {
                        Ok(result) => result.map_err(Error::from),
                        Err(e) => {
                            tracing::error!(task_id = %id, error = %e, "group finalizer panicked");
                            Err(PlatformError::Request(format!("finalizer panicked: {e}")).into())
                        }
                    },
                }
            }
            None => Ok(serde_json::Value::Array(outputs)),
        };
        self.finish(id, result).await;
    }

    /// Record a task's outcome, run its hook and admit whatever can run next
    ///
    /// Results for tasks that were interrupted or removed meanwhile are
    /// dropped. A paused task keeps its result parked until it is resumed.
    pub(crate) async fn finish(&self, id: TaskId, result: Result<serde_json::Value>) {
        let hook = {
            let mut registry = self.registry.lock().await;
            let Some(entry) = registry.get_mut(id) else {
                tracing::debug!(task_id = %id, "dropping result of removed task");
                return;
            };
            if entry.status.is_terminal() {
                tracing::debug!(task_id = %id, status = %entry.status, "dropping result of terminated task");
                return;
            }
            if entry.status == Status::Paused {
                tracing::debug!(task_id = %id, "task paused, holding its result until resume");
                entry.parked = Some(result);
                return;
            }

            match result {
                Ok(output) => {
                    entry.output = Some(output.clone());
                    entry.set_status(Status::Completed);
                    self.events.emit(TaskEvent::End {
                        id,
                        output: output.clone(),
                    });
                    tracing::info!(task_id = %id, name = %entry.name, "task completed");
                    entry.hook.clone().map(|hook| (hook, output))
                }
                Err(e) => {
                    let message = e.to_string();
                    entry.error = Some(message.clone());
                    entry.set_status(Status::Error);
                    self.events.emit(TaskEvent::Error { id, error: message });
                    tracing::warn!(task_id = %id, name = %entry.name, error = %e, "task failed");
                    None
                }
            }
        };

        if let Some((hook, output)) = hook
            && let Err(e) = hook.on_complete(id, &output).await
        {
            tracing::warn!(task_id = %id, error = %e, "completion hook failed");
        }

        self.pump().await;
    }
}
