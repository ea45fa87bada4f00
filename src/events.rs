//! In-process lifecycle event bus
//!
//! Tasks publish `start`, `progress`, `end` and `error` events onto a
//! broadcast channel. Observers (the UI transport, loggers, downstream
//! queues) subscribe to everything or to a filtered slice.
//!
//! Emission never blocks the emitter. A subscriber that falls more than the
//! channel capacity behind loses the oldest events and is told how many it
//! skipped.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::types::{EventKind, TaskEvent, TaskId};

/// Which events a subscriber wants
///
/// `None` on either axis is a wildcard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events for this task
    pub task: Option<TaskId>,
    /// Only events of this kind
    pub kind: Option<EventKind>,
}

impl EventFilter {
    /// Match every event
    pub fn all() -> Self {
        Self::default()
    }

    /// Match every event of one task
    pub fn task(id: TaskId) -> Self {
        Self {
            task: Some(id),
            kind: None,
        }
    }

    /// Match one kind of event across all tasks
    pub fn kind(kind: EventKind) -> Self {
        Self {
            task: None,
            kind: Some(kind),
        }
    }

    /// Narrow to one kind
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Whether an event passes the filter
    pub fn matches(&self, event: &TaskEvent) -> bool {
        self.task.is_none_or(|id| event.task_id() == id)
            && self.kind.is_none_or(|kind| event.kind() == kind)
    }
}

/// Broadcast publisher shared by the queue and its running tasks
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event
    pub fn emit(&self, event: TaskEvent) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.tx.send(event).ok();
    }

    /// Receive every event
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Receive only events matching `filter`
    pub fn subscribe_to(&self, filter: EventFilter) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    /// Matching events as a stream, for transports that forward them elsewhere
    ///
    /// Lagged gaps are logged and skipped.
    pub fn event_stream(&self, filter: EventFilter) -> impl Stream<Item = TaskEvent> + use<> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |result| match result {
            Ok(event) if filter.matches(&event) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
                None
            }
        })
    }

    /// Run `handler` for each matching event on a background task
    ///
    /// The handler runs after `emit` returns. The task ends when the bus is
    /// dropped or the returned handle is aborted.
    pub fn on<F>(&self, filter: EventFilter, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(TaskEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe_to(filter);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        })
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Filtered receiver returned by [`EventBus::subscribe_to`]
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<TaskEvent>,
    filter: EventFilter,
}

impl EventSubscription {
    /// Next matching event, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already buffered
    pub fn try_recv(&mut self) -> Option<TaskEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}
