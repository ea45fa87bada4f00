//! # livetools-tasks
//!
//! Task orchestration for a live-stream recording toolkit: multi-part
//! uploads, submission edits, downloads and delayed follow-up comments run
//! as supervised tasks with lifecycle control, parent/child composition
//! and progress events.
//!
//! ## Pieces
//!
//! - [`TaskQueue`] - registry, concurrency budget and lifecycle control
//! - [`EventBus`] - `start`/`progress`/`end`/`error` fan-out with filters
//! - [`CommentQueue`] - posts comments once their submission is approved
//! - [`Engine`] - one context object owning all of the above plus the
//!   platform client and settings store
//!
//! ## Quick Start
//!
//! ```no_run
//! use livetools_tasks::{Config, Engine, EventFilter, MemoryStore, UploadOptions};
//! use livetools_tasks::platform::{CommentPlatform, MediaPlatform, PartSource};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     media: Arc<dyn MediaPlatform>,
//! #     comments: Arc<dyn CommentPlatform>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = Engine::new(Config::default(), store, media, comments)?;
//! engine.start_comment_queue().await;
//!
//! let mut events = engine.queue().subscribe_to(EventFilter::all());
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let options = UploadOptions {
//!     title: "Evening stream".into(),
//!     tag: vec!["live".into()],
//!     ..Default::default()
//! };
//! let parts = vec![PartSource::from_path("/records/part1.flv")];
//! let id = engine.submit_media(parts, options, Some(10086)).await?;
//! println!("submission task {id}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Time source for the comment queue
pub mod clock;
/// Deferred, approval-gated comment posting
pub mod comment_queue;
/// Configuration types
pub mod config;
/// Composition root and task graph initiators
pub mod engine;
/// Error types
pub mod error;
/// Event bus and subscription filters
pub mod events;
/// Upload options and their platform request shape
pub mod media;
/// External platform boundary
pub mod platform;
/// Task registry, scheduling and lifecycle control
pub mod queue;
/// Key/value settings store
pub mod store;
/// Task construction
pub mod task;
/// Core types (ids, statuses, events)
pub mod types;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use comment_queue::{CommentItem, CommentQueue, CommentStatus, NewComment};
pub use config::{CommentConfig, Config, TaskConfig};
pub use engine::Engine;
pub use error::{CommentError, Error, ErrorDetail, PlatformError, Result, TaskError};
pub use events::{EventBus, EventFilter, EventSubscription};
pub use media::{MediaOptions, UploadOptions};
pub use queue::{ProgressReporter, TaskQueue};
pub use store::{ConfigStore, JsonFileStore, MemoryStore};
pub use task::{CompletionHook, GroupFinalizer, Task};
pub use types::{
    EventKind, Progress, Status, StatusCounts, TaskEvent, TaskId, TaskInfo, TaskKind,
};

/// Run the engine until a termination signal arrives, then shut it down.
///
/// - **Unix:** SIGTERM or SIGINT; if only one handler can be registered the
///   other is skipped, and if neither can, Ctrl+C is used.
/// - **Elsewhere:** Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use livetools_tasks::{Engine, run_with_shutdown};
///
/// # async fn example(engine: Engine) {
/// engine.start_comment_queue().await;
/// run_with_shutdown(engine).await;
/// # }
/// ```
pub async fn run_with_shutdown(engine: Engine) {
    wait_for_signal().await;
    engine.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register every signal handler, waiting on the other");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
