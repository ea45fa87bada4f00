//! Application handle tying the task queue, comment queue and platform together.
//!
//! The `Engine` struct and its methods are organized by domain:
//! - [`upload`] - Submission, edit and download task graphs
//! - [`services`] - Background service starters and shutdown

mod services;
mod upload;


use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::comment_queue::CommentQueue;
use crate::config::Config;
use crate::error::Result;
use crate::platform::{CommentPlatform, MediaPlatform};
use crate::queue::TaskQueue;
use crate::store::ConfigStore;

/// Explicit context for everything that used to be process-wide: one task
/// queue, one comment queue, the settings store and the platform client.
///
/// Cloning is cheap; every clone drives the same queues.
#[derive(Clone)]
pub struct Engine {
    pub(crate) config: Arc<Config>,
    pub(crate) queue: TaskQueue,
    pub(crate) comments: CommentQueue,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) media: Arc<dyn MediaPlatform>,
}

impl Engine {
    /// Build an engine
    ///
    /// Nothing runs in the background until
    /// [`start_comment_queue`](Engine::start_comment_queue) is called.
    pub fn new(
        config: Config,
        store: Arc<dyn ConfigStore>,
        media: Arc<dyn MediaPlatform>,
        comment_platform: Arc<dyn CommentPlatform>,
    ) -> Result<Self> {
        Self::with_clock(config, store, media, comment_platform, Arc::new(SystemClock))
    }

    /// Build an engine whose comment queue reads time from `clock`
    pub fn with_clock(
        config: Config,
        store: Arc<dyn ConfigStore>,
        media: Arc<dyn MediaPlatform>,
        comment_platform: Arc<dyn CommentPlatform>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = TaskQueue::new(config.tasks.clone());
        let comments = CommentQueue::with_clock(comment_platform, config.comments.clone(), clock);

        tracing::debug!(
            max_concurrent_tasks = config.tasks.max_concurrent_tasks,
            "engine created"
        );

        Ok(Self {
            config: Arc::new(config),
            queue,
            comments,
            store,
            media,
        })
    }

    /// Task queue
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Deferred comment queue
    pub fn comments(&self) -> &CommentQueue {
        &self.comments
    }

    /// Settings store
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("comments", &self.comments)
            .finish_non_exhaustive()
    }
}
