//! Deferred comment queue
//!
//! Holds follow-up comments for submissions that are still in moderation.
//! A periodic check asks the platform which submissions have been approved,
//! posts (and optionally pins) each waiting comment once its submission is
//! live, and gives up on items that stay unapproved past the staleness
//! window.
//!
//! # Features
//!
//! - Dedup by submission id (first add wins)
//! - One approval query per account per check
//! - At most one posting attempt per item
//! - Checks never overlap, and a panicking check does not stop the loop
//!
//! # Example
//!
//! ```no_run
//! use livetools_tasks::comment_queue::{CommentQueue, NewComment};
//! use livetools_tasks::config::CommentConfig;
//! use livetools_tasks::platform::CommentPlatform;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(platform: Arc<dyn CommentPlatform>) {
//! let config = CommentConfig::default();
//! let interval = config.check_interval;
//! let queue = CommentQueue::new(platform, config);
//! queue
//!     .add(NewComment {
//!         aid: 170001,
//!         uid: 10086,
//!         content: "Timestamps in the first reply".into(),
//!         top: true,
//!     })
//!     .await;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(queue.clone().run(interval, shutdown.clone()));
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CommentConfig;
use crate::error::{CommentError, PlatformError, Result};
use crate::platform::CommentPlatform;

/// Comment item status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    /// Waiting for the submission to be approved
    Pending,
    /// Posted (and pinned, if asked)
    Completed,
    /// Expired or failed; never retried
    Error,
}

/// Comment to post once a submission is approved
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    /// Submission id; also the dedup key
    pub aid: u64,
    /// Account that owns the submission and posts the comment
    pub uid: u64,
    /// Comment text
    pub content: String,
    /// Pin after posting
    pub top: bool,
}

/// Queued comment and its progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommentItem {
    /// Submission id
    pub aid: u64,
    /// Posting account
    pub uid: u64,
    /// Comment text
    pub content: String,
    /// Pin after posting
    pub top: bool,
    /// Current status
    pub status: CommentStatus,
    /// When the item was queued
    pub start_time: DateTime<Utc>,
    /// Last check that saw the item pending
    pub update_time: DateTime<Utc>,
    /// Reply id once posted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpid: Option<u64>,
    /// Why the item failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What one check did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Items forced to error by the staleness window
    pub expired: usize,
    /// Items whose comment was attempted
    pub attempted: usize,
    /// Attempts that succeeded
    pub completed: usize,
    /// Attempts that failed
    pub failed: usize,
}

/// Precondition-gated comment poster (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct CommentQueue {
    items: Arc<Mutex<Vec<CommentItem>>>,
    platform: Arc<dyn CommentPlatform>,
    clock: Arc<dyn Clock>,
    config: Arc<CommentConfig>,
    /// Serializes checks
    tick: Arc<Mutex<()>>,
}

impl CommentQueue {
    /// Queue using the system clock
    pub fn new(platform: Arc<dyn CommentPlatform>, config: CommentConfig) -> Self {
        Self::with_clock(platform, config, Arc::new(SystemClock))
    }

    /// Queue reading time from `clock`
    pub fn with_clock(
        platform: Arc<dyn CommentPlatform>,
        config: CommentConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            platform,
            clock,
            config: Arc::new(config),
            tick: Arc::new(Mutex::new(())),
        }
    }

    /// Queue a comment
    ///
    /// Returns `false` without touching the existing item when one is
    /// already queued for the same submission.
    pub async fn add(&self, comment: NewComment) -> bool {
        let mut items = self.items.lock().await;
        if items.iter().any(|item| item.aid == comment.aid) {
            debug!(aid = comment.aid, "comment already queued");
            return false;
        }

        let now = self.clock.now();
        info!(aid = comment.aid, uid = comment.uid, top = comment.top, "comment queued");
        items.push(CommentItem {
            aid: comment.aid,
            uid: comment.uid,
            content: comment.content,
            top: comment.top,
            status: CommentStatus::Pending,
            start_time: now,
            update_time: now,
            rpid: None,
            error: None,
        });
        true
    }

    /// Snapshot of every item in insertion order
    pub async fn items(&self) -> Vec<CommentItem> {
        self.items.lock().await.clone()
    }

    /// Snapshot of the item for one submission
    pub async fn get(&self, aid: u64) -> Result<CommentItem> {
        self.items
            .lock()
            .await
            .iter()
            .find(|item| item.aid == aid)
            .cloned()
            .ok_or_else(|| CommentError::NotFound { aid }.into())
    }

    /// Items still waiting
    pub async fn pending_count(&self) -> usize {
        self.items
            .lock()
            .await
            .iter()
            .filter(|item| item.status == CommentStatus::Pending)
            .count()
    }

    /// Run one check
    ///
    /// 1. Stamps every pending item's `update_time`
    /// 2. Fails items older than the staleness window, before looking at approval
    /// 3. Queries approved submissions once per account with pending items
    /// 4. Posts, waits the settle delay and pins (if asked) for each approved item
    ///
    /// The items lock is never held across a platform call.
    pub async fn check(&self) -> CheckReport {
        let _tick = self.tick.lock().await;
        let mut report = CheckReport::default();
        let window_secs = self.config.staleness_window.as_secs();
        let window = chrono::Duration::from_std(self.config.staleness_window)
            .unwrap_or(chrono::Duration::MAX);

        let owners = {
            let now = self.clock.now();
            let mut items = self.items.lock().await;
            let mut owners: Vec<u64> = Vec::new();
            for item in items
                .iter_mut()
                .filter(|item| item.status == CommentStatus::Pending)
            {
                item.update_time = now;
                if item.update_time - item.start_time > window {
                    let expired = CommentError::PreconditionTimeout {
                        aid: item.aid,
                        window_secs,
                    };
                    warn!(aid = item.aid, uid = item.uid, error = %expired, "comment expired");
                    item.status = CommentStatus::Error;
                    item.error = Some(expired.to_string());
                    report.expired += 1;
                    continue;
                }
                if !owners.contains(&item.uid) {
                    owners.push(item.uid);
                }
            }
            owners
        };

        if owners.is_empty() {
            return report;
        }

        let mut approved: HashSet<u64> = HashSet::new();
        for uid in owners {
            match self
                .platform
                .approved_submissions(uid, self.config.archive_page_size)
                .await
            {
                Ok(aids) => approved.extend(aids),
                Err(e) => warn!(uid, error = %e, "failed to list approved submissions"),
            }
        }

        let due: Vec<CommentItem> = self
            .items
            .lock()
            .await
            .iter()
            .filter(|item| item.status == CommentStatus::Pending && approved.contains(&item.aid))
            .cloned()
            .collect();

        for item in due {
            report.attempted += 1;
            let outcome = self.deliver(&item).await;

            let mut items = self.items.lock().await;
            let Some(entry) = items.iter_mut().find(|entry| entry.aid == item.aid) else {
                continue;
            };
            match outcome {
                Ok(rpid) => {
                    info!(aid = item.aid, rpid, "comment posted");
                    entry.status = CommentStatus::Completed;
                    entry.rpid = Some(rpid);
                    report.completed += 1;
                }
                Err(e) => {
                    error!(aid = item.aid, uid = item.uid, error = %e, "failed to post comment");
                    entry.status = CommentStatus::Error;
                    entry.error = Some(e.to_string());
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn deliver(&self, item: &CommentItem) -> std::result::Result<u64, PlatformError> {
        let rpid = self
            .platform
            .post_comment(item.uid, item.aid, &item.content)
            .await?;
        if item.top {
            tokio::time::sleep(self.config.pin_settle_delay).await;
            self.platform.pin_comment(item.uid, item.aid, rpid).await?;
        }
        Ok(rpid)
    }

    /// Check now, then every `interval`, until `shutdown` fires
    ///
    /// Each check runs on its own task, so a panic inside it is logged and
    /// the next check still happens.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Comment queue started");

        loop {
            let queue = self.clone();
            match tokio::spawn(async move { queue.check().await }).await {
                Ok(report) if report != CheckReport::default() => {
                    debug!(
                        expired = report.expired,
                        attempted = report.attempted,
                        completed = report.completed,
                        failed = report.failed,
                        "Comment check finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Comment check aborted"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Comment queue shutting down");
    }
}

impl std::fmt::Debug for CommentQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
