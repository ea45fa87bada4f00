//! Configuration types for livetools-tasks

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Task queue behavior (concurrency budget, event buffering)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Maximum leaf tasks running at once (default: 3)
    ///
    /// Group tasks coordinate their children and do not hold a slot.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Capacity of the broadcast event channel (default: 1000)
    ///
    /// Subscribers that fall further behind than this skip the oldest events.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Deferred comment queue timing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommentConfig {
    /// Time between ticks (default: 600 seconds)
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// How long an item may wait for approval before it is failed (default: 24 hours)
    #[serde(default = "default_staleness_window", with = "duration_serde")]
    pub staleness_window: Duration,

    /// Wait between posting a comment and pinning it (default: 3 seconds)
    #[serde(default = "default_pin_settle_delay", with = "duration_serde")]
    pub pin_settle_delay: Duration,

    /// Number of most recent submissions inspected per account (default: 20)
    #[serde(default = "default_archive_page_size")]
    pub archive_page_size: u32,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            staleness_window: default_staleness_window(),
            pin_settle_delay: default_pin_settle_delay(),
            archive_page_size: default_archive_page_size(),
        }
    }
}

/// Main configuration for the task engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Task queue settings
    #[serde(default)]
    pub tasks: TaskConfig,

    /// Comment queue settings
    #[serde(default)]
    pub comments: CommentConfig,
}

impl Config {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tasks.max_concurrent_tasks == 0 {
            return Err(Error::Config {
                message: "max_concurrent_tasks must be at least 1".into(),
                key: Some("max_concurrent_tasks".into()),
            });
        }
        if self.tasks.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".into(),
                key: Some("event_buffer".into()),
            });
        }
        if self.comments.check_interval.is_zero() {
            return Err(Error::Config {
                message: "check_interval must be positive".into(),
                key: Some("check_interval".into()),
            });
        }
        if self.comments.archive_page_size == 0 {
            return Err(Error::Config {
                message: "archive_page_size must be at least 1".into(),
                key: Some("archive_page_size".into()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_event_buffer() -> usize {
    1000
}

fn default_check_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_staleness_window() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_pin_settle_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_archive_page_size() -> u32 {
    20
}

// Duration serialization helper (seconds as u64)
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
