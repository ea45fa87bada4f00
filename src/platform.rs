//! Boundary with the external platform client
//!
//! The engine never talks to the network itself. Everything it runs is an
//! [`Operation`] handed out by a [`MediaPlatform`], and the comment queue's
//! side effects go through a [`CommentPlatform`]. Retries, auth cookies and
//! chunking live behind these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::PlatformError;
use crate::media::MediaOptions;
use crate::queue::ProgressReporter;
use crate::types::TaskId;

/// Handed to an operation when its task is admitted
#[derive(Clone, Debug)]
pub struct OperationContext {
    /// Task running the operation
    pub task_id: TaskId,
    /// Progress sink; reports become `progress` events
    pub progress: ProgressReporter,
    /// Fired when the task is killed, interrupted or the engine shuts down
    pub cancel: CancellationToken,
}

/// One long-running platform call
///
/// `run` resolves with a JSON payload that becomes the task's output.
/// Suspension and cancellation are cooperative: the default methods do
/// nothing, and `pause` reports `false` when the call cannot suspend.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Perform the call
    async fn run(&self, ctx: OperationContext) -> Result<serde_json::Value, PlatformError>;

    /// Ask the call to suspend at its next suspension point
    ///
    /// Returns whether suspension was accepted.
    fn pause(&self) -> bool {
        false
    }

    /// Continue after a successful `pause`
    fn resume(&self) {}

    /// Best-effort stop; the cancellation token has already fired
    fn cancel(&self) {}
}

/// File to upload as one part of a submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSource {
    /// Local file
    pub path: PathBuf,
    /// Part title; defaults to the file stem
    pub title: Option<String>,
}

impl PartSource {
    /// Part with its title taken from the file stem
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            title: None,
        }
    }

    /// Title shown on the part
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => self
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Output of a finished part upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    /// Content id assigned by the platform
    pub cid: u64,
    /// Server-side file name
    pub filename: String,
    /// Part title
    pub title: String,
}

/// Identifiers of a created or edited submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Numeric submission id
    pub aid: u64,
    /// Public video id
    pub bvid: String,
}

/// Published video to fetch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Public video id
    pub bvid: String,
    /// Content id of the part to fetch
    pub cid: u64,
    /// Destination file
    pub output: PathBuf,
}

impl DownloadRequest {
    /// File stem of the destination, used as the task name
    pub fn display_name(&self) -> String {
        self.output
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.bvid.clone())
    }
}

/// Entry added to a collection section
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonEpisode {
    /// Submission id
    pub aid: u64,
    /// Content id of its only part
    pub cid: u64,
    /// Episode title
    pub title: String,
}

/// Upload, edit and download calls for one platform
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Operation uploading one file; its output is an [`UploadedPart`]
    fn upload_part(&self, uid: u64, part: PartSource) -> Arc<dyn Operation>;

    /// Operation fetching a published video to disk
    fn download(&self, uid: u64, request: DownloadRequest) -> Arc<dyn Operation>;

    /// Create a submission from uploaded parts
    async fn add_media(
        &self,
        uid: u64,
        parts: Vec<UploadedPart>,
        options: MediaOptions,
    ) -> Result<Submission, PlatformError>;

    /// Append uploaded parts to an existing submission
    async fn edit_media(
        &self,
        uid: u64,
        aid: u64,
        parts: Vec<UploadedPart>,
        options: MediaOptions,
    ) -> Result<Submission, PlatformError>;

    /// Content ids of a submission's parts
    async fn archive_parts(&self, uid: u64, aid: u64) -> Result<Vec<u64>, PlatformError>;

    /// First section of a collection, if it has any
    async fn first_section(&self, uid: u64, season_id: u64)
    -> Result<Option<u64>, PlatformError>;

    /// Add a submission to a collection section
    async fn add_to_season(
        &self,
        uid: u64,
        section_id: u64,
        episode: SeasonEpisode,
    ) -> Result<(), PlatformError>;
}

/// Calls behind the deferred comment queue
#[async_trait]
pub trait CommentPlatform: Send + Sync {
    /// Submissions that passed moderation, from the first `page_size` of the account's archive
    async fn approved_submissions(&self, uid: u64, page_size: u32)
    -> Result<Vec<u64>, PlatformError>;

    /// Post a top-level comment, returning its reply id
    async fn post_comment(&self, uid: u64, aid: u64, content: &str) -> Result<u64, PlatformError>;

    /// Pin a reply under a submission
    async fn pin_comment(&self, uid: u64, aid: u64, rpid: u64) -> Result<(), PlatformError>;
}
