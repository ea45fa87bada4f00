//! Submission, edit and download task graphs.
//!
//! A submission is a `Submit` group with one `UploadPart` child per file.
//! The children are registered first without being scheduled, then the
//! group is added and started, which releases them. Once every part is
//! uploaded the group's finalizer creates the submission; a completion hook
//! then handles the collection attach and the follow-up comment.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::comment_queue::{CommentQueue, NewComment};
use crate::error::{Error, PlatformError, Result};
use crate::media::{MediaOptions, UploadOptions};
use crate::platform::{
    DownloadRequest, MediaPlatform, PartSource, SeasonEpisode, Submission, UploadedPart,
};
use crate::store::resolve_uid;
use crate::task::{CompletionHook, GroupFinalizer, Task};
use crate::types::{TaskId, TaskKind};

use super::Engine;

/// What the finalizer does with the uploaded parts
enum Publish {
    Create,
    Append { aid: u64 },
}

/// Turns the children's `UploadedPart` outputs into a submission
struct PublishParts {
    media: Arc<dyn MediaPlatform>,
    uid: u64,
    options: MediaOptions,
    publish: Publish,
}

#[async_trait]
impl GroupFinalizer for PublishParts {
    async fn finalize(&self, outputs: Vec<Value>) -> std::result::Result<Value, PlatformError> {
        let parts = outputs
            .into_iter()
            .map(serde_json::from_value::<UploadedPart>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PlatformError::Request(format!("malformed upload result: {e}")))?;

        let submission = match self.publish {
            Publish::Create => {
                self.media
                    .add_media(self.uid, parts, self.options.clone())
                    .await?
            }
            Publish::Append { aid } => {
                self.media
                    .edit_media(self.uid, aid, parts, self.options.clone())
                    .await?
            }
        };

        serde_json::to_value(&submission).map_err(|e| PlatformError::Request(e.to_string()))
    }
}

/// Collection attach and follow-up comment after a submission is created
struct SubmitFollowUp {
    media: Arc<dyn MediaPlatform>,
    comments: CommentQueue,
    uid: u64,
    options: UploadOptions,
}

impl SubmitFollowUp {
    async fn attach_to_season(
        &self,
        season_id: u64,
        submission: &Submission,
    ) -> std::result::Result<(), PlatformError> {
        let cids = self.media.archive_parts(self.uid, submission.aid).await?;
        let [cid] = cids.as_slice() else {
            warn!(
                aid = submission.aid,
                parts = cids.len(),
                "only single-part submissions can join a collection"
            );
            return Ok(());
        };

        let section_id = match self.options.section_id {
            Some(section_id) => section_id,
            None => match self.media.first_section(self.uid, season_id).await? {
                Some(section_id) => section_id,
                None => {
                    warn!(season_id, "collection has no sections");
                    return Ok(());
                }
            },
        };

        self.media
            .add_to_season(
                self.uid,
                section_id,
                SeasonEpisode {
                    aid: submission.aid,
                    cid: *cid,
                    title: self.options.title.clone(),
                },
            )
            .await?;
        debug!(aid = submission.aid, section_id, "submission added to collection");
        Ok(())
    }
}

#[async_trait]
impl CompletionHook for SubmitFollowUp {
    async fn on_complete(&self, id: TaskId, output: &Value) -> Result<()> {
        let submission: Submission = serde_json::from_value(output.clone())?;

        if let Some(season_id) = self.options.season_id
            && let Err(e) = self.attach_to_season(season_id, &submission).await
        {
            error!(task_id = %id, aid = submission.aid, season_id, error = %e, "failed to add submission to collection");
        }

        if let Some((content, top)) = self.options.follow_up_comment() {
            self.comments
                .add(NewComment {
                    aid: submission.aid,
                    uid: self.uid,
                    content: content.to_string(),
                    top,
                })
                .await;
        }
        Ok(())
    }
}

impl Engine {
    /// Upload `parts` and create a submission from them
    ///
    /// Returns the id of the `Submit` group task. `uid` defaults to the
    /// logged-in account in the settings store.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for options the platform would reject or no parts
    /// - [`PlatformError::NotLoggedIn`] when no account is available
    /// - [`Error::ShuttingDown`] after shutdown
    pub async fn submit_media(
        &self,
        parts: Vec<PartSource>,
        options: UploadOptions,
        uid: Option<u64>,
    ) -> Result<TaskId> {
        options.validate()?;
        let uid = resolve_uid(self.store.as_ref(), uid).await?;

        let finalizer = PublishParts {
            media: self.media.clone(),
            uid,
            options: options.format_options(),
            publish: Publish::Create,
        };
        let follow_up = SubmitFollowUp {
            media: self.media.clone(),
            comments: self.comments.clone(),
            uid,
            options: options.clone(),
        };
        let parent = Task::group(
            format!("Create submission: {}", options.title),
            TaskKind::Submit,
            Some(Arc::new(finalizer)),
        )
        .with_hook(Arc::new(follow_up));

        self.publish_group(parent, uid, parts).await
    }

    /// Upload `parts` and append them to submission `aid`
    pub async fn edit_media(
        &self,
        aid: u64,
        parts: Vec<PartSource>,
        options: UploadOptions,
        uid: Option<u64>,
    ) -> Result<TaskId> {
        let uid = resolve_uid(self.store.as_ref(), uid).await?;

        let finalizer = PublishParts {
            media: self.media.clone(),
            uid,
            options: options.format_options(),
            publish: Publish::Append { aid },
        };
        let parent = Task::group(
            format!("Edit submission: {}", options.title),
            TaskKind::Edit,
            Some(Arc::new(finalizer)),
        );

        self.publish_group(parent, uid, parts).await
    }

    /// Fetch a published video to disk, starting immediately
    pub async fn download(&self, request: DownloadRequest, uid: Option<u64>) -> Result<TaskId> {
        let uid = resolve_uid(self.store.as_ref(), uid).await?;
        let name = format!("Download: {}", request.display_name());
        let operation = self.media.download(uid, request);
        self.queue
            .add_task(Task::new(name, TaskKind::Download, operation), true)
            .await
    }

    /// Register one upload child per part, then start `parent`
    async fn publish_group(
        &self,
        mut parent: Task,
        uid: u64,
        parts: Vec<PartSource>,
    ) -> Result<TaskId> {
        if parts.is_empty() {
            return Err(Error::Validation("at least one part is required".into()));
        }

        let children: Vec<Task> = parts
            .into_iter()
            .map(|part| {
                let name = format!("Upload part: {}", part.display_title());
                let operation = self.media.upload_part(uid, part);
                Task::new(name, TaskKind::UploadPart, operation).child_of(&mut parent)
            })
            .collect();

        let mut registered = Vec::with_capacity(children.len());
        for child in children {
            match self.queue.add_task(child, false).await {
                Ok(id) => registered.push(id),
                Err(e) => {
                    self.discard(&registered).await;
                    return Err(e);
                }
            }
        }

        match self.queue.add_task(parent, true).await {
            Ok(id) => Ok(id),
            Err(e) => {
                self.discard(&registered).await;
                Err(e)
            }
        }
    }

    async fn discard(&self, ids: &[TaskId]) {
        for id in ids {
            if let Err(e) = self.queue.remove(*id).await {
                warn!(task_id = %id, error = %e, "failed to discard orphaned upload task");
            }
        }
    }
}
