//! Scripted platform fakes shared by the engine and comment queue tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::PlatformError;
use crate::media::MediaOptions;
use crate::platform::{
    CommentPlatform, DownloadRequest, MediaPlatform, Operation, PartSource, SeasonEpisode,
    Submission, UploadedPart,
};
use crate::queue::test_helpers::InstantOperation;

/// Comment platform with a settable approval list and call records
#[derive(Default)]
pub(crate) struct FakeCommentPlatform {
    approved: Mutex<HashSet<u64>>,
    queries: Mutex<Vec<u64>>,
    posts: Mutex<Vec<(u64, u64, String)>>,
    pins: Mutex<Vec<(u64, u64, u64)>>,
    next_rpid: AtomicU64,
    pub(crate) post_attempts: AtomicUsize,
    pub(crate) fail_posts: AtomicBool,
    pub(crate) fail_pins: AtomicBool,
    pub(crate) fail_queries: AtomicBool,
    pub(crate) panic_next_query: AtomicBool,
}

impl FakeCommentPlatform {
    pub(crate) fn approve(&self, aid: u64) {
        self.approved.lock().unwrap().insert(aid);
    }

    /// Accounts queried, one entry per call
    pub(crate) fn queried(&self) -> Vec<u64> {
        self.queries.lock().unwrap().clone()
    }

    /// Successful posts as `(uid, aid, content)`
    pub(crate) fn posted(&self) -> Vec<(u64, u64, String)> {
        self.posts.lock().unwrap().clone()
    }

    /// Successful pins as `(uid, aid, rpid)`
    pub(crate) fn pinned(&self) -> Vec<(u64, u64, u64)> {
        self.pins.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommentPlatform for FakeCommentPlatform {
    async fn approved_submissions(
        &self,
        uid: u64,
        _page_size: u32,
    ) -> Result<Vec<u64>, PlatformError> {
        if self.panic_next_query.swap(false, Ordering::SeqCst) {
            panic!("approval query blew up");
        }
        self.queries.lock().unwrap().push(uid);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("archive list unavailable".into()));
        }
        Ok(self.approved.lock().unwrap().iter().copied().collect())
    }

    async fn post_comment(&self, uid: u64, aid: u64, content: &str) -> Result<u64, PlatformError> {
        self.post_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("reply rejected".into()));
        }
        self.posts
            .lock()
            .unwrap()
            .push((uid, aid, content.to_string()));
        Ok(1000 + self.next_rpid.fetch_add(1, Ordering::SeqCst))
    }

    async fn pin_comment(&self, uid: u64, aid: u64, rpid: u64) -> Result<(), PlatformError> {
        if self.fail_pins.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("pin rejected".into()));
        }
        self.pins.lock().unwrap().push((uid, aid, rpid));
        Ok(())
    }
}

/// Media platform whose uploads finish instantly
///
/// Parts titled `"broken"` fail their upload. Submissions get aid 170001
/// and onwards.
#[derive(Default)]
pub(crate) struct FakeMediaPlatform {
    next_cid: AtomicU64,
    next_aid: AtomicU64,
    pub(crate) uploads: Mutex<Vec<(u64, String)>>,
    pub(crate) submitted: Mutex<Vec<(u64, Vec<UploadedPart>, MediaOptions)>>,
    pub(crate) edited: Mutex<Vec<(u64, u64, Vec<UploadedPart>)>>,
    pub(crate) downloads: Mutex<Vec<(u64, DownloadRequest)>>,
    pub(crate) seasons: Mutex<Vec<(u64, u64, SeasonEpisode)>>,
    /// Cids reported for every archive; one part when unset
    pub(crate) archive_cids: Mutex<Option<Vec<u64>>>,
    pub(crate) first_section: Mutex<Option<u64>>,
    pub(crate) fail_submit: AtomicBool,
    pub(crate) fail_season: AtomicBool,
}

impl FakeMediaPlatform {
    pub(crate) fn new() -> Arc<Self> {
        let platform = Self::default();
        platform.next_aid.store(170001, Ordering::SeqCst);
        platform.next_cid.store(1, Ordering::SeqCst);
        Arc::new(platform)
    }

    fn submission(&self) -> Submission {
        let aid = self.next_aid.fetch_add(1, Ordering::SeqCst);
        Submission {
            aid,
            bvid: format!("BV{aid}"),
        }
    }
}

#[async_trait]
impl MediaPlatform for FakeMediaPlatform {
    fn upload_part(&self, uid: u64, part: PartSource) -> Arc<dyn Operation> {
        let title = part.display_title();
        self.uploads.lock().unwrap().push((uid, title.clone()));
        if title == "broken" {
            return Arc::new(InstantOperation(Err(PlatformError::Request(
                "chunk upload failed".into(),
            ))));
        }
        let cid = self.next_cid.fetch_add(1, Ordering::SeqCst);
        let filename = format!("n{cid}");
        let part = UploadedPart {
            cid,
            filename,
            title,
        };
        Arc::new(InstantOperation(Ok(serde_json::to_value(part).unwrap())))
    }

    fn download(&self, uid: u64, request: DownloadRequest) -> Arc<dyn Operation> {
        let output = request.output.clone();
        self.downloads.lock().unwrap().push((uid, request));
        Arc::new(InstantOperation(Ok(json!({ "output": output }))))
    }

    async fn add_media(
        &self,
        uid: u64,
        parts: Vec<UploadedPart>,
        options: MediaOptions,
    ) -> Result<Submission, PlatformError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("title rejected".into()));
        }
        self.submitted.lock().unwrap().push((uid, parts, options));
        Ok(self.submission())
    }

    async fn edit_media(
        &self,
        uid: u64,
        aid: u64,
        parts: Vec<UploadedPart>,
        _options: MediaOptions,
    ) -> Result<Submission, PlatformError> {
        self.edited.lock().unwrap().push((uid, aid, parts));
        Ok(Submission {
            aid,
            bvid: format!("BV{aid}"),
        })
    }

    async fn archive_parts(&self, _uid: u64, _aid: u64) -> Result<Vec<u64>, PlatformError> {
        Ok(self
            .archive_cids
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| vec![1]))
    }

    async fn first_section(
        &self,
        _uid: u64,
        _season_id: u64,
    ) -> Result<Option<u64>, PlatformError> {
        Ok(*self.first_section.lock().unwrap())
    }

    async fn add_to_season(
        &self,
        uid: u64,
        section_id: u64,
        episode: SeasonEpisode,
    ) -> Result<(), PlatformError> {
        if self.fail_season.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("season locked".into()));
        }
        self.seasons.lock().unwrap().push((uid, section_id, episode));
        Ok(())
    }
}
