//! Submission options: validation and conversion to the platform's form.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Maximum title length in characters
pub const MAX_TITLE_CHARS: usize = 80;
/// Maximum repost source length in characters
pub const MAX_SOURCE_CHARS: usize = 200;
/// Maximum number of tags a user may enter
pub const MAX_TAGS: usize = 12;
/// Number of tags (topic included) sent to the platform
pub const SUBMITTED_TAGS: usize = 10;

static MENTION: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]<([^>]*)>"));

/// Copyright declaration of a submission
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Copyright {
    /// Self-made
    #[default]
    Original,
    /// Reposted from elsewhere; requires a source
    Repost,
}

impl From<Copyright> for u8 {
    fn from(value: Copyright) -> Self {
        match value {
            Copyright::Original => 1,
            Copyright::Repost => 2,
        }
    }
}

impl TryFrom<u8> for Copyright {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Copyright::Original),
            2 => Ok(Copyright::Repost),
            other => Err(format!("unknown copyright value {other}")),
        }
    }
}

/// Options a user fills in for a submission
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    /// Title (required, at most 80 characters)
    pub title: String,
    /// Description; `[name]<id>` marks a mention
    pub desc: String,
    /// Tags (1 to 12)
    pub tag: Vec<String>,
    /// Topic name, sent as the first tag
    pub topic_name: Option<String>,
    /// Topic id
    pub topic_id: Option<u64>,
    /// Activity id
    pub mission_id: Option<u64>,
    /// Copyright declaration
    pub copyright: Copyright,
    /// Original location of a repost
    pub source: String,
    /// Partition id
    pub tid: u32,
    /// Cover image URL
    pub cover: String,
    /// Dolby audio
    pub dolby: bool,
    /// Lossless audio
    pub hires: bool,
    /// Forbid reposting
    pub no_reprint: bool,
    /// Disable danmaku
    pub close_danmu: bool,
    /// Disable replies
    pub close_reply: bool,
    /// Only show selected replies
    pub selection_reply: bool,
    /// Enable charging
    pub open_elec: bool,
    /// Allow derivative works (`-1` to forbid)
    pub recreate: Option<i32>,
    /// Suppress follower notifications
    pub no_disturbance: Option<i32>,
    /// Collection to add the submission to
    pub season_id: Option<u64>,
    /// Section within the collection; the first section when absent
    pub section_id: Option<u64>,
    /// Post a comment once the submission is approved
    pub auto_comment: bool,
    /// Comment text
    pub comment: String,
    /// Pin the comment after posting
    pub comment_top: bool,
}

/// Piece of a description
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescSegment {
    /// Text, or the mentioned name
    pub raw_text: String,
    /// 1 = plain text, 2 = mention
    #[serde(rename = "type")]
    pub kind: u8,
    /// Mentioned account id (empty for text)
    pub biz_id: String,
}

impl DescSegment {
    fn text(raw_text: &str) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            kind: 1,
            biz_id: String::new(),
        }
    }

    /// Whether this segment is a mention
    pub fn is_mention(&self) -> bool {
        self.kind == 2
    }
}

/// Submission options in the platform's request shape
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaOptions {
    /// Cover image URL
    pub cover: String,
    /// Title
    pub title: String,
    /// Partition id
    pub tid: u32,
    /// Comma-joined tags, topic first
    pub tag: String,
    /// 1 = original, 2 = repost
    pub copyright: u8,
    /// Original location of a repost
    pub source: String,
    /// Dolby audio
    pub dolby: bool,
    /// Lossless audio
    pub lossless_music: bool,
    /// Forbid reposting
    pub no_reprint: bool,
    /// Disable danmaku
    pub up_close_danmu: bool,
    /// Disable replies
    pub up_close_reply: bool,
    /// Only show selected replies
    pub up_selection_reply: bool,
    /// Enable charging
    pub open_elec: bool,
    /// Structured description, only when it carries a mention
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc_v2: Option<Vec<DescSegment>>,
    /// Plain description with mentions rendered as `@name `
    pub desc: String,
    /// Derivative works flag
    pub recreate: i32,
    /// Follower notification flag
    pub no_disturbance: i32,
    /// Topic id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<u64>,
    /// Activity id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<u64>,
}

/// Split `[name]<id>` mention markup into text and mention segments
pub fn parse_desc(input: &str) -> Vec<DescSegment> {
    let mention = match &*MENTION {
        Ok(regex) => regex,
        Err(_) => return vec![DescSegment::text(input)],
    };

    let mut segments = Vec::new();
    let mut last = 0;
    for caps in mention.captures_iter(input) {
        let (Some(whole), Some(name), Some(id)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if whole.start() > last {
            segments.push(DescSegment::text(&input[last..whole.start()]));
        }
        segments.push(DescSegment {
            raw_text: name.as_str().to_string(),
            kind: 2,
            biz_id: id.as_str().to_string(),
        });
        last = whole.end();
    }
    if last < input.len() {
        segments.push(DescSegment::text(&input[last..]));
    }
    segments
}

impl UploadOptions {
    /// Check the options the platform would reject
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title is required".into()));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(Error::Validation(format!("title exceeds {MAX_TITLE_CHARS} characters")));
        }
        if self.copyright == Copyright::Repost {
            if self.source.is_empty() {
                return Err(Error::Validation("a repost needs a source".into()));
            }
            if self.source.chars().count() > MAX_SOURCE_CHARS {
                return Err(Error::Validation(format!(
                    "source exceeds {MAX_SOURCE_CHARS} characters"
                )));
            }
            if self.topic_name.as_deref().is_some_and(|t| !t.is_empty()) {
                return Err(Error::Validation("a repost cannot join a topic".into()));
            }
        }
        if self.tag.is_empty() {
            return Err(Error::Validation("at least one tag is required".into()));
        }
        if self.tag.len() > MAX_TAGS {
            return Err(Error::Validation(format!("at most {MAX_TAGS} tags are allowed")));
        }
        Ok(())
    }

    /// Convert to the platform's request shape
    pub fn format_options(&self) -> MediaOptions {
        let segments = parse_desc(&self.desc);
        let has_mention = segments.iter().any(DescSegment::is_mention);
        let desc = segments
            .iter()
            .map(|segment| {
                if segment.is_mention() {
                    format!("@{} ", segment.raw_text)
                } else {
                    segment.raw_text.clone()
                }
            })
            .collect::<String>();

        let mut tags: Vec<&str> = self.tag.iter().map(|tag| tag.trim()).collect();
        if let Some(topic) = self.topic_name.as_deref().filter(|t| !t.is_empty()) {
            tags.insert(0, topic);
        }
        tags.truncate(SUBMITTED_TAGS);

        MediaOptions {
            cover: self.cover.clone(),
            title: self.title.clone(),
            tid: self.tid,
            tag: tags.join(","),
            copyright: self.copyright.into(),
            source: self.source.clone(),
            dolby: self.dolby,
            lossless_music: self.hires,
            no_reprint: self.no_reprint,
            up_close_danmu: self.close_danmu,
            up_close_reply: self.close_reply,
            up_selection_reply: self.selection_reply,
            open_elec: self.open_elec,
            desc_v2: has_mention.then_some(segments),
            desc,
            recreate: self.recreate.unwrap_or(-1),
            no_disturbance: self.no_disturbance.unwrap_or(0),
            topic_id: self.topic_id,
            mission_id: self.mission_id,
        }
    }

    /// Comment to queue after submission, if one was asked for
    pub fn follow_up_comment(&self) -> Option<(&str, bool)> {
        (self.auto_comment && !self.comment.is_empty())
            .then_some((self.comment.as_str(), self.comment_top))
    }
}
