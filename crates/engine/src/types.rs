use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// A tracked channel as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub username: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stable identity of a channel as reported by the upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub source_id: i64,
    pub handle: String,
    pub title: String,
}

/// One message fetched from a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub published_at: DateTime<Utc>,
    pub text: String,
    pub views: i64,
    pub forwards: i64,
    pub replies: i64,
    pub media: Option<Media>,
    pub edited_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub grouped_id: Option<i64>,
    pub post_author: Option<String>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Public permalink of the message on the channel platform.
    pub fn link(&self, handle: &str) -> String {
        format!("https://t.me/{}/{}", handle, self.id)
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: i64,
}

/// Media attached to a message, keyed by kind.
///
/// Each kind that carries metadata has its own record of optional fields so
/// the stored `media_meta` column has a known shape per `media_kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Media {
    Photo,
    Video(VideoMeta),
    Document(DocumentMeta),
    Audio(AudioMeta),
    WebPage(WebPageMeta),
    Poll,
    Geo,
    Contact,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub duration: Option<i64>,
    pub size: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub size: Option<i64>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMeta {
    pub duration: Option<i64>,
    pub size: Option<i64>,
    pub performer: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPageMeta {
    pub url: Option<String>,
}

impl Media {
    pub fn kind(&self) -> &'static str {
        match self {
            Media::Photo => "photo",
            Media::Video(_) => "video",
            Media::Document(_) => "document",
            Media::Audio(_) => "audio",
            Media::WebPage(_) => "web_page",
            Media::Poll => "poll",
            Media::Geo => "geo",
            Media::Contact => "contact",
            Media::Other => "other",
        }
    }

    /// Kind-specific metadata as stored alongside the post, if the kind has any.
    pub fn metadata(&self) -> Option<serde_json::Value> {
        let value = match self {
            Media::Video(meta) => serde_json::to_value(meta),
            Media::Document(meta) => serde_json::to_value(meta),
            Media::Audio(meta) => serde_json::to_value(meta),
            Media::WebPage(meta) => serde_json::to_value(meta),
            _ => return None,
        };
        value.ok()
    }
}

/// Result of writing one message to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the natural key.
    Inserted,
    /// The row existed and at least one content field changed.
    Updated,
    /// The row existed with identical content; only `last_updated_at` moved.
    UpdatedTimestampOnly,
}

impl UpsertOutcome {
    pub fn is_new(self) -> bool {
        matches!(self, UpsertOutcome::Inserted)
    }
}

/// Why a channel scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BoundaryReached,
    FirstExistingReached,
    SourceExhausted,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::BoundaryReached => "boundary_reached",
            StopReason::FirstExistingReached => "first_existing_reached",
            StopReason::SourceExhausted => "source_exhausted",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl AddAssign for SyncCounts {
    fn add_assign(&mut self, other: Self) {
        self.new += other.new;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Outcome of one Sync Policy invocation on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub counts: SyncCounts,
    pub pages: u32,
    pub stop_reason: StopReason,
}
