use chrono::{DateTime, SubsecRound, Utc};
use engine::types::{Channel, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelRow {
    pub id: i64,
    pub username: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            id: row.id,
            username: row.username,
            title: row.title,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostRow {
    pub id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub published_at: DateTime<Utc>,
    pub text: String,
    pub views: i64,
    pub forwards: i64,
    pub replies: i64,
    pub link: String,
    pub has_media: bool,
    pub media_kind: Option<String>,
    pub media_meta: Option<serde_json::Value>,
    pub edited_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub grouped_id: Option<i64>,
    pub post_author: Option<String>,
    pub reactions: serde_json::Value,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelStats {
    pub username: String,
    pub title: String,
    pub posts: i64,
    pub latest_post_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Content columns of a post as written by the sync engine.
///
/// Timestamps are truncated to microseconds so they compare equal to what
/// Postgres hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub published_at: DateTime<Utc>,
    pub text: String,
    pub views: i64,
    pub forwards: i64,
    pub replies: i64,
    pub link: String,
    pub has_media: bool,
    pub media_kind: Option<String>,
    pub media_meta: Option<serde_json::Value>,
    pub edited_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub grouped_id: Option<i64>,
    pub post_author: Option<String>,
    pub reactions: serde_json::Value,
}

impl NewPost {
    /// NUL characters are dropped from every string; TEXT and JSONB reject them.
    pub fn from_message(handle: &str, message: &Message) -> Self {
        Self {
            published_at: message.published_at.trunc_subsecs(6),
            text: strip_nul(&message.text),
            views: message.views,
            forwards: message.forwards,
            replies: message.replies,
            link: strip_nul(&message.link(handle)),
            has_media: message.has_media(),
            media_kind: message.media.as_ref().map(|m| m.kind().to_string()),
            media_meta: message
                .media
                .as_ref()
                .and_then(|m| m.metadata())
                .map(strip_nul_json),
            edited_at: message.edited_at.map(|at| at.trunc_subsecs(6)),
            pinned: message.pinned,
            grouped_id: message.grouped_id,
            post_author: message.post_author.as_deref().map(strip_nul),
            reactions: serde_json::to_value(&message.reactions)
                .map(strip_nul_json)
                .unwrap_or_else(|_| Value::Array(vec![])),
        }
    }
}

fn strip_nul(value: &str) -> String {
    value.replace('\0', "")
}

fn strip_nul_json(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(strip_nul(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (strip_nul(&k), strip_nul_json(v)))
                .collect(),
        ),
        other => other,
    }
}

impl PostRow {
    pub fn content(&self) -> NewPost {
        NewPost {
            published_at: self.published_at,
            text: self.text.clone(),
            views: self.views,
            forwards: self.forwards,
            replies: self.replies,
            link: self.link.clone(),
            has_media: self.has_media,
            media_kind: self.media_kind.clone(),
            media_meta: self.media_meta.clone(),
            edited_at: self.edited_at,
            pinned: self.pinned,
            grouped_id: self.grouped_id,
            post_author: self.post_author.clone(),
            reactions: self.reactions.clone(),
        }
    }
}
