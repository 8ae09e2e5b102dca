use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WireChannel {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesPage {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub forwards: Option<i64>,
    #[serde(default)]
    pub replies: Option<i64>,
    #[serde(default)]
    pub edit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub grouped_id: Option<i64>,
    #[serde(default)]
    pub post_author: Option<String>,
    #[serde(default)]
    pub reactions: Vec<WireReaction>,
    /// Kept untyped so one odd media payload cannot fail the whole page.
    #[serde(default)]
    pub media: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireReaction {
    pub emoji: String,
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
