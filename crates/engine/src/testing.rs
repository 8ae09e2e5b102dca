//! In-memory source and store used by the engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::source::{MessageSource, SourceError};
use crate::store::{PostStore, StoreError};
use crate::types::{Channel, ChannelRef, Message, UpsertOutcome};

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

pub fn message(id: i64, published_at: DateTime<Utc>) -> Message {
    Message {
        id,
        published_at,
        text: format!("post {}", id),
        views: 100,
        forwards: 0,
        replies: 0,
        media: None,
        edited_at: None,
        pinned: false,
        grouped_id: None,
        post_author: None,
        reactions: vec![],
    }
}

/// Messages `ids`, one hour apart, the highest id being the newest.
pub fn messages(ids: impl IntoIterator<Item = i64>, newest: DateTime<Utc>) -> Vec<Message> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    let max = ids.last().copied().unwrap_or(0);
    ids.into_iter()
        .map(|id| message(id, newest - Duration::hours(max - id)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceCall {
    Resolve(String),
    Fetch {
        handle: String,
        cursor: Option<i64>,
        limit: usize,
    },
}

#[derive(Default)]
pub struct MemorySource {
    channels: Mutex<HashMap<String, Vec<Message>>>,
    failing: Mutex<HashSet<String>>,
    unauthorized: Mutex<bool>,
    calls: Mutex<Vec<(SourceCall, tokio::time::Instant)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(self, handle: &str, messages: Vec<Message>) -> Self {
        self.set_messages(handle, messages);
        self
    }

    /// Replace the channel's content; stored newest first like the real source.
    pub fn set_messages(&self, handle: &str, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        self.channels
            .lock()
            .unwrap()
            .insert(handle.to_string(), messages);
    }

    pub fn fail(&self, handle: &str) {
        self.failing.lock().unwrap().insert(handle.to_string());
    }

    pub fn reject_credentials(&self) {
        *self.unauthorized.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn resolves(&self) -> Vec<(String, tokio::time::Instant)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(call, at)| match call {
                SourceCall::Resolve(handle) => Some((handle.clone(), *at)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SourceCall) {
        self.calls
            .lock()
            .unwrap()
            .push((call, tokio::time::Instant::now()));
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn resolve(&self, handle: &str) -> Result<ChannelRef, SourceError> {
        self.record(SourceCall::Resolve(handle.to_string()));
        if *self.unauthorized.lock().unwrap() {
            return Err(SourceError::Unauthorized);
        }
        if self.failing.lock().unwrap().contains(handle) {
            return Err(SourceError::Upstream {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        if !self.channels.lock().unwrap().contains_key(handle) {
            return Err(SourceError::NotFound(handle.to_string()));
        }
        Ok(ChannelRef {
            source_id: 1000,
            handle: handle.to_string(),
            title: format!("{} title", handle),
        })
    }

    async fn fetch_page(
        &self,
        channel: &ChannelRef,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>, SourceError> {
        self.record(SourceCall::Fetch {
            handle: channel.handle.clone(),
            cursor,
            limit,
        });
        let channels = self.channels.lock().unwrap();
        let messages = channels
            .get(&channel.handle)
            .ok_or_else(|| SourceError::NotFound(channel.handle.clone()))?;
        Ok(messages
            .iter()
            .filter(|m| cursor.map_or(true, |c| m.id < c))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPost {
    pub message: Message,
    pub link: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    channels: Mutex<Vec<Channel>>,
    posts: Mutex<BTreeMap<(i64, i64), StoredPost>>,
    writes: Mutex<Vec<(String, i64)>>,
    exists_checks: Mutex<Vec<(String, i64)>>,
    broken: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, handle: &str) -> Channel {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.username == handle)
            .cloned()
            .unwrap()
    }

    /// Register a channel and seed it with already-synced messages.
    pub async fn seed(&self, handle: &str, messages: &[Message]) -> Channel {
        let channel = self.ensure_channel(handle, handle).await.unwrap();
        for message in messages {
            self.upsert(&channel, message).await.unwrap();
        }
        self.writes.lock().unwrap().clear();
        channel
    }

    pub fn post(&self, channel: &Channel, message_id: i64) -> Option<StoredPost> {
        self.posts
            .lock()
            .unwrap()
            .get(&(channel.id, message_id))
            .cloned()
    }

    pub fn post_ids(&self, channel: &Channel) -> Vec<i64> {
        self.posts
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| *c == channel.id)
            .map(|(_, m)| *m)
            .collect()
    }

    /// Message ids written since the last `seed`, in write order.
    pub fn written(&self) -> Vec<i64> {
        self.writes.lock().unwrap().iter().map(|(_, id)| *id).collect()
    }

    pub fn exists_checked(&self) -> Vec<i64> {
        self.exists_checks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn break_writes(&self) {
        *self.broken.lock().unwrap() = true;
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn ensure_channel(&self, handle: &str, title: &str) -> Result<Channel, StoreError> {
        let mut channels = self.channels.lock().unwrap();
        if let Some(existing) = channels.iter().find(|c| c.username == handle) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let channel = Channel {
            id: channels.len() as i64 + 1,
            username: handle.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        channels.push(channel.clone());
        Ok(channel)
    }

    async fn set_title(&self, channel: &Channel, title: &str) -> Result<(), StoreError> {
        let mut channels = self.channels.lock().unwrap();
        let stored = channels
            .iter_mut()
            .find(|c| c.id == channel.id)
            .ok_or_else(|| StoreError::UnknownChannel(channel.username.clone()))?;
        stored.title = title.to_string();
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let mut channels = self.channels.lock().unwrap().clone();
        channels.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(channels)
    }

    async fn upsert(
        &self,
        channel: &Channel,
        message: &Message,
    ) -> Result<UpsertOutcome, StoreError> {
        if *self.broken.lock().unwrap() {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((channel.username.clone(), message.id));

        let now = Utc::now();
        let mut posts = self.posts.lock().unwrap();
        match posts.get_mut(&(channel.id, message.id)) {
            None => {
                posts.insert(
                    (channel.id, message.id),
                    StoredPost {
                        message: message.clone(),
                        link: message.link(&channel.username),
                        first_seen_at: now,
                        last_updated_at: now,
                    },
                );
                Ok(UpsertOutcome::Inserted)
            }
            Some(stored) => {
                stored.last_updated_at = now;
                if stored.message == *message {
                    Ok(UpsertOutcome::UpdatedTimestampOnly)
                } else {
                    stored.message = message.clone();
                    Ok(UpsertOutcome::Updated)
                }
            }
        }
    }

    async fn exists(&self, channel: &Channel, message_id: i64) -> Result<bool, StoreError> {
        self.exists_checks
            .lock()
            .unwrap()
            .push((channel.username.clone(), message_id));
        Ok(self
            .posts
            .lock()
            .unwrap()
            .contains_key(&(channel.id, message_id)))
    }
}
