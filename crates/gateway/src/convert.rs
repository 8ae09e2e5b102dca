use engine::types::{ChannelRef, Media, Message, Reaction};
use tracing::warn;

use crate::types::{WireChannel, WireMessage};

pub fn to_channel_ref(wire: WireChannel) -> ChannelRef {
    let title = wire
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| wire.username.clone());
    ChannelRef {
        source_id: wire.id,
        handle: wire.username,
        title,
    }
}

/// Decode a media payload, degrading to [`Media::Other`] when it is malformed.
pub fn to_media(value: serde_json::Value) -> Media {
    match serde_json::from_value::<Media>(value) {
        Ok(media) => media,
        Err(err) => {
            warn!(error = %err, "unreadable media payload");
            Media::Other
        }
    }
}

pub fn to_message(wire: WireMessage) -> Message {
    Message {
        id: wire.id,
        published_at: wire.date,
        text: wire.text.unwrap_or_default(),
        views: wire.views.unwrap_or(0),
        forwards: wire.forwards.unwrap_or(0),
        replies: wire.replies.unwrap_or(0),
        media: wire.media.filter(|m| !m.is_null()).map(to_media),
        edited_at: wire.edit_date,
        pinned: wire.pinned.unwrap_or(false),
        grouped_id: wire.grouped_id,
        post_author: wire.post_author,
        reactions: wire
            .reactions
            .into_iter()
            .map(|r| Reaction {
                emoji: r.emoji,
                count: r.count,
            })
            .collect(),
    }
}
