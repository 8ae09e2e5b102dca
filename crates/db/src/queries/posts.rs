//! Post database operations.
//!
//! Posts are keyed by `(channel_id, message_id)`. The write helpers take a
//! connection so the store can run them inside one transaction per key.

use crate::models::{NewPost, PostRow};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

pub async fn exists(pool: &PgPool, channel_id: i64, message_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM posts WHERE channel_id = $1 AND message_id = $2
        )
        "#,
    )
    .bind(channel_id)
    .bind(message_id)
    .fetch_one(pool)
    .await
}

/// Insert a post unless the key is taken. Returns the new row id on insert.
///
/// `first_seen_at` is only ever set here.
pub async fn insert_if_absent(
    conn: &mut PgConnection,
    channel_id: i64,
    message_id: i64,
    post: &NewPost,
    now: DateTime<Utc>,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO posts
            (channel_id, message_id, published_at, text, views, forwards, replies,
             link, has_media, media_kind, media_meta, edited_at, pinned, grouped_id,
             post_author, reactions, first_seen_at, last_updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
        ON CONFLICT (channel_id, message_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(channel_id)
    .bind(message_id)
    .bind(post.published_at)
    .bind(&post.text)
    .bind(post.views)
    .bind(post.forwards)
    .bind(post.replies)
    .bind(&post.link)
    .bind(post.has_media)
    .bind(post.media_kind.as_deref())
    .bind(post.media_meta.as_ref())
    .bind(post.edited_at)
    .bind(post.pinned)
    .bind(post.grouped_id)
    .bind(post.post_author.as_deref())
    .bind(&post.reactions)
    .bind(now)
    .fetch_optional(conn)
    .await
}

/// Fetch a post and hold its row lock until the surrounding transaction ends.
pub async fn lock(
    conn: &mut PgConnection,
    channel_id: i64,
    message_id: i64,
) -> Result<Option<PostRow>, sqlx::Error> {
    sqlx::query_as::<_, PostRow>(
        r#"
        SELECT id, channel_id, message_id, published_at, text, views, forwards, replies,
               link, has_media, media_kind, media_meta, edited_at, pinned, grouped_id,
               post_author, reactions, first_seen_at, last_updated_at
        FROM posts
        WHERE channel_id = $1 AND message_id = $2
        FOR UPDATE
        "#,
    )
    .bind(channel_id)
    .bind(message_id)
    .fetch_optional(conn)
    .await
}

/// Overwrite content columns; the natural key and `first_seen_at` stay fixed.
pub async fn update_content(
    conn: &mut PgConnection,
    id: i64,
    post: &NewPost,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE posts
        SET published_at = $1, text = $2, views = $3, forwards = $4, replies = $5,
            link = $6, has_media = $7, media_kind = $8, media_meta = $9,
            edited_at = $10, pinned = $11, grouped_id = $12, post_author = $13,
            reactions = $14, last_updated_at = $15
        WHERE id = $16
        "#,
    )
    .bind(post.published_at)
    .bind(&post.text)
    .bind(post.views)
    .bind(post.forwards)
    .bind(post.replies)
    .bind(&post.link)
    .bind(post.has_media)
    .bind(post.media_kind.as_deref())
    .bind(post.media_meta.as_ref())
    .bind(post.edited_at)
    .bind(post.pinned)
    .bind(post.grouped_id)
    .bind(post.post_author.as_deref())
    .bind(&post.reactions)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn touch(conn: &mut PgConnection, id: i64, now: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE posts
        SET last_updated_at = $1
        WHERE id = $2
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}
