//! Channel database operations.
//!
//! Channels are created lazily the first time a sync run or an operator
//! references them and are never deleted by the sync engine.

use crate::models::{ChannelRow, ChannelStats};
use sqlx::PgPool;

/// Return the channel with `username`, inserting it with `title` if absent.
///
/// An existing channel keeps its title; titles are edited explicitly.
pub async fn ensure(pool: &PgPool, username: &str, title: &str) -> Result<ChannelRow, sqlx::Error> {
    sqlx::query_as::<_, ChannelRow>(
        r#"
        WITH inserted AS (
            INSERT INTO channels (username, title)
            VALUES ($1, $2)
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username, title, created_at, updated_at
        )
        SELECT id, username, title, created_at, updated_at FROM inserted
        UNION ALL
        SELECT id, username, title, created_at, updated_at
        FROM channels
        WHERE username = $1
        LIMIT 1
        "#,
    )
    .bind(username)
    .bind(title)
    .fetch_one(pool)
    .await
}

pub async fn get_by_username(pool: &PgPool, username: &str) -> Result<Option<ChannelRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelRow>(
        r#"
        SELECT id, username, title, created_at, updated_at
        FROM channels
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &PgPool) -> Result<Vec<ChannelRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelRow>(
        r#"
        SELECT id, username, title, created_at, updated_at
        FROM channels
        ORDER BY username
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn update_title(pool: &PgPool, id: i64, title: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE channels
        SET title = $1, updated_at = now()
        WHERE id = $2 AND title <> $1
        "#,
    )
    .bind(title)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Per-channel post totals for operator listings.
pub async fn stats(pool: &PgPool) -> Result<Vec<ChannelStats>, sqlx::Error> {
    sqlx::query_as::<_, ChannelStats>(
        r#"
        SELECT c.username, c.title,
               COUNT(p.id) AS posts,
               MAX(p.published_at) AS latest_post_at,
               MAX(p.last_updated_at) AS last_synced_at
        FROM channels c
        LEFT JOIN posts p ON p.channel_id = c.id
        GROUP BY c.id, c.username, c.title
        ORDER BY c.username
        "#,
    )
    .fetch_all(pool)
    .await
}
