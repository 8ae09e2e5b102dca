//! Postgres-backed [`PostStore`].
//!
//! Each upsert runs in its own transaction: a conflict-free insert first, and
//! on conflict a `FOR UPDATE` read of the existing row so concurrent writers
//! of the same key serialize while different keys proceed in parallel.

use async_trait::async_trait;
use chrono::Utc;
use engine::store::{PostStore, StoreError};
use engine::types::{Channel, Message, UpsertOutcome};
use sqlx::PgPool;

use crate::models::NewPost;
use crate::queries::{channels, posts};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(err))
}

#[async_trait]
impl PostStore for PgStore {
    async fn ensure_channel(&self, handle: &str, title: &str) -> Result<Channel, StoreError> {
        match channels::ensure(&self.pool, handle, title).await {
            Ok(row) => Ok(row.into()),
            // Lost an insert race; the winner's row is committed by now.
            Err(sqlx::Error::RowNotFound) => channels::get_by_username(&self.pool, handle)
                .await
                .map_err(backend)?
                .map(Into::into)
                .ok_or_else(|| StoreError::UnknownChannel(handle.to_string())),
            Err(err) => Err(backend(err)),
        }
    }

    async fn set_title(&self, channel: &Channel, title: &str) -> Result<(), StoreError> {
        channels::update_title(&self.pool, channel.id, title)
            .await
            .map_err(backend)
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let rows = channels::list(&self.pool).await.map_err(backend)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(
        &self,
        channel: &Channel,
        message: &Message,
    ) -> Result<UpsertOutcome, StoreError> {
        let post = NewPost::from_message(&channel.username, message);
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let inserted = posts::insert_if_absent(&mut *tx, channel.id, message.id, &post, now)
            .await
            .map_err(backend)?;

        let outcome = if inserted.is_some() {
            UpsertOutcome::Inserted
        } else {
            let existing = posts::lock(&mut *tx, channel.id, message.id)
                .await
                .map_err(backend)?
                .ok_or_else(|| StoreError::UnknownChannel(channel.username.clone()))?;

            if existing.content() == post {
                posts::touch(&mut *tx, existing.id, now)
                    .await
                    .map_err(backend)?;
                UpsertOutcome::UpdatedTimestampOnly
            } else {
                posts::update_content(&mut *tx, existing.id, &post, now)
                    .await
                    .map_err(backend)?;
                UpsertOutcome::Updated
            }
        };

        tx.commit().await.map_err(backend)?;
        Ok(outcome)
    }

    async fn exists(&self, channel: &Channel, message_id: i64) -> Result<bool, StoreError> {
        posts::exists(&self.pool, channel.id, message_id)
            .await
            .map_err(backend)
    }
}
