use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, Condition, ConnectionTrait, DbBackend, DbConn, DbErr, EntityTrait, QueryFilter,
    SqlErr, Statement, Value,
};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::{config::db_conn_capsule, orm::paste};

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS pastes (
        id              TEXT PRIMARY KEY,
        content         TEXT NOT NULL,
        expires_at      BIGINT,
        remaining_views BIGINT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

// NULL - 1 is NULL, so unlimited pastes stay unlimited.
const BURN_VIEW_SQL: &str = "
    UPDATE pastes
    SET remaining_views = remaining_views - 1
    WHERE id = $1
      AND (remaining_views IS NULL OR remaining_views > 0)
    RETURNING id, content, expires_at, remaining_views, created_at";

pub(crate) async fn ensure_schema(db: &DbConn) -> Result<(), DbErr> {
    db.execute_unprepared(CREATE_TABLE_SQL).await?;
    Ok(())
}

pub fn paste_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn PasteRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    Arc::new(PasteRepositoryImpl { db })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPaste {
    pub id: String,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub expires_at: Option<i64>,
    pub max_views: Option<i64>,
}

/// A paste as seen by the read that just burned a view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewedPaste {
    pub content: String,
    /// Already decremented for this read
    pub remaining_views: Option<i64>,
    /// Milliseconds since the Unix epoch
    pub expires_at: Option<i64>,
}

/// Missing, expired and exhausted pastes all come back as [`BurnOutcome::NotFound`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BurnOutcome {
    Success(ViewedPaste),
    NotFound,
}

#[derive(Debug, Error)]
pub enum SavePasteError {
    #[error("a paste with this ID already exists")]
    IdTaken,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

#[async_trait]
pub trait PasteRepository: Send + Sync {
    async fn create_paste(&self, paste: NewPaste) -> Result<(), SavePasteError>;

    /// Atomically takes one view from the paste and returns what is left of it.
    /// A paste found to be expired at `now_ms` is deleted instead.
    async fn get_and_burn_view(&self, id: &str, now_ms: i64) -> anyhow::Result<BurnOutcome>;

    /// Deletes expired and view-exhausted pastes, returning how many were removed.
    async fn delete_dead_pastes(&self, now_ms: i64) -> anyhow::Result<u64>;

    async fn ping(&self) -> anyhow::Result<()>;
}

struct PasteRepositoryImpl {
    db: DbConn,
}

#[async_trait]
impl PasteRepository for PasteRepositoryImpl {
    #[instrument(skip(self, paste), fields(id = %paste.id))]
    async fn create_paste(&self, paste: NewPaste) -> Result<(), SavePasteError> {
        let to_insert = paste::ActiveModel {
            id: Set(paste.id),
            content: Set(paste.content),
            expires_at: Set(paste.expires_at),
            remaining_views: Set(paste.max_views),
            created_at: NotSet,
        };

        match to_insert.insert(&self.db).await {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(SavePasteError::IdTaken)
            }
            Err(err) => Err(SavePasteError::Internal(
                anyhow::Error::new(err).context("Failed to insert paste"),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn get_and_burn_view(&self, id: &str, now_ms: i64) -> anyhow::Result<BurnOutcome> {
        let burned = paste::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                BURN_VIEW_SQL,
                [Value::from(id)],
            ))
            .one(&self.db)
            .await
            .context("Failed to burn a paste view")?;

        let Some(paste) = burned else {
            return Ok(BurnOutcome::NotFound);
        };

        // NOTE: the view is burned before the expiry check; the row goes away right after
        if paste.expires_at.is_some_and(|expires_at| now_ms >= expires_at) {
            if let Err(err) = paste::Entity::delete_by_id(paste.id).exec(&self.db).await {
                warn!(?err, "Failed to delete expired paste");
            }
            return Ok(BurnOutcome::NotFound);
        }

        Ok(BurnOutcome::Success(ViewedPaste {
            content: paste.content,
            remaining_views: paste.remaining_views,
            expires_at: paste.expires_at,
        }))
    }

    #[instrument(skip(self))]
    async fn delete_dead_pastes(&self, now_ms: i64) -> anyhow::Result<u64> {
        let result = paste::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(paste::Column::ExpiresAt.lte(now_ms))
                    .add(paste::Column::RemainingViews.eq(0)),
            )
            .exec(&self.db)
            .await
            .context("Failed to delete dead pastes")?;
        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> anyhow::Result<()> {
        self.db
            .execute_unprepared("SELECT 1")
            .await
            .context("Database did not answer SELECT 1")?;
        Ok(())
    }
}
