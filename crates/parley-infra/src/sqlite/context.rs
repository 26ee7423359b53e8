//! SQLite-backed [`ConversationContextStore`].

use chrono::{DateTime, Utc};
use sqlx::Row;

use parley_core::store::ConversationContextStore;
use parley_types::conversation::ConversationContext;
use parley_types::error::RepositoryError;

use super::pool::DatabasePool;

/// Persists one context id per owner in `conversation_contexts`.
pub struct SqliteContextStore {
    pool: DatabasePool,
}

impl SqliteContextStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// When the mapping for `owner_id` was last written.
    pub async fn updated_at(&self, owner_id: i64) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row = sqlx::query("SELECT updated_at FROM conversation_contexts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row.get("updated_at");
                parse_datetime(&raw).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl ConversationContextStore for SqliteContextStore {
    async fn get_context_id(&self, owner_id: i64) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT context_id FROM conversation_contexts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(row.map(|r| r.get::<String, _>("context_id")))
    }

    async fn set_context_id(
        &self,
        owner_id: i64,
        context_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = match context_id {
            Some(id) => {
                sqlx::query(
                    r#"INSERT INTO conversation_contexts (owner_id, context_id, updated_at)
                       VALUES (?, ?, ?)
                       ON CONFLICT (owner_id) DO UPDATE SET
                           context_id = excluded.context_id,
                           updated_at = excluded.updated_at"#,
                )
                .bind(owner_id)
                .bind(id)
                .bind(format_datetime(&Utc::now()))
                .execute(&self.pool.writer)
                .await
            }
            None => {
                sqlx::query("DELETE FROM conversation_contexts WHERE owner_id = ?")
                    .bind(owner_id)
                    .execute(&self.pool.writer)
                    .await
            }
        };

        result.map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_contexts(&self) -> Result<Vec<ConversationContext>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT owner_id, context_id FROM conversation_contexts ORDER BY owner_id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ConversationContext {
                id: row.get("context_id"),
                owner_id: row.get("owner_id"),
            })
            .collect())
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime '{s}': {e}")))
}
