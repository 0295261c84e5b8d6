//! History database operations
//!
//! Handles all database interactions for conversation turns.

use crate::error::AppError;
use crate::history::models::{Turn, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, error, info};

/// Append-only per-(user, model) message log
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Initialize database connection pool
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Returns
    /// * `Ok(HistoryStore)` if successful
    /// * `Err(AppError)` if connection failed
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        // Ensure parent directory exists
        if let Some(parent) = PathBuf::from(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Storage(format!("Failed to create db directory: {}", e))
                })?;
            }
        }

        // SQLite connection string format: sqlite:path/to/db.db
        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AppError::Storage(format!("Invalid database path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to connect to database: {}", e)))?;

        info!("Connected to SQLite database at: {}", db_path);

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), AppError> {
        let migration_sql = include_str!("../../migrations/001_create_history.sql");

        // Strip comments so statements can be split on ';'
        let mut cleaned_sql = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let without_comments = match trimmed.find("--") {
                Some(comment_pos) => &trimmed[..comment_pos],
                None => trimmed,
            };
            cleaned_sql.push_str(without_comments.trim());
            cleaned_sql.push(' ');
        }

        for statement in cleaned_sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::Storage(format!(
                        "Migration failed: {} - Statement: {}",
                        e,
                        statement.chars().take(100).collect::<String>()
                    ))
                })?;
        }

        debug!("History migrations applied");
        Ok(())
    }

    /// Append one turn, returning its sequence number
    pub async fn append(
        &self,
        model: &str,
        user_id: UserId,
        content: &str,
        timestamp: i64,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO history (model, user_id, message, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(model)
        .bind(user_id)
        .bind(content)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to append turn: {}", e)))?;

        let seq = result.last_insert_rowid();
        debug!(model = %model, user_id = user_id, seq = seq, "Appended turn");
        Ok(seq)
    }

    /// Append the user turn and the assistant turn of one exchange
    ///
    /// Both rows are written in a single transaction. A failed second insert
    /// rolls the first one back; if that rollback fails the history is left
    /// with a dangling user turn and `HistoryInconsistent` is returned.
    pub async fn append_exchange(
        &self,
        model: &str,
        user_id: UserId,
        user_content: &str,
        assistant_content: &str,
        timestamp: i64,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("INSERT INTO history (model, user_id, message, timestamp) VALUES (?, ?, ?, ?)")
            .bind(model)
            .bind(user_id)
            .bind(user_content)
            .bind(timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to append user turn: {}", e)))?;

        let second = sqlx::query(
            "INSERT INTO history (model, user_id, message, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(model)
        .bind(user_id)
        .bind(assistant_content)
        .bind(timestamp)
        .execute(&mut *tx)
        .await;

        if let Err(e) = second {
            error!(model = %model, user_id = user_id, error = %e, "Assistant turn write failed");
            return match tx.rollback().await {
                Ok(()) => Err(AppError::Storage(format!(
                    "Failed to append assistant turn: {}",
                    e
                ))),
                Err(rollback_err) => Err(AppError::HistoryInconsistent(format!(
                    "assistant turn failed ({}) and rollback failed ({})",
                    e, rollback_err
                ))),
            };
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to commit exchange: {}", e)))?;

        debug!(model = %model, user_id = user_id, "Persisted exchange");
        Ok(())
    }

    /// Get all turns of a conversation, oldest first
    pub async fn fetch_conversation(
        &self,
        model: &str,
        user_id: UserId,
    ) -> Result<Vec<Turn>, AppError> {
        sqlx::query_as::<_, Turn>(
            "SELECT seq, model, user_id, message, timestamp FROM history WHERE model = ? AND user_id = ? ORDER BY seq ASC",
        )
        .bind(model)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to fetch conversation: {}", e)))
    }

    /// Remove the two most recent turns of a conversation
    ///
    /// Returns the number of removed turns (0, 1 or 2).
    pub async fn delete_last_exchange(
        &self,
        model: &str,
        user_id: UserId,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM history WHERE seq IN (SELECT seq FROM history WHERE model = ? AND user_id = ? ORDER BY seq DESC LIMIT 2)",
        )
        .bind(model)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to delete last exchange: {}", e)))?;

        debug!(
            model = %model,
            user_id = user_id,
            removed = result.rows_affected(),
            "Deleted last exchange"
        );
        Ok(result.rows_affected())
    }

    /// Delete all turns of a user, optionally only those with one model
    pub async fn clear(&self, user_id: UserId, model: Option<&str>) -> Result<u64, AppError> {
        let result = match model {
            Some(model) => {
                sqlx::query("DELETE FROM history WHERE user_id = ? AND model = ?")
                    .bind(user_id)
                    .bind(model)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM history WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(|e| AppError::Storage(format!("Failed to clear history: {}", e)))?;

        info!(
            user_id = user_id,
            model = model.unwrap_or("*"),
            removed = result.rows_affected(),
            "Cleared history"
        );
        Ok(result.rows_affected())
    }

    /// Model of the user's most recent turn across all models
    pub async fn last_model_for_user(&self, user_id: UserId) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            "SELECT model FROM history WHERE user_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to look up last model: {}", e)))
    }

    /// Close the pool, waiting for in-flight queries
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
