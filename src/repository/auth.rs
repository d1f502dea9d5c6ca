use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{is_unique_violation, RepositoryError, Store};
use crate::db::models::User;

/// Credential and session storage on the `users` table.
#[async_trait]
pub trait AuthRepository: Send + Sync {
    /// Insert a user with an already-hashed password. Returns the new id.
    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<i64, RepositoryError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Overwrites whatever token the user held before.
    async fn save_token(
        &self,
        username: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    /// Clears token and expiry. Unknown tokens are not an error.
    async fn delete_token(&self, token: &str) -> Result<(), RepositoryError>;

    /// Clears every token that expired at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

const USER_COLUMNS: &str = "id, email, username, posts, password, token, expiration_time";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        posts: row.get(3)?,
        password_hash: row.get(4)?,
        token: row.get(5)?,
        expires_at: row.get(6)?,
    })
}

/// SQLite implementation
pub struct SqliteAuthRepository {
    store: Store,
}

impl SqliteAuthRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthRepository for SqliteAuthRepository {
    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<i64, RepositoryError> {
        let conn = self.store.conn()?;

        match conn.execute(
            "INSERT INTO users (email, username, password) VALUES (?1, ?2, ?3)",
            params![email, username, password_hash],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::Conflict(
                "user already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.store.conn()?;

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    async fn save_token(
        &self,
        username: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.store.conn()?;

        let rows = conn.execute(
            "UPDATE users SET token = ?1, expiration_time = ?2 WHERE username = ?3",
            params![token, expires_at, username],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("user {}", username)));
        }
        Ok(())
    }

    async fn user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.store.conn()?;

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE token = ?1"),
                params![token],
                user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    async fn delete_token(&self, token: &str) -> Result<(), RepositoryError> {
        let conn = self.store.conn()?;

        conn.execute(
            "UPDATE users SET token = NULL, expiration_time = NULL WHERE token = ?1",
            params![token],
        )?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let conn = self.store.conn()?;

        let rows = conn.execute(
            "UPDATE users SET token = NULL, expiration_time = NULL
             WHERE token IS NOT NULL AND expiration_time <= ?1",
            params![now],
        )?;

        Ok(rows as u64)
    }
}
