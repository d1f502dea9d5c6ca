// Repository pattern - isolates all database side effects
pub mod auth;
pub mod commentary;
pub mod post;
pub mod user;
pub mod vote;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode};
use thiserror::Error;

use crate::db;
use crate::state::DbPool;

pub use auth::{AuthRepository, SqliteAuthRepository};
pub use commentary::{CommentaryRepository, SqliteCommentaryRepository};
pub use post::{PostOrder, PostRepository, SqlitePostRepository};
pub use user::{SqliteUserRepository, UserRepository};
pub use vote::{SqliteVoteRepository, VoteRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    #[error("Deadline exceeded")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::OperationInterrupted | ErrorCode::DatabaseBusy
                ) =>
            {
                RepositoryError::Timeout
            }
            _ => RepositoryError::Sql(e),
        }
    }
}

/// True when `e` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// True when `e` is a FOREIGN KEY constraint violation.
pub(crate) fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// Number of VM instructions between deadline checks.
const PROGRESS_STEP: i32 = 1_000;

/// Connection pool plus the per-call deadline every repository honors.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    timeout: Duration,
}

impl Store {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Checks out a connection that stops working once the call deadline
    /// passes. Dropping the guard lifts the deadline before the connection
    /// goes back to the pool.
    pub fn conn(&self) -> Result<ScopedConnection, RepositoryError> {
        let deadline = Instant::now() + self.timeout;
        let conn = self.pool.get_timeout(self.timeout)?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RepositoryError::Timeout);
        }
        conn.busy_timeout(remaining)?;
        conn.progress_handler(PROGRESS_STEP, Some(move || Instant::now() >= deadline));

        Ok(ScopedConnection { conn })
    }
}

/// A pooled connection bound to a deadline.
pub struct ScopedConnection {
    conn: PooledConnection<SqliteConnectionManager>,
}

impl Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
        // Back to the pool-wide default set at connection init
        let _ = self.conn.busy_timeout(db::BUSY_TIMEOUT);
    }
}

/// All storage capabilities behind trait objects, so services can be wired
/// to SQLite or to fakes.
#[derive(Clone)]
pub struct Repository {
    pub auth: Arc<dyn AuthRepository>,
    pub post: Arc<dyn PostRepository>,
    pub commentary: Arc<dyn CommentaryRepository>,
    pub vote: Arc<dyn VoteRepository>,
    pub user: Arc<dyn UserRepository>,
}

impl Repository {
    pub fn sqlite(pool: DbPool, timeout: Duration) -> Self {
        let store = Store::new(pool, timeout);
        Self {
            auth: Arc::new(SqliteAuthRepository::new(store.clone())),
            post: Arc::new(SqlitePostRepository::new(store.clone())),
            commentary: Arc::new(SqliteCommentaryRepository::new(store.clone())),
            vote: Arc::new(SqliteVoteRepository::new(store.clone())),
            user: Arc::new(SqliteUserRepository::new(store)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_interrupts_long_statement() {
        let (store, _tmp) = testing::store_with_timeout(Duration::from_millis(50));
        let conn = store.conn().unwrap();

        let result: Result<i64, rusqlite::Error> = conn.query_row(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000000000)
             SELECT COUNT(*) FROM c",
            [],
            |row| row.get(0),
        );
        let err = result.unwrap_err();
        assert!(matches!(RepositoryError::from(err), RepositoryError::Timeout));
    }

    fn busy_timeout_ms(conn: &Connection) -> i64 {
        conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn busy_timeout_is_restored_when_guard_drops() {
        let (store, _tmp) = testing::store_with_timeout(Duration::from_millis(500));
        let expected = db::BUSY_TIMEOUT.as_millis() as i64;
        assert_eq!(busy_timeout_ms(&store.pool().get().unwrap()), expected);

        let conn = store.conn().unwrap();
        assert!(busy_timeout_ms(&conn) <= 500);
        drop(conn);

        assert_eq!(busy_timeout_ms(&store.pool().get().unwrap()), expected);
    }

    #[test]
    fn deadline_is_lifted_when_guard_drops() {
        let (store, _tmp) = testing::store_with_timeout(Duration::from_millis(20));
        drop(store.conn().unwrap());
        std::thread::sleep(Duration::from_millis(40));

        // Same pooled connection, deadline long gone, must still run queries
        let conn = store.pool().get().unwrap();
        let n: i64 = conn
            .query_row(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 50000)
                 SELECT COUNT(*) FROM c",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 50000);
    }

    #[test]
    fn unique_violation_is_detected() {
        let (store, _tmp) = testing::store();
        testing::insert_user(&store, "alice");
        let conn = store.conn().unwrap();
        let err = conn
            .execute(
                "INSERT INTO users (email, username, password) VALUES ('x@y.z', 'alice', 'h')",
                [],
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_foreign_key_violation(&err));
    }
}
