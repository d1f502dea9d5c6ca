use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use super::auth::user_from_row;
use super::post::{load_categories, query_posts, POST_COLUMNS};
use super::{RepositoryError, Store};
use crate::db::models::{Post, User};
use crate::vote::Reaction;

/// Read side of the profile page.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Posts written by `username`, newest first.
    async fn posts_by_author(&self, username: &str) -> Result<Vec<Post>, RepositoryError>;

    /// Posts `username` currently holds `reaction` on.
    async fn posts_reacted_by(
        &self,
        username: &str,
        reaction: Reaction,
    ) -> Result<Vec<Post>, RepositoryError>;

    /// Posts `username` has commented on, each listed once.
    async fn posts_commented_by(&self, username: &str) -> Result<Vec<Post>, RepositoryError>;

    async fn categories_of(&self, post_id: i64) -> Result<Vec<String>, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteUserRepository {
    store: Store,
}

impl SqliteUserRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.store.conn()?;

        let user = conn
            .query_row(
                "SELECT id, email, username, posts, password, token, expiration_time
                 FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    async fn posts_by_author(&self, username: &str) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.store.conn()?;
        query_posts(
            &conn,
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE author = ?1 ORDER BY id DESC"),
            params![username],
        )
    }

    async fn posts_reacted_by(
        &self,
        username: &str,
        reaction: Reaction,
    ) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.store.conn()?;
        query_posts(
            &conn,
            &format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE id IN (SELECT post_id FROM {} WHERE username = ?1 AND post_id IS NOT NULL)
                 ORDER BY id DESC",
                reaction.table()
            ),
            params![username],
        )
    }

    async fn posts_commented_by(&self, username: &str) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.store.conn()?;
        query_posts(
            &conn,
            &format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE id IN (SELECT post_id FROM commentaries WHERE author = ?1)
                 ORDER BY id DESC"
            ),
            params![username],
        )
    }

    async fn categories_of(&self, post_id: i64) -> Result<Vec<String>, RepositoryError> {
        let conn = self.store.conn()?;
        load_categories(&conn, post_id)
    }
}
