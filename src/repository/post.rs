use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Params, Row, TransactionBehavior};

use super::{is_foreign_key_violation, RepositoryError, Store};
use crate::db::models::{NewPost, Post};

/// Orderings the post listing supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrder {
    /// Newest first by insertion (stable).
    Default,
    Newest,
    Oldest,
    MostLiked,
    MostDisliked,
}

impl PostOrder {
    fn sql(self) -> &'static str {
        match self {
            PostOrder::Default => "id DESC",
            PostOrder::Newest => "creation_time DESC, id DESC",
            PostOrder::Oldest => "creation_time ASC, id ASC",
            PostOrder::MostLiked => "likes DESC, id DESC",
            PostOrder::MostDisliked => "dislikes DESC, id DESC",
        }
    }
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Inserts the post and its categories and bumps the author's post count,
    /// all or nothing. Returns the new id.
    async fn create_post(&self, post: &NewPost) -> Result<i64, RepositoryError>;

    async fn posts(&self, order: PostOrder) -> Result<Vec<Post>, RepositoryError>;

    async fn post_by_id(&self, id: i64) -> Result<Option<Post>, RepositoryError>;

    async fn posts_by_category(&self, category: &str) -> Result<Vec<Post>, RepositoryError>;

    async fn categories_of(&self, post_id: i64) -> Result<Vec<String>, RepositoryError>;
}

pub(crate) const POST_COLUMNS: &str = "id, author, title, content, creation_time, likes, dislikes";

/// Maps a row selected with [`POST_COLUMNS`]. Categories are filled in by the
/// caller.
pub(crate) fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        creation_time: row.get(4)?,
        categories: Vec::new(),
        likes: row.get(5)?,
        dislikes: row.get(6)?,
    })
}

pub(crate) fn query_posts<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Post>, RepositoryError> {
    let mut stmt = conn.prepare(sql)?;
    let posts = stmt
        .query_map(params, post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub(crate) fn load_categories(
    conn: &Connection,
    post_id: i64,
) -> Result<Vec<String>, RepositoryError> {
    let mut stmt =
        conn.prepare("SELECT category FROM post_categories WHERE post_id = ?1 ORDER BY rowid")?;
    let categories = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(categories)
}

/// SQLite implementation
pub struct SqlitePostRepository {
    store: Store,
}

impl SqlitePostRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create_post(&self, post: &NewPost) -> Result<i64, RepositoryError> {
        let mut conn = self.store.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO posts (author, title, content, creation_time) VALUES (?1, ?2, ?3, ?4)",
            params![post.author, post.title, post.content, Utc::now()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(RepositoryError::NotFound(format!("user {}", post.author)));
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE users SET posts = posts + 1 WHERE username = ?1",
            params![post.author],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO post_categories (post_id, category) VALUES (?1, ?2)",
            )?;
            for category in &post.categories {
                stmt.execute(params![id, category])?;
            }
        }

        tx.commit()?;
        Ok(id)
    }

    async fn posts(&self, order: PostOrder) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.store.conn()?;
        query_posts(
            &conn,
            &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY {}", order.sql()),
            [],
        )
    }

    async fn post_by_id(&self, id: i64) -> Result<Option<Post>, RepositoryError> {
        let conn = self.store.conn()?;

        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                post_from_row,
            )
            .optional()?;

        Ok(post)
    }

    async fn posts_by_category(&self, category: &str) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.store.conn()?;
        query_posts(
            &conn,
            &format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE id IN (SELECT post_id FROM post_categories WHERE category = ?1)
                 ORDER BY {}",
                PostOrder::Default.sql()
            ),
            params![category],
        )
    }

    async fn categories_of(&self, post_id: i64) -> Result<Vec<String>, RepositoryError> {
        let conn = self.store.conn()?;
        load_categories(&conn, post_id)
    }
}
