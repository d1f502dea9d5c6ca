use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};

use super::{is_foreign_key_violation, RepositoryError, Store};
use crate::db::models::{Commentary, NewCommentary};

#[async_trait]
pub trait CommentaryRepository: Send + Sync {
    async fn create_commentary(&self, commentary: &NewCommentary) -> Result<i64, RepositoryError>;

    async fn commentary_by_id(&self, id: i64) -> Result<Option<Commentary>, RepositoryError>;

    async fn commentaries_by_post(&self, post_id: i64) -> Result<Vec<Commentary>, RepositoryError>;
}

fn commentary_from_row(row: &Row<'_>) -> rusqlite::Result<Commentary> {
    Ok(Commentary {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author: row.get(2)?,
        content: row.get(3)?,
        likes: row.get(4)?,
        dislikes: row.get(5)?,
    })
}

/// SQLite implementation
pub struct SqliteCommentaryRepository {
    store: Store,
}

impl SqliteCommentaryRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommentaryRepository for SqliteCommentaryRepository {
    async fn create_commentary(&self, commentary: &NewCommentary) -> Result<i64, RepositoryError> {
        let conn = self.store.conn()?;

        match conn.execute(
            "INSERT INTO commentaries (post_id, author, content) VALUES (?1, ?2, ?3)",
            params![commentary.post_id, commentary.author, commentary.content],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_foreign_key_violation(&e) => Err(RepositoryError::NotFound(format!(
                "post {}",
                commentary.post_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn commentary_by_id(&self, id: i64) -> Result<Option<Commentary>, RepositoryError> {
        let conn = self.store.conn()?;

        let commentary = conn
            .query_row(
                "SELECT id, post_id, author, content, likes, dislikes
                 FROM commentaries WHERE id = ?1",
                params![id],
                commentary_from_row,
            )
            .optional()?;

        Ok(commentary)
    }

    async fn commentaries_by_post(&self, post_id: i64) -> Result<Vec<Commentary>, RepositoryError> {
        let conn = self.store.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, post_id, author, content, likes, dislikes
             FROM commentaries WHERE post_id = ?1 ORDER BY id",
        )?;
        let commentaries = stmt
            .query_map(params![post_id], commentary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(commentaries)
    }
}
