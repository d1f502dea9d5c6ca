use std::sync::Arc;

use super::{ServiceError, ServiceResult};
use crate::db::models::{Commentary, NewCommentary};
use crate::repository::CommentaryRepository;
use crate::validation;

pub struct CommentaryService {
    repo: Arc<dyn CommentaryRepository>,
}

impl CommentaryService {
    pub fn new(repo: Arc<dyn CommentaryRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_commentary(&self, commentary: NewCommentary) -> ServiceResult<i64> {
        let commentary = NewCommentary {
            content: validation::check_comment(&commentary.content)?.to_string(),
            ..commentary
        };

        let id = self.repo.create_commentary(&commentary).await?;
        tracing::debug!(
            "{} commented on post {} ({})",
            commentary.author,
            commentary.post_id,
            id
        );
        Ok(id)
    }

    pub async fn commentary_by_id(&self, id: i64) -> ServiceResult<Commentary> {
        self.repo
            .commentary_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("commentary {id} not found")))
    }

    pub async fn commentaries_by_post(&self, post_id: i64) -> ServiceResult<Vec<Commentary>> {
        Ok(self.repo.commentaries_by_post(post_id).await?)
    }
}
