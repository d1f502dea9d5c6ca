use std::sync::Arc;

use super::{ServiceError, ServiceResult};
use crate::db::models::{NewPost, Post};
use crate::repository::{PostOrder, PostRepository};
use crate::validation;

/// One recognized filter dimension from the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Category(String),
    Order(PostOrder),
}

impl PostFilter {
    /// Validates every directive and honors the first one. Dimensions do not
    /// compose.
    pub fn parse(directives: &[(String, String)]) -> ServiceResult<Self> {
        let filters = directives
            .iter()
            .map(|(key, value)| Self::parse_one(key, value))
            .collect::<ServiceResult<Vec<_>>>()?;

        if filters.len() > 1 {
            tracing::debug!(
                "Ignoring {} filter directive(s) after the first",
                filters.len() - 1
            );
        }
        Ok(filters.into_iter().next().unwrap_or(PostFilter::All))
    }

    fn parse_one(key: &str, value: &str) -> ServiceResult<Self> {
        match (key, value) {
            ("category", name) => Ok(PostFilter::Category(name.trim().to_string())),
            ("time", "new") => Ok(PostFilter::Order(PostOrder::Newest)),
            ("time", "old") => Ok(PostFilter::Order(PostOrder::Oldest)),
            ("vote", "like") => Ok(PostFilter::Order(PostOrder::MostLiked)),
            ("vote", "dislike") => Ok(PostFilter::Order(PostOrder::MostDisliked)),
            ("clean", "true") => Ok(PostFilter::All),
            _ => Err(ServiceError::InvalidQuery(format!("{key}={value}"))),
        }
    }
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostRepository>) -> Self {
        Self { repo }
    }

    /// Validates and stores the post. Title and content are stored trimmed.
    pub async fn create_post(&self, post: NewPost) -> ServiceResult<i64> {
        let post = NewPost {
            title: validation::check_title(&post.title)?.to_string(),
            content: validation::check_post_content(&post.content)?.to_string(),
            categories: validation::normalize_categories(&post.categories),
            author: post.author,
        };

        let id = self.repo.create_post(&post).await?;
        tracing::info!("{} created post {}", post.author, id);
        Ok(id)
    }

    pub async fn all_posts(&self) -> ServiceResult<Vec<Post>> {
        let posts = self.repo.posts(PostOrder::Default).await?;
        self.with_categories(posts).await
    }

    pub async fn post_by_id(&self, id: i64) -> ServiceResult<Post> {
        let mut post = self
            .repo
            .post_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {id} not found")))?;
        post.categories = self.repo.categories_of(id).await?;
        Ok(post)
    }

    pub async fn filter(&self, directives: &[(String, String)]) -> ServiceResult<Vec<Post>> {
        let posts = match PostFilter::parse(directives)? {
            PostFilter::All => self.repo.posts(PostOrder::Default).await?,
            PostFilter::Category(name) => self.repo.posts_by_category(&name).await?,
            PostFilter::Order(order) => self.repo.posts(order).await?,
        };
        self.with_categories(posts).await
    }

    async fn with_categories(&self, mut posts: Vec<Post>) -> ServiceResult<Vec<Post>> {
        for post in &mut posts {
            post.categories = self.repo.categories_of(post.id).await?;
        }
        Ok(posts)
    }
}
