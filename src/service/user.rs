use std::sync::Arc;

use super::{ServiceError, ServiceResult};
use crate::db::models::{Post, User};
use crate::repository::UserRepository;
use crate::vote::Reaction;

/// Which of a user's posts the profile lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilePosts {
    #[default]
    Created,
    Liked,
    Disliked,
    Commented,
}

impl ProfilePosts {
    /// Same rules as the home filter: all directives must be valid, the
    /// first one wins.
    pub fn parse(directives: &[(String, String)]) -> ServiceResult<Self> {
        let selections = directives
            .iter()
            .map(|(key, value)| match (key.as_str(), value.as_str()) {
                ("posts", "created") => Ok(ProfilePosts::Created),
                ("posts", "liked") => Ok(ProfilePosts::Liked),
                ("posts", "disliked") => Ok(ProfilePosts::Disliked),
                ("posts", "commented") => Ok(ProfilePosts::Commented),
                _ => Err(ServiceError::InvalidQuery(format!("{key}={value}"))),
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        Ok(selections.into_iter().next().unwrap_or_default())
    }
}

pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    pub async fn user_by_username(&self, username: &str) -> ServiceResult<User> {
        self.repo
            .user_by_username(username)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {username} not found")))
    }

    pub async fn posts_by_username(
        &self,
        username: &str,
        directives: &[(String, String)],
    ) -> ServiceResult<Vec<Post>> {
        let selection = ProfilePosts::parse(directives)?;
        let user = self.user_by_username(username).await?;

        let mut posts = match selection {
            ProfilePosts::Created => self.repo.posts_by_author(&user.username).await?,
            ProfilePosts::Liked => {
                self.repo
                    .posts_reacted_by(&user.username, Reaction::Like)
                    .await?
            }
            ProfilePosts::Disliked => {
                self.repo
                    .posts_reacted_by(&user.username, Reaction::Dislike)
                    .await?
            }
            ProfilePosts::Commented => self.repo.posts_commented_by(&user.username).await?,
        };

        for post in &mut posts {
            post.categories = self.repo.categories_of(post.id).await?;
        }
        Ok(posts)
    }
}
