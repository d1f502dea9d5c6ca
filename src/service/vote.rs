use std::collections::BTreeMap;
use std::sync::Arc;

use super::ServiceResult;
use crate::repository::VoteRepository;
use crate::vote::{Reaction, VoteState, VoteTarget};

/// The only writer of vote rows and vote counters. Every toggle is a single
/// transaction in the repository; nothing is retried here.
pub struct VoteLedger {
    repo: Arc<dyn VoteRepository>,
}

impl VoteLedger {
    pub fn new(repo: Arc<dyn VoteRepository>) -> Self {
        Self { repo }
    }

    pub async fn toggle(
        &self,
        target: VoteTarget,
        username: &str,
        reaction: Reaction,
    ) -> ServiceResult<VoteState> {
        Ok(self.repo.toggle(target, username, reaction).await?)
    }

    pub async fn like_post(&self, post_id: i64, username: &str) -> ServiceResult<VoteState> {
        self.toggle(VoteTarget::Post(post_id), username, Reaction::Like)
            .await
    }

    pub async fn dislike_post(&self, post_id: i64, username: &str) -> ServiceResult<VoteState> {
        self.toggle(VoteTarget::Post(post_id), username, Reaction::Dislike)
            .await
    }

    pub async fn like_commentary(
        &self,
        commentary_id: i64,
        username: &str,
    ) -> ServiceResult<VoteState> {
        self.toggle(VoteTarget::Commentary(commentary_id), username, Reaction::Like)
            .await
    }

    pub async fn dislike_commentary(
        &self,
        commentary_id: i64,
        username: &str,
    ) -> ServiceResult<VoteState> {
        self.toggle(
            VoteTarget::Commentary(commentary_id),
            username,
            Reaction::Dislike,
        )
        .await
    }

    pub async fn state_of(&self, target: VoteTarget, username: &str) -> ServiceResult<VoteState> {
        Ok(self.repo.state_of(target, username).await?)
    }

    pub async fn post_likes(&self, post_id: i64) -> ServiceResult<Vec<String>> {
        Ok(self
            .repo
            .voters(VoteTarget::Post(post_id), Reaction::Like)
            .await?)
    }

    pub async fn post_dislikes(&self, post_id: i64) -> ServiceResult<Vec<String>> {
        Ok(self
            .repo
            .voters(VoteTarget::Post(post_id), Reaction::Dislike)
            .await?)
    }

    /// Likers of each commentary under `post_id`.
    pub async fn commentary_likes(
        &self,
        post_id: i64,
    ) -> ServiceResult<BTreeMap<i64, Vec<String>>> {
        Ok(self.repo.commentary_voters(post_id, Reaction::Like).await?)
    }

    /// Dislikers of each commentary under `post_id`.
    pub async fn commentary_dislikes(
        &self,
        post_id: i64,
    ) -> ServiceResult<BTreeMap<i64, Vec<String>>> {
        Ok(self
            .repo
            .commentary_voters(post_id, Reaction::Dislike)
            .await?)
    }
}
