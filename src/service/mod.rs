// Service layer - business rules on top of the repositories
pub mod auth;
pub mod commentary;
pub mod post;
pub mod user;
pub mod vote;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{AuthConfig, MAX_SESSION_HOURS};
use crate::repository::{Repository, RepositoryError};
use crate::validation::ValidationError;

pub use auth::{CredentialStore, SessionManager};
pub use commentary::CommentaryService;
pub use post::{PostFilter, PostService};
pub use user::{ProfilePosts, UserService};
pub use vote::VoteLedger;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => ServiceError::NotFound(format!("{what} not found")),
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Everything the HTTP layer talks to.
pub struct Service {
    pub credentials: Arc<CredentialStore>,
    pub sessions: SessionManager,
    pub posts: PostService,
    pub commentaries: CommentaryService,
    pub votes: VoteLedger,
    pub users: UserService,
}

impl Service {
    pub fn new(repo: Repository, auth: &AuthConfig) -> Self {
        let credentials = Arc::new(CredentialStore::new(repo.auth.clone(), auth.bcrypt_cost));
        let lifetime = chrono::Duration::hours(auth.session_hours.min(MAX_SESSION_HOURS) as i64);

        Self {
            sessions: SessionManager::new(repo.auth, credentials.clone(), lifetime),
            credentials,
            posts: PostService::new(repo.post),
            commentaries: CommentaryService::new(repo.commentary),
            votes: VoteLedger::new(repo.vote),
            users: UserService::new(repo.user),
        }
    }
}
