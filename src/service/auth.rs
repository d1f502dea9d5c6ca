use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use super::{ServiceError, ServiceResult};
use crate::db::models::{NewUser, Session, User};
use crate::repository::AuthRepository;
use crate::validation;

/// Same message for unknown users and bad passwords.
const NO_SUCH_USER: &str = "user not found";

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Runs a bcrypt operation off the async workers.
async fn bcrypt_blocking<T, F>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> bcrypt::BcryptResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal(format!("bcrypt task failed: {e}")))?
        .map_err(|e| ServiceError::Internal(format!("bcrypt: {e}")))
}

/// Owns user identity: registration and password checks.
pub struct CredentialStore {
    repo: Arc<dyn AuthRepository>,
    cost: u32,
    dummy_hash: OnceLock<String>,
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn AuthRepository>, cost: u32) -> Self {
        Self {
            repo,
            cost,
            dummy_hash: OnceLock::new(),
        }
    }

    pub async fn register(&self, new_user: NewUser) -> ServiceResult<User> {
        validation::check_registration(&new_user)?;

        if self.repo.user_by_username(&new_user.username).await?.is_some() {
            return Err(ServiceError::Conflict("username already taken".into()));
        }

        let cost = self.cost;
        let password = new_user.password;
        let hash = bcrypt_blocking(move || bcrypt::hash(password, cost)).await?;

        self.repo
            .create_user(&new_user.email, &new_user.username, &hash)
            .await?;
        tracing::info!("Registered user {}", new_user.username);

        self.repo
            .user_by_username(&new_user.username)
            .await?
            .ok_or_else(|| ServiceError::Internal("registered user vanished".into()))
    }

    /// Returns the user when `password` matches. Unknown users are checked
    /// against a throwaway hash so both failures cost one bcrypt verify.
    pub async fn verify(&self, username: &str, password: &str) -> ServiceResult<User> {
        let user = self.repo.user_by_username(username).await?;

        let hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash().await?,
        };
        let password = password.to_string();
        let matches = bcrypt_blocking(move || bcrypt::verify(password, &hash)).await?;

        match user {
            Some(user) if matches => Ok(user),
            _ => Err(ServiceError::NotFound(NO_SUCH_USER.into())),
        }
    }

    async fn dummy_hash(&self) -> ServiceResult<String> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash.clone());
        }
        let cost = self.cost;
        let hash = bcrypt_blocking(move || bcrypt::hash("not a real password", cost)).await?;
        Ok(self.dummy_hash.get_or_init(|| hash).clone())
    }
}

/// Issues, resolves and revokes the session token stored on the user row.
pub struct SessionManager {
    repo: Arc<dyn AuthRepository>,
    credentials: Arc<CredentialStore>,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new(
        repo: Arc<dyn AuthRepository>,
        credentials: Arc<CredentialStore>,
        lifetime: Duration,
    ) -> Self {
        Self {
            repo,
            credentials,
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub async fn issue(&self, username: &str, password: &str) -> ServiceResult<Session> {
        self.issue_at(username, password, Utc::now()).await
    }

    /// Signs the user in, replacing any token they held.
    pub async fn issue_at(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Session> {
        let user = self.credentials.verify(username, password).await?;

        let token = generate_token();
        let expires_at = now + self.lifetime;
        self.repo
            .save_token(&user.username, &token, expires_at)
            .await?;

        tracing::debug!("Issued session for {}", user.username);
        Ok(Session {
            username: user.username,
            token,
            expires_at,
        })
    }

    pub async fn resolve(&self, token: &str) -> ServiceResult<Option<User>> {
        self.resolve_at(token, Utc::now()).await
    }

    /// `None` for unknown tokens. An expired token is revoked on the spot.
    pub async fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> ServiceResult<Option<User>> {
        let Some(user) = self.repo.user_by_token(token).await? else {
            return Ok(None);
        };

        if user.session_expired(now) {
            tracing::debug!("Session for {} expired, revoking", user.username);
            self.repo.delete_token(token).await?;
            return Ok(None);
        }

        Ok(Some(user))
    }

    pub async fn revoke(&self, token: &str) -> ServiceResult<()> {
        self.repo.delete_token(token).await?;
        Ok(())
    }

    /// Clears every token that expired at or before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        Ok(self.repo.purge_expired(now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory users table.
    #[derive(Default)]
    struct FakeAuthRepository {
        users: Mutex<Vec<User>>,
    }

    #[async_trait]
    impl AuthRepository for FakeAuthRepository {
        async fn create_user(
            &self,
            email: &str,
            username: &str,
            password_hash: &str,
        ) -> Result<i64, RepositoryError> {
            let mut users = self.users.lock().unwrap();
            if users
                .iter()
                .any(|u| u.username == username || u.email == email)
            {
                return Err(RepositoryError::Conflict("user already exists".into()));
            }
            let id = users.len() as i64 + 1;
            users.push(User {
                id,
                email: email.into(),
                username: username.into(),
                posts: 0,
                password_hash: password_hash.into(),
                token: None,
                expires_at: None,
            });
            Ok(id)
        }

        async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.username == username).cloned())
        }

        async fn save_token(
            &self,
            username: &str,
            token: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            let mut users = self.users.lock().unwrap();
            let user = users
                .iter_mut()
                .find(|u| u.username == username)
                .ok_or_else(|| RepositoryError::NotFound(format!("user {username}")))?;
            user.token = Some(token.into());
            user.expires_at = Some(expires_at);
            Ok(())
        }

        async fn user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
            let users = self.users.lock().unwrap();
            Ok(users
                .iter()
                .find(|u| u.token.as_deref() == Some(token))
                .cloned())
        }

        async fn delete_token(&self, token: &str) -> Result<(), RepositoryError> {
            let mut users = self.users.lock().unwrap();
            for user in users.iter_mut() {
                if user.token.as_deref() == Some(token) {
                    user.token = None;
                    user.expires_at = None;
                }
            }
            Ok(())
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
            let mut users = self.users.lock().unwrap();
            let mut purged = 0;
            for user in users.iter_mut() {
                if user.token.is_some() && user.session_expired(now) {
                    user.token = None;
                    user.expires_at = None;
                    purged += 1;
                }
            }
            Ok(purged)
        }
    }

    fn setup() -> (Arc<FakeAuthRepository>, Arc<CredentialStore>, SessionManager) {
        let repo = Arc::new(FakeAuthRepository::default());
        let credentials = Arc::new(CredentialStore::new(repo.clone(), 4));
        let sessions = SessionManager::new(repo.clone(), credentials.clone(), Duration::hours(12));
        (repo, credentials, sessions)
    }

    fn new_user(username: &str, password: &str, confirm: &str) -> NewUser {
        NewUser {
            email: format!("{username}@example.com"),
            username: username.into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[tokio::test]
    async fn register_stores_a_hash_not_the_password() {
        let (repo, credentials, _) = setup();

        let user = credentials
            .register(new_user("alice", "secret", "secret"))
            .await
            .unwrap();

        assert_eq!(user.username, "alice");
        let stored = repo.user_by_username("alice").await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "secret");
        assert!(bcrypt::verify("secret", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let (_, credentials, _) = setup();
        credentials
            .register(new_user("alice", "pw", "pw"))
            .await
            .unwrap();

        let same_name = credentials.register(new_user("alice", "pw", "pw")).await;
        assert!(matches!(same_name, Err(ServiceError::Conflict(_))));

        let mut same_email = new_user("alice2", "pw", "pw");
        same_email.email = "alice@example.com".into();
        let result = credentials.register(same_email).await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn register_validates_before_touching_storage() {
        let (repo, credentials, _) = setup();

        let mismatch = credentials.register(new_user("alice", "a", "b")).await;
        assert!(matches!(
            mismatch,
            Err(ServiceError::Validation(validation::ValidationError::PasswordMismatch))
        ));

        let empty = credentials.register(new_user("", "a", "a")).await;
        assert!(matches!(empty, Err(ServiceError::Validation(_))));

        let long = credentials
            .register(new_user(&"x".repeat(36), "a", "a"))
            .await;
        assert!(matches!(
            long,
            Err(ServiceError::Validation(validation::ValidationError::UsernameLength))
        ));

        assert!(repo.users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn verify_failures_look_the_same() {
        let (_, credentials, _) = setup();
        credentials
            .register(new_user("alice", "secret", "secret"))
            .await
            .unwrap();

        let wrong = credentials.verify("alice", "nope").await.unwrap_err();
        let unknown = credentials.verify("mallory", "secret").await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(wrong, ServiceError::NotFound(_)));
        assert!(matches!(unknown, ServiceError::NotFound(_)));

        assert_eq!(
            credentials.verify("alice", "secret").await.unwrap().username,
            "alice"
        );
    }

    #[tokio::test]
    async fn issued_token_resolves_to_user() {
        let (_, credentials, sessions) = setup();
        credentials
            .register(new_user("alice", "pw", "pw"))
            .await
            .unwrap();

        let now = Utc::now();
        let session = sessions.issue_at("alice", "pw", now).await.unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.expires_at, now + Duration::hours(12));

        let user = sessions.resolve_at(&session.token, now).await.unwrap();
        assert_eq!(user.map(|u| u.username), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn issue_with_bad_credentials_is_not_found() {
        let (_, credentials, sessions) = setup();
        credentials
            .register(new_user("alice", "pw", "pw"))
            .await
            .unwrap();

        assert!(matches!(
            sessions.issue("alice", "wrong").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            sessions.issue("nobody", "pw").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_token() {
        let (_, credentials, sessions) = setup();
        credentials
            .register(new_user("alice", "pw", "pw"))
            .await
            .unwrap();

        let first = sessions.issue("alice", "pw").await.unwrap();
        let second = sessions.issue("alice", "pw").await.unwrap();

        assert!(sessions.resolve(&first.token).await.unwrap().is_none());
        assert!(sessions.resolve(&second.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_token_is_anonymous_and_purged() {
        let (repo, credentials, sessions) = setup();
        credentials
            .register(new_user("alice", "pw", "pw"))
            .await
            .unwrap();

        let issued_at = Utc::now();
        let session = sessions.issue_at("alice", "pw", issued_at).await.unwrap();

        // The expiry instant itself already counts as expired
        let at_expiry = session.expires_at;
        assert!(sessions
            .resolve_at(&session.token, at_expiry)
            .await
            .unwrap()
            .is_none());

        let stored = repo.user_by_username("alice").await.unwrap().unwrap();
        assert!(stored.token.is_none());
        assert!(stored.expires_at.is_none());

        assert!(sessions
            .resolve_at(&session.token, issued_at)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (_, credentials, sessions) = setup();
        credentials
            .register(new_user("alice", "pw", "pw"))
            .await
            .unwrap();
        let session = sessions.issue("alice", "pw").await.unwrap();

        sessions.revoke(&session.token).await.unwrap();
        sessions.revoke(&session.token).await.unwrap();
        sessions.revoke("unknown").await.unwrap();

        assert!(sessions.resolve(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_expired_clears_only_stale_tokens() {
        let (_, credentials, sessions) = setup();
        for name in ["alice", "bob"] {
            credentials
                .register(new_user(name, "pw", "pw"))
                .await
                .unwrap();
        }
        let now = Utc::now();
        let stale = sessions
            .issue_at("alice", "pw", now - Duration::hours(13))
            .await
            .unwrap();
        let fresh = sessions.issue_at("bob", "pw", now).await.unwrap();

        assert_eq!(sessions.purge_expired(now).await.unwrap(), 1);
        assert!(sessions.resolve_at(&stale.token, now).await.unwrap().is_none());
        assert!(sessions.resolve_at(&fresh.token, now).await.unwrap().is_some());
    }
}
