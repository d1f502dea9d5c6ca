use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub posts: i64,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl User {
    /// True when the session carried by this row is no longer usable at `now`.
    pub fn session_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => true,
        }
    }
}

/// Registration payload, straight from the signup form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(rename = "confirm-password")]
    pub confirm_password: String,
}

/// Result of a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author: String,
    pub title: String,
    pub content: String,
    pub creation_time: DateTime<Utc>,
    pub categories: Vec<String>,
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author: String,
    pub title: String,
    pub content: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commentary {
    pub id: i64,
    pub post_id: i64,
    pub author: String,
    pub content: String,
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, Clone)]
pub struct NewCommentary {
    pub post_id: i64,
    pub author: String,
    pub content: String,
}
