use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::models::{Post, User};
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::state::AppState;

/// What anyone may see of a profile owner. The email stays private.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub posts: i64,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            posts: user.posts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    /// Whoever is looking, if signed in.
    pub viewer: Option<User>,
    pub user: PublicUser,
    pub posts: Vec<Post>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/profile/{username}", get(show))
}

/// GET /profile/{username}?posts=created|liked|disliked|commented
async fn show(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
    Query(directives): Query<Vec<(String, String)>>,
) -> AppResult<Json<ProfileView>> {
    let users = &state.service.users;
    let posts = users.posts_by_username(&username, &directives).await?;
    let user = users.user_by_username(&username).await?;

    Ok(Json(ProfileView {
        viewer,
        user: user.into(),
        posts,
    }))
}
