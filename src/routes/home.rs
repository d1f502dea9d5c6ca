use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::models::{Post, User};
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::state::AppState;

/// What the home page renders from.
#[derive(Debug, Serialize)]
pub struct HomeView {
    pub user: Option<User>,
    pub posts: Vec<Post>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// GET /: posts, narrowed by at most one filter directive
async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(directives): Query<Vec<(String, String)>>,
) -> AppResult<Json<HomeView>> {
    let posts = state.service.posts.filter(&directives).await?;
    Ok(Json(HomeView { user, posts }))
}
