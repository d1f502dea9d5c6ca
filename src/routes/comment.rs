use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::post;
use axum::Router;

use super::see_other;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::vote::{Reaction, VoteTarget};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comment/like/{id}", post(like))
        .route("/comment/dislike/{id}", post(dislike))
}

/// Toggles and sends the voter back to the commentary's post.
async fn toggle(
    state: &AppState,
    id: i64,
    username: &str,
    reaction: Reaction,
) -> AppResult<Response> {
    let service = &state.service;
    let commentary = service.commentaries.commentary_by_id(id).await?;

    service
        .votes
        .toggle(VoteTarget::Commentary(id), username, reaction)
        .await?;

    Ok(see_other(&format!("/post/{}", commentary.post_id), None))
}

/// POST /comment/like/{id}
async fn like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    toggle(&state, id, &user.username, Reaction::Like).await
}

/// POST /comment/dislike/{id}
async fn dislike(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    toggle(&state, id, &user.username, Reaction::Dislike).await
}
