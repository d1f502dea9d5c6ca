use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};

use super::see_other;
use crate::db::models::{Commentary, NewCommentary, NewPost, Post, User};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;
use crate::vote::{VoteState, VoteTarget};

#[derive(Debug, Serialize)]
pub struct CommentaryView {
    #[serde(flatten)]
    pub commentary: Commentary,
    pub liked_by: Vec<String>,
    pub disliked_by: Vec<String>,
}

/// Everything the single-post page shows.
#[derive(Debug, Serialize)]
pub struct PostView {
    pub user: Option<User>,
    pub post: Post,
    /// Viewer's own vote; absent for anonymous visitors.
    pub vote: Option<VoteState>,
    pub liked_by: Vec<String>,
    pub disliked_by: Vec<String>,
    pub commentaries: Vec<CommentaryView>,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub comment: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post/create", post(create))
        .route("/post/{id}", get(show).post(comment))
        .route("/post/like/{id}", post(like))
        .route("/post/dislike/{id}", post(dislike))
}

/// Splits the create form. `categories` may repeat.
fn new_post(author: String, fields: Vec<(String, String)>) -> NewPost {
    let mut post = NewPost {
        author,
        title: String::new(),
        content: String::new(),
        categories: Vec::new(),
    };
    for (key, value) in fields {
        match key.as_str() {
            "title" => post.title = value,
            "content" => post.content = value,
            "categories" => post.categories.push(value),
            _ => {}
        }
    }
    post
}

/// POST /post/create
async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let id = state
        .service
        .posts
        .create_post(new_post(user.username, fields))
        .await?;
    Ok(see_other(&format!("/post/{id}"), None))
}

/// GET /post/{id}
async fn show(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Json<PostView>> {
    let service = &state.service;
    let post = service.posts.post_by_id(id).await?;

    let vote = match &user {
        Some(user) => Some(
            service
                .votes
                .state_of(VoteTarget::Post(id), &user.username)
                .await?,
        ),
        None => None,
    };

    let mut likes = service.votes.commentary_likes(id).await?;
    let mut dislikes = service.votes.commentary_dislikes(id).await?;
    let commentaries = service
        .commentaries
        .commentaries_by_post(id)
        .await?
        .into_iter()
        .map(|commentary| CommentaryView {
            liked_by: likes.remove(&commentary.id).unwrap_or_default(),
            disliked_by: dislikes.remove(&commentary.id).unwrap_or_default(),
            commentary,
        })
        .collect();

    Ok(Json(PostView {
        user,
        vote,
        liked_by: service.votes.post_likes(id).await?,
        disliked_by: service.votes.post_dislikes(id).await?,
        commentaries,
        post,
    }))
}

/// POST /post/{id}: add a comment
async fn comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    state
        .service
        .commentaries
        .create_commentary(NewCommentary {
            post_id: id,
            author: user.username,
            content: form.comment,
        })
        .await?;
    Ok(see_other(&format!("/post/{id}"), None))
}

/// POST /post/like/{id}
async fn like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    state.service.votes.like_post(id, &user.username).await?;
    Ok(see_other(&format!("/post/{id}"), None))
}

/// POST /post/dislike/{id}
async fn dislike(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    state.service.votes.dislike_post(id, &user.username).await?;
    Ok(see_other(&format!("/post/{id}"), None))
}
