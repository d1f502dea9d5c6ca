use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;

use super::see_other;
use crate::db::models::{NewUser, Session};
use crate::error::{AppError, AppResult};
use crate::extractors::extract_session_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub username: String,
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .route("/auth/logout", post(logout))
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

fn signed_in(state: &AppState, session: &Session) -> Response {
    let auth = &state.config.auth;
    see_other(
        "/",
        Some(session_cookie(
            &auth.cookie_name,
            &session.token,
            auth.session_hours,
        )),
    )
}

/// POST /auth/signup: register, then sign straight in
async fn signup(State(state): State<AppState>, Form(form): Form<NewUser>) -> AppResult<Response> {
    let username = form.username.clone();
    let password = form.password.clone();

    state.service.credentials.register(form).await?;
    let session = state.service.sessions.issue(&username, &password).await?;

    Ok(signed_in(&state, &session))
}

/// POST /auth/signin
async fn signin(
    State(state): State<AppState>,
    Form(form): Form<SignInForm>,
) -> AppResult<Response> {
    let session = state
        .service
        .sessions
        .issue(&form.username, &form.password)
        .await?;

    Ok(signed_in(&state, &session))
}

/// POST /auth/logout: revoke the session and clear the cookie
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    let token = extract_session_token(&headers, cookie_name).ok_or(AppError::Unauthorized)?;

    state.service.sessions.revoke(token).await?;

    Ok(see_other("/", Some(clear_session_cookie(cookie_name))))
}
