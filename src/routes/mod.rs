pub mod auth;
pub mod comment;
pub mod home;
pub mod post;
pub mod profile;

use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The whole HTTP surface with tracing and the request timeout applied.
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let routes = Router::new()
        .merge(home::router())
        .merge(auth::router())
        .merge(post::router())
        .merge(comment::router())
        .merge(profile::router());

    with_http_layers(routes, timeout).with_state(state)
}

/// Requests still running after `timeout` are answered with 408.
fn with_http_layers<S>(routes: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(TraceLayer::new_for_http())
}

/// 303 to `location`, optionally setting a cookie on the way.
pub(crate) fn see_other(location: &str, cookie: Option<String>) -> Response {
    let mut response = (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location.to_string())],
        "",
    )
        .into_response();

    if let Some(cookie) = cookie {
        if let Ok(value) = cookie.parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}
