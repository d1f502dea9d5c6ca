use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;

/// The signed-in user behind the session cookie.
/// Returns 401 if no live session is found.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match MaybeUser::from_request_parts(parts, state).await? {
            MaybeUser(Some(user)) => Ok(CurrentUser(user)),
            MaybeUser(None) => Err(AppError::Unauthorized),
        }
    }
}

/// Optional user extractor. Anonymous visitors get `None`; storage failures
/// still surface as errors.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_session_token(&parts.headers, &state.config.auth.cookie_name)
        else {
            return Ok(MaybeUser(None));
        };

        let user = state.service.sessions.resolve(token).await?;
        Ok(MaybeUser(user))
    }
}

/// Value of cookie `name`, if the request carries a non-empty one.
pub fn extract_session_token<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        headers
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let headers = headers(&["theme=dark; session_token=abc123; lang=en"]);
        assert_eq!(
            extract_session_token(&headers, "session_token"),
            Some("abc123")
        );
    }

    #[test]
    fn searches_every_cookie_header() {
        let headers = headers(&["theme=dark", "session_token=xyz"]);
        assert_eq!(extract_session_token(&headers, "session_token"), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_cookie_is_none() {
        assert_eq!(extract_session_token(&headers(&[]), "session_token"), None);
        assert_eq!(
            extract_session_token(&headers(&["session_token="]), "session_token"),
            None
        );
        assert_eq!(
            extract_session_token(&headers(&["other_session_token=1"]), "session_token"),
            None
        );
    }
}
