//! Input gates shared by every write path.
//!
//! All checks are pure; they run before anything touches storage, so a
//! rejected payload never leaves partial state behind.

use thiserror::Error;

use crate::db::models::NewUser;

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_POST_CONTENT_LEN: usize = 1500;
pub const MAX_COMMENT_LEN: usize = 700;
/// Exclusive upper bound.
pub const MAX_USERNAME_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid email format")]
    InvalidEmail,

    #[error("username length out of range")]
    UsernameLength,

    #[error("invalid username characters")]
    UsernameCharacters,

    #[error("password doesn't match")]
    PasswordMismatch,

    #[error("title length out of range")]
    TitleLength,

    #[error("invalid post title characters")]
    InvalidTitle,

    #[error("content length out of range")]
    ContentLength,

    #[error("invalid post content characters")]
    InvalidContent,

    #[error("comment length out of range")]
    CommentLength,

    #[error("invalid comment")]
    InvalidComment,
}

fn is_printable_ascii(c: char) -> bool {
    (' '..='~').contains(&c)
}

fn trim_surrounding(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// Checks a post title and returns it trimmed.
pub fn check_title(title: &str) -> Result<&str, ValidationError> {
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleLength);
    }
    let title = trim_surrounding(title);
    if title.is_empty()
        || !title
            .chars()
            .all(|c| matches!(c, '\t' | '\r' | '\n') || is_printable_ascii(c))
    {
        return Err(ValidationError::InvalidTitle);
    }
    Ok(title)
}

/// Checks a post body and returns it trimmed.
pub fn check_post_content(content: &str) -> Result<&str, ValidationError> {
    if content.chars().count() > MAX_POST_CONTENT_LEN {
        return Err(ValidationError::ContentLength);
    }
    let content = trim_surrounding(content);
    if content.is_empty()
        || !content
            .chars()
            .all(|c| matches!(c, '\t' | '\r' | '\n') || is_printable_ascii(c))
    {
        return Err(ValidationError::InvalidContent);
    }
    Ok(content)
}

/// Checks a comment and returns it trimmed. Tabs are not allowed here.
pub fn check_comment(content: &str) -> Result<&str, ValidationError> {
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(ValidationError::CommentLength);
    }
    let content = trim_surrounding(content);
    if content.is_empty()
        || !content
            .chars()
            .all(|c| matches!(c, '\r' | '\n') || is_printable_ascii(c))
    {
        return Err(ValidationError::InvalidComment);
    }
    Ok(content)
}

pub fn check_username(username: &str) -> Result<(), ValidationError> {
    if !username.chars().all(is_printable_ascii) {
        return Err(ValidationError::UsernameCharacters);
    }
    let len = username.chars().count();
    if len < 1 || len >= MAX_USERNAME_LEN {
        return Err(ValidationError::UsernameLength);
    }
    Ok(())
}

/// Accepts a bare `local@domain` address.
///
/// The local part may use the RFC 5322 atom characters separated by single
/// dots; the domain is one or more dot-separated labels of letters, digits
/// and inner hyphens.
pub fn check_email(email: &str) -> Result<(), ValidationError> {
    let (local, domain) = email.rsplit_once('@').ok_or(ValidationError::InvalidEmail)?;

    let local_ok = !local.is_empty()
        && local.split('.').all(|atom| {
            !atom.is_empty()
                && atom
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(c))
        });

    let domain_ok = !domain.is_empty()
        && domain.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    if local_ok && domain_ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn check_registration(user: &NewUser) -> Result<(), ValidationError> {
    check_email(&user.email)?;
    check_username(&user.username)?;
    if user.password != user.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Trims category tags, drops empty ones and collapses duplicates while
/// keeping first-seen order.
pub fn normalize_categories<I, S>(categories: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for category in categories {
        let category = category.as_ref().trim();
        if !category.is_empty() && !out.iter().any(|c| c == category) {
            out.push(category.to_string());
        }
    }
    out
}
