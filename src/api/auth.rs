//! Requester identification and the patch permission policy.

use anyhow::Result;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use super::error::ApiError;
use super::handlers::SharedState;
use crate::db::PatchworkDb;
use crate::errors::PatchworkError;
use crate::models::{Project, User};

/// Who is making the request.
///
/// Resolved from an `Authorization: Token <key>` header. A missing header,
/// or one using another scheme, means anonymous; a `Token` header with an
/// unknown key is rejected with 401.
#[derive(Debug, Clone, PartialEq)]
pub enum Requester {
    Anonymous,
    User(User),
}

impl Requester {
    /// Name used in log lines.
    pub fn label(&self) -> &str {
        match self {
            Self::Anonymous => "anonymous",
            Self::User(user) => &user.username,
        }
    }

    /// Only superusers and maintainers of the patch's project may modify it.
    pub fn authorize_patch_update(&self, db: &PatchworkDb, project: &Project) -> Result<()> {
        let user = match self {
            Self::Anonymous => return Err(PatchworkError::NotAuthenticated.into()),
            Self::User(user) => user,
        };
        if user.is_superuser || db.is_maintainer(user.id, project.id)? {
            return Ok(());
        }
        Err(PatchworkError::PermissionDenied.into())
    }
}

/// Extract the key from a `Token <key>` authorization value.
/// `Ok(None)` when the header uses a different scheme.
fn parse_token(value: &str) -> std::result::Result<Option<&str>, PatchworkError> {
    let mut parts = value.split_whitespace();
    match parts.next() {
        Some(scheme) if scheme.eq_ignore_ascii_case("token") => {}
        _ => return Ok(None),
    }
    let key = parts
        .next()
        .ok_or(PatchworkError::MalformedAuthorization("No credentials provided."))?;
    if parts.next().is_some() {
        return Err(PatchworkError::MalformedAuthorization(
            "Token string should not contain spaces.",
        ));
    }
    Ok(Some(key))
}

impl FromRequestParts<SharedState> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Requester::Anonymous);
        };
        let value = value
            .to_str()
            .map_err(|_| PatchworkError::MalformedAuthorization("Invalid characters."))?;
        let Some(token) = parse_token(value)? else {
            return Ok(Requester::Anonymous);
        };

        let token = token.to_string();
        let user = state
            .db
            .call(move |db| db.user_by_token(&token))
            .await?
            .ok_or(PatchworkError::InvalidToken)?;
        Ok(Requester::User(user))
    }
}
