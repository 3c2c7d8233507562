//! Typed error hierarchy for Patchwork.
//!
//! `PatchworkError` covers the domain failures the API reports to callers.
//! Store functions return `anyhow::Result`; a `PatchworkError` raised inside
//! a store call travels inside the `anyhow::Error` and is recovered by
//! downcasting at the HTTP boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchworkError {
    #[error("Patch {id} not found")]
    PatchNotFound { id: i64 },

    #[error("Project '{project}' not found")]
    ProjectNotFound { project: String },

    #[error("User '{user}' not found")]
    UserNotFound { user: String },

    #[error("Invalid state {value}. Expected one of: {choices}.")]
    InvalidState { value: String, choices: String },

    #[error("Invalid user \"{value}\" - object does not exist.")]
    UnknownUser { value: String },

    #[error("User '{user}' is not a maintainer for project '{project}'.")]
    NotMaintainer { user: String, project: String },

    #[error("This field may not be null.")]
    NullField { field: &'static str },

    #[error("{message}")]
    InvalidField { field: &'static str, message: String },

    #[error("Invalid page.")]
    InvalidPage,

    #[error("Invalid version in URL path.")]
    InvalidVersion,

    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    #[error("You do not have permission to perform this action.")]
    PermissionDenied,

    #[error("Invalid token.")]
    InvalidToken,

    #[error("Invalid token header. {0}")]
    MalformedAuthorization(&'static str),

    #[error("Malformed request: {0}")]
    MalformedBody(String),
}

impl PatchworkError {
    /// The request field a validation error refers to, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidState { .. } => Some("state"),
            Self::UnknownUser { .. } | Self::NotMaintainer { .. } => Some("delegate"),
            Self::NullField { field } | Self::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }
}
