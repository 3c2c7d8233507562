use axum::{
    Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::errors::PatchworkError;

/// Error returned by every handler.
///
/// Field validation failures render as `{"<field>": ["<message>"]}`,
/// everything else as `{"detail": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest {
        field: Option<&'static str>,
        message: String,
    },
    Unauthorized(String),
    Forbidden(String),
    MethodNotAllowed {
        method: Method,
        allow: &'static str,
    },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => detail(StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest {
                field: Some(field),
                message,
            } => (StatusCode::BAD_REQUEST, Json(json!({ field: [message] }))).into_response(),
            ApiError::BadRequest {
                field: None,
                message,
            } => detail(StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(msg) => {
                let mut resp = detail(StatusCode::UNAUTHORIZED, msg);
                resp.headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
                resp
            }
            ApiError::Forbidden(msg) => detail(StatusCode::FORBIDDEN, msg),
            ApiError::MethodNotAllowed { method, allow } => {
                let mut resp = detail(
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("Method \"{}\" not allowed.", method),
                );
                resp.headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(allow));
                resp
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                detail(StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        }
    }
}

fn detail(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

impl From<PatchworkError> for ApiError {
    fn from(err: PatchworkError) -> Self {
        match err {
            PatchworkError::PatchNotFound { .. }
            | PatchworkError::ProjectNotFound { .. }
            | PatchworkError::UserNotFound { .. } => ApiError::NotFound("Not found.".into()),
            PatchworkError::InvalidPage | PatchworkError::InvalidVersion => {
                ApiError::NotFound(err.to_string())
            }
            PatchworkError::NotAuthenticated | PatchworkError::PermissionDenied => {
                ApiError::Forbidden(err.to_string())
            }
            PatchworkError::InvalidToken | PatchworkError::MalformedAuthorization(_) => {
                ApiError::Unauthorized(err.to_string())
            }
            PatchworkError::InvalidState { .. }
            | PatchworkError::UnknownUser { .. }
            | PatchworkError::NotMaintainer { .. }
            | PatchworkError::NullField { .. }
            | PatchworkError::InvalidField { .. }
            | PatchworkError::MalformedBody(_) => ApiError::BadRequest {
                field: err.field(),
                message: err.to_string(),
            },
        }
    }
}

/// Store calls return `anyhow::Error`; recover domain errors raised inside
/// them, anything else is an internal failure.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PatchworkError>() {
            Ok(domain) => domain.into(),
            Err(other) => ApiError::Internal(format!("{:#}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_field_error_body() {
        let err: ApiError = PatchworkError::InvalidState {
            value: "foobar".into(),
            choices: "New".into(),
        }
        .into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(
            body["state"][0],
            "Invalid state foobar. Expected one of: New."
        );
    }

    #[tokio::test]
    async fn test_method_not_allowed_sets_allow() {
        let resp = ApiError::MethodNotAllowed {
            method: Method::DELETE,
            allow: "GET, PATCH",
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()[header::ALLOW], "GET, PATCH");
        let body = body_json(resp).await;
        assert_eq!(body["detail"], "Method \"DELETE\" not allowed.");
    }

    #[tokio::test]
    async fn test_anyhow_downcast() {
        let err = anyhow::Error::from(PatchworkError::PatchNotFound { id: 9 })
            .context("Failed to load patch");
        let resp = ApiError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ApiError::from(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_permission_errors_are_forbidden() {
        assert!(matches!(
            ApiError::from(PatchworkError::NotAuthenticated),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from(PatchworkError::InvalidToken),
            ApiError::Unauthorized(_)
        ));
    }
}
