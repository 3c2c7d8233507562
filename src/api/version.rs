use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use super::error::ApiError;
use crate::errors::PatchworkError;

/// Supported REST API versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiVersion {
    V1_0,
    V1_1,
}

impl ApiVersion {
    pub const CURRENT: ApiVersion = ApiVersion::V1_1;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
        }
    }

    /// `web_url`, `comments` and the web-facing nested fields arrived in 1.1.
    pub fn has_web_links(&self) -> bool {
        *self >= Self::V1_1
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = PatchworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(Self::V1_0),
            "1.1" => Ok(Self::V1_1),
            _ => Err(PatchworkError::InvalidVersion),
        }
    }
}

/// The version a request asked for. `explicit` is false for the
/// unversioned `/api/...` routes, which resolve to the current version and
/// keep emitting unversioned links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestVersion {
    pub version: ApiVersion,
    pub explicit: bool,
}

impl RequestVersion {
    pub fn current() -> Self {
        Self {
            version: ApiVersion::CURRENT,
            explicit: false,
        }
    }

    pub fn explicit(version: ApiVersion) -> Self {
        Self {
            version,
            explicit: true,
        }
    }

    /// Path prefix for API links, e.g. `/api/1.0` or `/api`.
    pub fn api_prefix(&self) -> String {
        if self.explicit {
            format!("/api/{}", self.version)
        } else {
            "/api".to_string()
        }
    }
}

impl<S> FromRequestParts<S> for RequestVersion
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::from(PatchworkError::InvalidVersion))?;
        match params.get("version") {
            Some(v) => Ok(Self::explicit(v.parse()?)),
            None => Ok(Self::current()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!("1.0".parse::<ApiVersion>().unwrap(), ApiVersion::V1_0);
        assert_eq!("1.1".parse::<ApiVersion>().unwrap(), ApiVersion::V1_1);
        assert!(matches!(
            "2.0".parse::<ApiVersion>(),
            Err(PatchworkError::InvalidVersion)
        ));
    }

    #[test]
    fn test_web_links_by_version() {
        assert!(!ApiVersion::V1_0.has_web_links());
        assert!(ApiVersion::V1_1.has_web_links());
        assert!(ApiVersion::CURRENT.has_web_links());
    }

    #[test]
    fn test_api_prefix() {
        assert_eq!(RequestVersion::current().api_prefix(), "/api");
        assert_eq!(
            RequestVersion::explicit(ApiVersion::V1_0).api_prefix(),
            "/api/1.0"
        );
    }
}
