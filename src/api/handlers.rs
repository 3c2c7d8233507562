use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, Uri, header},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use serde::Deserialize;
use serde_json::json;

use super::auth::Requester;
use super::error::ApiError;
use super::filters::{parse_bool, parse_patch_filter};
use super::pagination::Page;
use super::serializers::{Links, PatchJson, View, patch_json};
use super::version::RequestVersion;
use crate::config::PatchworkConfig;
use crate::db::DbHandle;
#[cfg(test)]
use crate::db::PatchworkDb;
use crate::errors::PatchworkError;
use crate::models::{LookupKey, PatchUpdate};

// ── Shared application state ──────────────────────────────────────────

/// Request-independent settings the handlers need.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl ApiSettings {
    pub fn from_config(config: &PatchworkConfig) -> Self {
        Self {
            base_url: config.site.base_url.trim_end_matches('/').to_string(),
            default_page_size: config.api.default_page_size,
            max_page_size: config.api.max_page_size,
        }
    }
}

pub struct AppState {
    pub db: DbHandle,
    pub settings: ApiSettings,
}

pub type SharedState = Arc<AppState>;

const LIST_ALLOW: &str = "GET, HEAD, OPTIONS";
const DETAIL_ALLOW: &str = "GET, PATCH, HEAD, OPTIONS";

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PatchPath {
    pub id: String,
}

impl PatchPath {
    /// Non-numeric ids cannot name a patch.
    fn id(&self) -> Result<i64, ApiError> {
        self.id
            .parse()
            .map_err(|_| ApiError::NotFound("Not found.".into()))
    }
}

/// Decode a PATCH body. JSON is the default; HTML-form encoding is also
/// accepted, where an empty value clears a nullable field.
fn parse_update_body(headers: &HeaderMap, body: &[u8]) -> Result<PatchUpdate, PatchworkError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PatchUpdate::default());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| PatchworkError::MalformedBody(e.to_string()))?;
        return update_from_form(&pairs);
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| PatchworkError::MalformedBody(e.to_string()))?;
    if !value.is_object() {
        return Err(PatchworkError::MalformedBody(
            "Invalid data. Expected a dictionary.".into(),
        ));
    }
    serde_json::from_value(value).map_err(|e| PatchworkError::MalformedBody(e.to_string()))
}

fn update_from_form(pairs: &[(String, String)]) -> Result<PatchUpdate, PatchworkError> {
    fn nullable(value: &str) -> Option<String> {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    let mut update = PatchUpdate::default();
    for (key, value) in pairs {
        match key.as_str() {
            "state" => update.state = Some(nullable(value)),
            "delegate" => update.delegate = Some(nullable(value).map(|v| LookupKey::parse(&v))),
            "archived" => update.archived = Some(Some(parse_bool("archived", value.trim())?)),
            "commit_ref" => update.commit_ref = Some(nullable(value)),
            "pull_url" => update.pull_url = Some(nullable(value)),
            _ => {}
        }
    }
    Ok(update)
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/", get(api_index))
        .route("/api/{version}/", get(api_index))
        .route("/api/patches/", list_routes())
        .route("/api/{version}/patches/", list_routes())
        .route("/api/patches/{id}/", detail_routes())
        .route("/api/{version}/patches/{id}/", detail_routes())
        .route("/health", get(health_check))
}

fn list_routes() -> MethodRouter<SharedState> {
    get(list_patches)
        .patch(reject_list_write)
        .post(reject_list_write)
        .put(reject_list_write)
        .delete(reject_list_write)
}

fn detail_routes() -> MethodRouter<SharedState> {
    get(get_patch)
        .patch(update_patch)
        .post(reject_detail_write)
        .put(reject_detail_write)
        .delete(reject_detail_write)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn api_index(
    State(state): State<SharedState>,
    version: RequestVersion,
) -> Json<serde_json::Value> {
    let links = Links::new(&state.settings.base_url, version);
    Json(json!({ "patches": links.patch_list() }))
}

async fn list_patches(
    State(state): State<SharedState>,
    version: RequestVersion,
    requester: Requester,
    uri: Uri,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let filter = parse_patch_filter(&pairs)?;
    let page = Page::from_query(
        &pairs,
        state.settings.default_page_size,
        state.settings.max_page_size,
    )?;

    tracing::debug!(requester = requester.label(), ?filter, page = page.number, "listing patches");

    let (count, patches) = state
        .db
        .call(move |db| {
            let count = db.count_patches(&filter)?;
            page.validate(count)?;
            let patches = db.list_patches(&filter, page.size, page.offset())?;
            Ok((count, patches))
        })
        .await?;

    let links = Links::new(&state.settings.base_url, version);
    let body: Vec<PatchJson> = patches
        .iter()
        .map(|p| patch_json(p, &links, View::List))
        .collect();

    let mut response = Json(body).into_response();
    let request_url = format!("{}{}", state.settings.base_url, uri.path());
    if let Some(link) = page.link_header(&request_url, &pairs, count) {
        let value = HeaderValue::from_str(&link)
            .map_err(|e| ApiError::Internal(format!("Invalid Link header: {}", e)))?;
        response.headers_mut().insert(header::LINK, value);
    }
    Ok(response)
}

async fn get_patch(
    State(state): State<SharedState>,
    version: RequestVersion,
    _requester: Requester,
    Path(path): Path<PatchPath>,
) -> Result<Json<PatchJson>, ApiError> {
    let id = path.id()?;
    let detail = state
        .db
        .call(move |db| db.get_patch(id))
        .await?
        .ok_or(PatchworkError::PatchNotFound { id })?;

    let links = Links::new(&state.settings.base_url, version);
    Ok(Json(patch_json(&detail, &links, View::Detail)))
}

/// Partial update. The patch is looked up first (404), then the requester
/// is authorized against its project (403), then the body is validated.
async fn update_patch(
    State(state): State<SharedState>,
    version: RequestVersion,
    requester: Requester,
    Path(path): Path<PatchPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PatchJson>, ApiError> {
    let id = path.id()?;
    let update = parse_update_body(&headers, &body);
    let actor = requester.clone();

    let detail = state
        .db
        .call(move |db| {
            let current = db
                .get_patch(id)?
                .ok_or(PatchworkError::PatchNotFound { id })?;
            actor.authorize_patch_update(db, &current.project)?;
            let update = update?;
            if update.is_empty() {
                return Ok((current, update));
            }
            let updated = db.update_patch(id, &update)?;
            Ok((updated, update))
        })
        .await
        .inspect_err(|e| {
            if let Some(
                PatchworkError::NotAuthenticated | PatchworkError::PermissionDenied,
            ) = e.downcast_ref::<PatchworkError>()
            {
                tracing::warn!(
                    patch_id = id,
                    requester = requester.label(),
                    "patch update refused"
                );
            }
        })
        .map(|(detail, update)| {
            tracing::info!(
                patch_id = id,
                requester = requester.label(),
                fields = ?update.changed_fields(),
                "patch updated"
            );
            detail
        })?;

    let links = Links::new(&state.settings.base_url, version);
    Ok(Json(patch_json(&detail, &links, View::Detail)))
}

/// Patches arrive by mail; the API never creates, replaces or deletes them.
async fn reject_list_write(method: Method) -> ApiError {
    ApiError::MethodNotAllowed {
        method,
        allow: LIST_ALLOW,
    }
}

async fn reject_detail_write(method: Method) -> ApiError {
    ApiError::MethodNotAllowed {
        method,
        allow: DETAIL_ALLOW,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPatch, NewProject, NewUser};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        patch_id: i64,
        maintainer_token: String,
    }

    fn test_app() -> Fixture {
        let db = PatchworkDb::new_in_memory().unwrap();
        db.seed_default_states().unwrap();
        let project = db
            .create_project(&NewProject {
                linkname: "test-project".into(),
                name: "Test Project".into(),
                listid: "test.example.com".into(),
                listemail: "test@example.com".into(),
                ..Default::default()
            })
            .unwrap();
        let maintainer = db
            .create_user(&NewUser {
                username: "maintainer".into(),
                email: "maintainer@example.com".into(),
                ..Default::default()
            })
            .unwrap();
        db.add_maintainer(maintainer.id, project.id).unwrap();
        db.set_user_token(maintainer.id, "maint-token").unwrap();
        let submitter = db.create_person("sub@example.com", Some("Sub")).unwrap();
        let state = db.find_state("new").unwrap().unwrap();
        let patch = db
            .create_patch(&NewPatch {
                project_id: project.id,
                msgid: "<1@example.com>".into(),
                name: "[PATCH] first".into(),
                submitter_id: submitter.id,
                state_id: state.id,
                content: "Hello".into(),
                diff: Some("--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n".into()),
                headers: "Subject: [PATCH] first\n".into(),
                ..Default::default()
            })
            .unwrap();

        let state = Arc::new(AppState {
            db: DbHandle::new(db),
            settings: ApiSettings {
                base_url: "http://pw.example.com".into(),
                default_page_size: 30,
                max_page_size: 100,
            },
        });
        Fixture {
            app: api_router().with_state(state),
            patch_id: patch.patch.id,
            maintainer_token: "maint-token".into(),
        }
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // 1. Health check
    #[tokio::test]
    async fn test_health_check() {
        let fixture = test_app();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // 2. API index per version
    #[tokio::test]
    async fn test_api_index() {
        let fixture = test_app();
        let request = Request::builder()
            .uri("/api/1.0/")
            .body(Body::empty())
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["patches"], "http://pw.example.com/api/1.0/patches/");
    }

    // 3. List omits message bodies
    #[tokio::test]
    async fn test_list_patches() {
        let fixture = test_app();
        let request = Request::builder()
            .uri("/api/patches/")
            .body(Body::empty())
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["name"], "[PATCH] first");
        assert!(body[0].get("content").is_none());
    }

    // 4. Detail carries message bodies
    #[tokio::test]
    async fn test_get_patch_detail() {
        let fixture = test_app();
        let request = Request::builder()
            .uri(format!("/api/patches/{}/", fixture.patch_id))
            .body(Body::empty())
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["content"], "Hello");
        assert_eq!(body["headers"]["Subject"], "[PATCH] first");
    }

    // 5. Unknown and non-numeric ids
    #[tokio::test]
    async fn test_get_patch_not_found() {
        let fixture = test_app();
        for uri in ["/api/patches/999/", "/api/patches/abc/"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = fixture.app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    // 6. Unsupported version
    #[tokio::test]
    async fn test_unknown_version() {
        let fixture = test_app();
        let request = Request::builder()
            .uri("/api/9.9/patches/")
            .body(Body::empty())
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // 7. Maintainer update over JSON
    #[tokio::test]
    async fn test_update_patch_json() {
        let fixture = test_app();
        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/api/patches/{}/", fixture.patch_id))
            .header("authorization", format!("Token {}", fixture.maintainer_token))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"state": "under-review", "archived": true}"#))
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["state"], "under-review");
        assert_eq!(body["archived"], true);
    }

    // 8. Form-encoded update, empty delegate clears it
    #[tokio::test]
    async fn test_update_patch_form() {
        let fixture = test_app();
        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/api/patches/{}/", fixture.patch_id))
            .header("authorization", format!("Token {}", fixture.maintainer_token))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("delegate=&commit_ref=abc123"))
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["delegate"], serde_json::Value::Null);
        assert_eq!(body["commit_ref"], "abc123");
    }

    // 9. Anonymous update refused before the body is looked at
    #[tokio::test]
    async fn test_update_patch_anonymous() {
        let fixture = test_app();
        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/api/patches/{}/", fixture.patch_id))
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    // 10. Unknown token
    #[tokio::test]
    async fn test_invalid_token() {
        let fixture = test_app();
        let request = Request::builder()
            .uri("/api/patches/")
            .header("authorization", "Token nope")
            .body(Body::empty())
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // 11. Create and delete are never allowed
    #[tokio::test]
    async fn test_write_methods_rejected() {
        let fixture = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/patches/")
            .header("authorization", format!("Token {}", fixture.maintainer_token))
            .body(Body::from("{}"))
            .unwrap();
        let response = fixture.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], LIST_ALLOW);

        let request = Request::builder()
            .method("PATCH")
            .uri("/api/patches/")
            .header("authorization", format!("Token {}", fixture.maintainer_token))
            .body(Body::from(r#"{"state": "accepted"}"#))
            .unwrap();
        let response = fixture.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], LIST_ALLOW);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["detail"], "Method \"PATCH\" not allowed.");

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/patches/{}/", fixture.patch_id))
            .body(Body::empty())
            .unwrap();
        let response = fixture.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], DETAIL_ALLOW);
    }

    #[test]
    fn test_update_from_form() {
        let pairs = vec![
            ("state".to_string(), "accepted".to_string()),
            ("archived".to_string(), "on".to_string()),
            ("pull_url".to_string(), String::new()),
        ];
        let update = update_from_form(&pairs).unwrap();
        assert_eq!(update.state, Some(Some("accepted".into())));
        assert_eq!(update.archived, Some(Some(true)));
        assert_eq!(update.pull_url, Some(None));
        assert!(update.delegate.is_none());
    }

    #[test]
    fn test_parse_update_body_json_null() {
        let headers = HeaderMap::new();
        let update = parse_update_body(&headers, br#"{"delegate": null}"#).unwrap();
        assert_eq!(update.delegate, Some(None));
        assert!(parse_update_body(&headers, b"").unwrap().is_empty());
        assert!(matches!(
            parse_update_body(&headers, b"{oops"),
            Err(PatchworkError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_parse_update_body_requires_object() {
        let headers = HeaderMap::new();
        for body in [&br#"["accepted"]"#[..], b"42", b"null", br#""accepted""#] {
            match parse_update_body(&headers, body) {
                Err(PatchworkError::MalformedBody(message)) => {
                    assert_eq!(message, "Invalid data. Expected a dictionary.")
                }
                other => panic!("expected malformed body, got {:?}", other),
            }
        }
    }
}
