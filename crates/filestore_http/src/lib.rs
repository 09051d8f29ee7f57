//! Browser-facing HTTP surface, grounded on
//! `original_source/.../internal/service/http.go` and
//! `crates/local_backend/src/router.rs`'s axum/tower-http conventions.
//! Implements exactly spec.md §6's HTTP routes.

mod auth;

use std::{sync::Arc, time::Duration};

use auth::BucketAuth;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use errors_fs::FsError;
use filesystem_core::{FileSystemManager, DEFAULT_CONTENT_TYPE};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub fsm: Arc<FileSystemManager>,
    pub verifier: Arc<token_verifier::TokenVerifier>,
}

/// Wraps [`FsError`] to provide an axum response without violating the
/// orphan rule — `errors_fs` stays transport-agnostic.
pub struct ApiError(FsError);

impl From<FsError> for ApiError {
    fn from(err: FsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0.kind.http_status(), self.0.source.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files", get(list_files))
        .route(
            "/files/{*path}",
            get(get_file).put(put_file).delete(delete_file),
        )
        // spec.md §7: a panicking handler is recovered and surfaced as
        // Internal rather than tearing down the connection.
        .layer(CatchPanicLayer::new())
        .layer(cors())
        .with_state(state)
}

/// Mirrors `setCorsHeaders` in the original: permissive, wildcard origin,
/// the four verbs the file API uses plus `OPTIONS`. `tower_http`'s
/// `CorsLayer` answers preflight `OPTIONS` requests itself — no explicit
/// handler needed (the original hand-rolled one because `gorilla/mux`
/// doesn't do this for you).
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::exact(http::HeaderValue::from_static("*")))
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([header::AUTHORIZATION, header::CONTENT_TYPE]))
        .max_age(Duration::from_secs(86400))
}

async fn list_files(State(state): State<AppState>, BucketAuth(bucket_id): BucketAuth) -> Result<Response, ApiError> {
    let files = state.fsm.list_files(&bucket_id, "").await?;
    Ok(Json(files).into_response())
}

async fn get_file(
    State(state): State<AppState>,
    BucketAuth(bucket_id): BucketAuth,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let (_, blob) = state.fsm.get_file(&bucket_id, &path).await?;
    let content_type = header::HeaderValue::from_str(&blob.content_type)
        .unwrap_or_else(|_| header::HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let mut response = blob.content.into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    Ok(response)
}

async fn put_file(
    State(state): State<AppState>,
    BucketAuth(bucket_id): BucketAuth,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.fsm.put_file(&bucket_id, &path, body.to_vec(), content_type).await?;
    Ok(StatusCode::CREATED)
}

async fn delete_file(
    State(state): State<AppState>,
    BucketAuth(bucket_id): BucketAuth,
    Path(path): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.fsm.delete_file(&bucket_id, &path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use coordination_store::{CoordinationStore, InMemoryCoordinationStore};
    use filesystem_core::FileSystemManagerOptions;
    use object_store::{LocalDirObjectStore, ObjectStore};
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> (AppState, token_verifier::TokenVerifier) {
        let coordination: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalDirObjectStore::new_tempdir().unwrap());
        let fsm = Arc::new(FileSystemManager::start(FileSystemManagerOptions::new(
            coordination,
            objects,
        )));
        let verifier = token_verifier::TokenVerifier::new(b"test-secret".to_vec());
        let state = AppState {
            fsm,
            verifier: Arc::new(verifier.clone()),
        };
        (state, verifier)
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_over_http() {
        let (state, verifier) = test_state();
        let token = verifier
            .mint("bucket-1", false, std::time::Duration::from_secs(60))
            .unwrap();
        let app = router(state);

        let put_request = Request::builder()
            .method("PUT")
            .uri("/files/a.txt")
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let put_response = app.clone().oneshot(put_request).await.unwrap();
        assert_eq!(put_response.status(), StatusCode::CREATED);

        let get_request = Request::builder()
            .method("GET")
            .uri("/files/a.txt")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let get_response = app.oneshot(get_request).await.unwrap();
        assert_eq!(get_response.status(), StatusCode::OK);
        assert_eq!(
            get_response.headers().get("content-type").unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (state, _verifier) = test_state();
        let app = router(state);
        let request = Request::builder()
            .method("GET")
            .uri("/files")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn query_token_is_accepted_for_downloads() {
        let (state, verifier) = test_state();
        let token = verifier
            .mint("bucket-1", true, std::time::Duration::from_secs(60))
            .unwrap();
        state
            .fsm
            .put_file("bucket-1", "a.txt", b"hi".to_vec(), None)
            .await
            .unwrap();
        let app = router(state);

        let request = Request::builder()
            .method("GET")
            .uri(format!("/files/a.txt?metorial-code-bucket-token={token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_found() {
        let (state, verifier) = test_state();
        let token = verifier
            .mint("bucket-1", false, std::time::Duration::from_secs(60))
            .unwrap();
        let app = router(state);

        let request = Request::builder()
            .method("DELETE")
            .uri("/files/never-existed.txt")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        // spec.md §6: DELETE on a missing path is a 404, not a no-op
        // (spec.md §9 Open Question 1).
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
