//! `BucketAuth` extractor, grounded on `local_backend/src/authentication.rs`'s
//! `FromRequestParts` idiom and `internal/service/http.go`'s
//! `authenticateRequest`: header precedence over the query-param fallback.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use std::collections::HashMap;

use crate::{ApiError, AppState};

/// The bucket a verified token is scoped to. Handlers never see the rest of
/// `token_verifier::Claims` — the original only ever reads `BucketID` off
/// the verified claims at the call sites (`is_read_only` is never enforced).
pub struct BucketAuth(pub String);

#[async_trait]
impl FromRequestParts<AppState> for BucketAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let query = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .ok();
        let query_token = query
            .as_ref()
            .and_then(|q| q.get(token_verifier::QUERY_PARAM_NAME))
            .map(String::as_str);

        let token = token_verifier::extract_token(header, query_token)?;
        let claims = state.verifier.verify(token)?;
        Ok(BucketAuth(claims.bucket_id))
    }
}
