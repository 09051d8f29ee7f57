//! Symmetric HMAC-SHA256 bearer tokens, grounded on
//! `internal/service/http.go`'s `authenticateRequest`/`Claims` and
//! `rpc.go`'s `GetBucketToken`. The original signs with `golang-jwt`; here
//! the three-part `header.payload.signature` shape and HS256 algorithm
//! check are reproduced directly with `hmac`/`sha2` rather than pulling in
//! a full JWT crate, mirroring `keybroker::Secret`'s preference for owning
//! its own token primitives.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use errors_fs::{FsError, FsResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ISSUER: &str = "metorial-code-bucket";
const AUDIENCE: &str = "metorial-code-bucket";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub bucket_id: String,
    pub is_read_only: bool,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

/// Mints and verifies bearer tokens under a single shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mints a bearer token scoped to `bucket_id`, valid for `ttl`. Rejects a
    /// zero or negative `ttl` (spec.md §4.6: `GetBucketToken` rejects zero
    /// expiry).
    pub fn mint(&self, bucket_id: &str, is_read_only: bool, ttl: Duration) -> FsResult<String> {
        if ttl.is_zero() {
            return Err(FsError::invalid_argument("token expiry must be positive"));
        }
        let now = unix_now()?;
        let claims = Claims {
            bucket_id: bucket_id.to_owned(),
            is_read_only,
            iat: now,
            exp: now + ttl.as_secs() as i64,
            aud: AUDIENCE.to_owned(),
            iss: ISSUER.to_owned(),
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> FsResult<String> {
        let header = Header {
            alg: "HS256",
            typ: "JWT",
        };
        let header_json = serde_json::to_vec(&header).map_err(FsError::internal)?;
        let claims_json = serde_json::to_vec(claims).map_err(FsError::internal)?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = self.sign(signing_input.as_bytes());
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    fn sign(&self, signing_input: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(signing_input);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verifies `token`'s signature, algorithm, and expiry, returning the
    /// bucket it's scoped to on success.
    pub fn verify(&self, token: &str) -> FsResult<Claims> {
        if token.is_empty() {
            return Err(FsError::unauthenticated("missing authorization token"));
        }
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(FsError::unauthenticated("malformed token"));
        };

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| FsError::unauthenticated("malformed token header"))?;
        let header: Header = serde_json::from_slice(&header_json)
            .map_err(|_| FsError::unauthenticated("malformed token header"))?;
        if header.alg != "HS256" {
            return Err(FsError::unauthenticated(format!(
                "unexpected signing method: {}",
                header.alg
            )));
        }

        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| FsError::unauthenticated("malformed token signature"))?;
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| FsError::unauthenticated("invalid token signature"))?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| FsError::unauthenticated("malformed token claims"))?;
        let claims: Claims = serde_json::from_slice(&payload_json)
            .map_err(|_| FsError::unauthenticated("malformed token claims"))?;

        if claims.exp < unix_now()? {
            return Err(FsError::unauthenticated("token expired"));
        }

        Ok(claims)
    }
}

fn unix_now() -> FsResult<i64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(FsError::internal)?
        .as_secs() as i64)
}

/// Extracts the bearer token from a request, matching
/// `authenticateRequest`'s precedence: the `Authorization: Bearer` header
/// wins when present (and must be well-formed); otherwise falls back to the
/// `metorial-code-bucket-token` query parameter.
pub fn extract_token<'a>(
    authorization_header: Option<&'a str>,
    query_token: Option<&'a str>,
) -> FsResult<&'a str> {
    let token = match authorization_header {
        Some(header) if !header.is_empty() => header
            .strip_prefix("Bearer ")
            .ok_or_else(|| FsError::unauthenticated("missing or invalid authorization header"))?,
        _ => query_token.unwrap_or(""),
    };
    if token.is_empty() {
        return Err(FsError::unauthenticated("missing authorization token"));
    }
    Ok(token)
}

pub const QUERY_PARAM_NAME: &str = "metorial-code-bucket-token";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify_roundtrips_claims() {
        let verifier = TokenVerifier::new(b"shared-secret".to_vec());
        let token = verifier
            .mint("bucket-1", true, Duration::from_secs(60))
            .unwrap();
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.bucket_id, "bucket-1");
        assert!(claims.is_read_only);
    }

    #[test]
    fn mint_rejects_zero_ttl() {
        let verifier = TokenVerifier::new(b"shared-secret".to_vec());
        let err = verifier.mint("bucket-1", false, Duration::ZERO).unwrap_err();
        assert!(matches!(err.kind, errors_fs::ErrorKind::InvalidArgument));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let verifier = TokenVerifier::new(b"secret-a".to_vec());
        let token = verifier
            .mint("bucket-1", false, Duration::from_secs(60))
            .unwrap();
        let other = TokenVerifier::new(b"secret-b".to_vec());
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let verifier = TokenVerifier::new(b"shared-secret".to_vec());
        let now = unix_now().unwrap();
        let claims = Claims {
            bucket_id: "bucket-1".to_owned(),
            is_read_only: false,
            iat: now - 120,
            exp: now - 60,
            aud: AUDIENCE.to_owned(),
            iss: ISSUER.to_owned(),
        };
        let token = verifier.encode(&claims).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn extract_token_prefers_header_over_query() {
        let token = extract_token(Some("Bearer from-header"), Some("from-query")).unwrap();
        assert_eq!(token, "from-header");
    }

    #[test]
    fn extract_token_falls_back_to_query() {
        let token = extract_token(None, Some("from-query")).unwrap();
        assert_eq!(token, "from-query");
    }

    #[test]
    fn extract_token_rejects_non_bearer_header() {
        assert!(extract_token(Some("Basic abc"), None).is_err());
    }

    #[test]
    fn extract_token_rejects_missing_token() {
        assert!(extract_token(None, None).is_err());
    }
}
