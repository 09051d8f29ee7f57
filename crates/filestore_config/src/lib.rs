//! Environment/flag configuration for the code-bucket file store, grounded
//! on `crates/local_backend/src/config.rs`'s `clap::Parser` + `env` feature
//! convention. Every flag has a `CODE_BUCKET_`-prefixed env fallback
//! (spec.md §6 Environment).
//!
//! Object-store credentials are deliberately not re-declared here: the AWS
//! SDK's own env/profile credential chain (`AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`, ...) already covers that, and
//! duplicating it would just be two sources of truth for the same secret.

use std::{fmt, net::SocketAddr};

use clap::Parser;

#[derive(Parser, Clone)]
#[clap(author = "Metorial <team@metorial.com>")]
pub struct CodeBucketConfig {
    /// HTTP listen address for the browser-facing file API
    #[clap(long, env = "CODE_BUCKET_HTTP_ADDRESS", default_value = ":4040")]
    pub http_address: String,

    /// gRPC listen address for trusted RPC callers
    #[clap(long, env = "CODE_BUCKET_RPC_ADDRESS", default_value = ":5050")]
    pub rpc_address: String,

    /// HMAC signing secret for bearer tokens minted by GetBucketToken
    #[clap(long, env = "CODE_BUCKET_JWT_SECRET")]
    pub jwt_secret: String,

    /// Object-store bucket name
    #[clap(long, env = "CODE_BUCKET_OBJECT_STORE_BUCKET")]
    pub object_store_bucket: String,

    /// Object-store endpoint override, for S3-compatible backends (MinIO,
    /// R2, ...); omit to use AWS S3 directly
    #[clap(long, env = "CODE_BUCKET_OBJECT_STORE_ENDPOINT")]
    pub object_store_endpoint: Option<String>,

    /// A single coordination-store (Redis-compatible) connection URL; if
    /// absent, one is composed from the component fields below
    #[clap(long, env = "CODE_BUCKET_COORDINATION_URL")]
    pub coordination_url: Option<String>,

    #[clap(long, env = "CODE_BUCKET_COORDINATION_ENDPOINT", default_value = "127.0.0.1")]
    pub coordination_endpoint: String,

    #[clap(long, env = "CODE_BUCKET_COORDINATION_PORT", default_value = "6379")]
    pub coordination_port: u16,

    #[clap(long, env = "CODE_BUCKET_COORDINATION_TLS")]
    pub coordination_tls: bool,

    #[clap(long, env = "CODE_BUCKET_COORDINATION_DB", default_value = "0")]
    pub coordination_db: u32,

    #[clap(long, env = "CODE_BUCKET_COORDINATION_PASSWORD")]
    pub coordination_password: Option<String>,
}

impl fmt::Debug for CodeBucketConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CodeBucketConfig")
            .field("http_address", &self.http_address)
            .field("rpc_address", &self.rpc_address)
            .field("object_store_bucket", &self.object_store_bucket)
            .field("object_store_endpoint", &self.object_store_endpoint)
            .field("coordination_endpoint", &self.coordination_endpoint)
            .field("coordination_port", &self.coordination_port)
            .finish_non_exhaustive()
    }
}

impl CodeBucketConfig {
    /// The URL to connect the coordination store to: `coordination_url` if
    /// set, otherwise composed from the component fields (spec.md §6).
    pub fn coordination_url(&self) -> String {
        if let Some(url) = &self.coordination_url {
            return url.clone();
        }

        let scheme = if self.coordination_tls { "rediss" } else { "redis" };
        let auth = self
            .coordination_password
            .as_deref()
            .map(|password| format!(":{password}@"))
            .unwrap_or_default();
        format!(
            "{scheme}://{auth}{}:{}/{}",
            self.coordination_endpoint, self.coordination_port, self.coordination_db
        )
    }
}

/// Parses a Go-style `":port"` or `"host:port"` listen address into a
/// `SocketAddr`, binding `:port` to all interfaces (`main.go`'s convention
/// for `CODE_BUCKET_HTTP_ADDRESS`/`CODE_BUCKET_RPC_ADDRESS`).
pub fn parse_listen_address(address: &str) -> anyhow::Result<SocketAddr> {
    let with_host = if let Some(port) = address.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        address.to_owned()
    };
    with_host
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address {address:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CodeBucketConfig {
        let mut full = vec!["code-bucket-server"];
        full.extend_from_slice(args);
        CodeBucketConfig::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_match_spec() {
        let config = parse(&[
            "--jwt-secret",
            "s3cr3t",
            "--object-store-bucket",
            "code-bucket",
        ]);
        assert_eq!(config.http_address, ":4040");
        assert_eq!(config.rpc_address, ":5050");
        assert_eq!(config.coordination_url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn composes_coordination_url_from_components() {
        let config = parse(&[
            "--jwt-secret",
            "s3cr3t",
            "--object-store-bucket",
            "code-bucket",
            "--coordination-endpoint",
            "cache.internal",
            "--coordination-port",
            "6380",
            "--coordination-tls",
            "--coordination-password",
            "hunter2",
            "--coordination-db",
            "3",
        ]);
        assert_eq!(
            config.coordination_url(),
            "rediss://:hunter2@cache.internal:6380/3"
        );
    }

    #[test]
    fn explicit_coordination_url_wins_over_components() {
        let config = parse(&[
            "--jwt-secret",
            "s3cr3t",
            "--object-store-bucket",
            "code-bucket",
            "--coordination-url",
            "redis://custom:6379/1",
        ]);
        assert_eq!(config.coordination_url(), "redis://custom:6379/1");
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        assert!(CodeBucketConfig::try_parse_from(["code-bucket-server"]).is_err());
    }

    #[test]
    fn listen_address_binds_bare_port_to_all_interfaces() {
        assert_eq!(
            parse_listen_address(":4040").unwrap(),
            "0.0.0.0:4040".parse().unwrap()
        );
    }

    #[test]
    fn listen_address_accepts_explicit_host() {
        assert_eq!(
            parse_listen_address("127.0.0.1:4040").unwrap(),
            "127.0.0.1:4040".parse().unwrap()
        );
    }
}
