//! Process entry point: wires config, both transports, and the
//! `FileSystemManager` lifecycle together. Grounded on
//! `cmd/server/main.go`/`internal/service/service.go` for the startup and
//! shutdown sequence (concurrent HTTP+gRPC serve, SIGINT/SIGTERM-triggered
//! flush-then-stop) and `crates/local_backend/src/main.rs` for the
//! tracing-init idiom. The original's embedded "workspace" static-asset
//! server has no counterpart named by any module of the spec and is not
//! carried over.

use std::sync::Arc;

use clap::Parser;
use coordination_store::{CoordinationStore, RedisCoordinationStore};
use filestore_config::{parse_listen_address, CodeBucketConfig};
use filestore_grpc::{pb::code_bucket_server::CodeBucketServer, CodeBucketRpcService};
use filestore_http::AppState;
use filesystem_core::{FileSystemManager, FileSystemManagerOptions};
use object_store::{ObjectStore, S3ObjectStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tower_http::catch_panic::CatchPanicLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = cmd_util::env::config_service();
    let config = CodeBucketConfig::parse();
    tracing::info!("Starting code-bucket file store with config {:?}", config);

    let coordination: Arc<dyn CoordinationStore> =
        Arc::new(RedisCoordinationStore::connect(&config.coordination_url()).await?);
    let objects: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::new(
            config.object_store_bucket.clone(),
            config.object_store_endpoint.clone(),
        )
        .await?,
    );
    let fsm = Arc::new(FileSystemManager::start(FileSystemManagerOptions::new(
        coordination,
        objects,
    )));
    let verifier = Arc::new(token_verifier::TokenVerifier::new(
        config.jwt_secret.clone().into_bytes(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    let http_addr = parse_listen_address(&config.http_address)?;
    let http_router = filestore_http::router(AppState {
        fsm: fsm.clone(),
        verifier: verifier.clone(),
    });
    let http_listener = TcpListener::bind(http_addr).await?;
    tracing::info!("HTTP file API listening on {http_addr}");
    let http_shutdown = shutdown.clone();
    let serve_http = async move {
        axum::serve(http_listener, http_router)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await
            .map_err(anyhow::Error::from)
    };

    let rpc_addr = parse_listen_address(&config.rpc_address)?;
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    let rpc_service = CodeBucketServer::new(CodeBucketRpcService::new(fsm.clone(), verifier.clone()));
    filestore_grpc::mark_serving(health_reporter).await;
    tracing::info!("gRPC trusted-caller API listening on {rpc_addr}");
    let rpc_shutdown = shutdown.clone();
    let serve_rpc = async move {
        Server::builder()
            .layer(CatchPanicLayer::new())
            .add_service(health_service)
            .add_service(rpc_service)
            .serve_with_shutdown(rpc_addr, async move { rpc_shutdown.cancelled().await })
            .await
            .map_err(anyhow::Error::from)
    };

    tokio::try_join!(serve_http, serve_rpc)?;

    tracing::info!("Servers stopped, flushing pending writes before exit");
    match Arc::try_unwrap(fsm) {
        Ok(fsm) => fsm.shutdown().await,
        Err(_) => tracing::warn!("FileSystemManager still has outstanding references; skipping final flush"),
    }

    Ok(())
}

async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received, draining in-flight requests");
    shutdown.cancel();
}
