//! Trusted-caller gRPC surface, grounded on
//! `original_source/.../internal/service/rpc.go` and the `gen/rpc` message
//! shapes it consumes. Implements exactly the RPCs spec.md §6 lists.

mod service;
mod source_adapter;

pub mod pb {
    tonic::include_proto!("filestore.v1");
}

pub use service::CodeBucketRpcService;
pub use source_adapter::ArchiveArchiveSource;

use tonic_health::server::HealthReporter;

/// Marks the `filestore.v1.CodeBucket` service as serving, mirroring
/// `grpcUtil.NewGrpcServer`'s health-registration call.
pub async fn mark_serving(mut reporter: HealthReporter) {
    reporter
        .set_serving::<pb::code_bucket_server::CodeBucketServer<CodeBucketRpcService>>()
        .await;
}
