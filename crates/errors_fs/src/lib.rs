//! Error taxonomy for the code-bucket file store.
//!
//! Mirrors the `ErrorMetadata`/`ErrorCode` pattern the rest of this
//! workspace uses: an `anyhow::Error` chain carries a typed tag that callers
//! at the transport boundary can map to an HTTP status or a gRPC code,
//! without every internal function needing to know which transport it's
//! ultimately serialized over.

use std::borrow::Cow;

use http::StatusCode;
use tonic::Code;

/// The five error kinds the core surfaces, per the error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Unauthenticated,
    Internal,
    Canceled,
}

impl ErrorKind {
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Canceled => StatusCode::from_u16(499).expect("valid status"),
        }
    }

    pub fn grpc_code(self) -> Code {
        match self {
            ErrorKind::NotFound => Code::NotFound,
            ErrorKind::InvalidArgument => Code::InvalidArgument,
            ErrorKind::Unauthenticated => Code::Unauthenticated,
            ErrorKind::Internal => Code::Internal,
            ErrorKind::Canceled => Code::Cancelled,
        }
    }
}

/// Attach this to an `anyhow::Error` via `.context(FsErrorTag::not_found(...))`
/// to classify it. `FsError` below is the typed error most of this workspace
/// returns directly; `FsErrorTag` exists for the rarer case of tagging a
/// third-party error chain without immediately converting it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{msg}")]
pub struct FsErrorTag {
    pub kind: ErrorKind,
    pub msg: Cow<'static, str>,
}

impl FsErrorTag {
    pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            msg: msg.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            msg: msg.into(),
        }
    }

    pub fn unauthenticated(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ErrorKind::Unauthenticated,
            msg: msg.into(),
        }
    }

    pub fn canceled(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: ErrorKind::Canceled,
            msg: msg.into(),
        }
    }
}

/// The error type most fallible operations in this workspace return.
#[derive(thiserror::Error, Debug)]
#[error("{kind:?}: {source}")]
pub struct FsError {
    pub kind: ErrorKind,
    #[source]
    pub source: anyhow::Error,
}

impl FsError {
    pub fn new(kind: ErrorKind, source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn not_found(msg: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, anyhow::anyhow!("{msg}"))
    }

    pub fn invalid_argument(msg: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidArgument, anyhow::anyhow!("{msg}"))
    }

    pub fn unauthenticated(msg: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Unauthenticated, anyhow::anyhow!("{msg}"))
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Internal, anyhow::anyhow!("{msg}"))
    }

    pub fn canceled(msg: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Canceled, anyhow::anyhow!("{msg}"))
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Any error without a more specific classification becomes `Internal` —
/// this is the fallback most `?`-propagated I/O and encoding failures use.
impl From<anyhow::Error> for FsError {
    fn from(source: anyhow::Error) -> Self {
        match source.downcast_ref::<FsErrorTag>() {
            Some(tag) => Self {
                kind: tag.kind,
                source,
            },
            None => Self {
                kind: ErrorKind::Internal,
                source,
            },
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(source: std::io::Error) -> Self {
        Self::new(ErrorKind::Internal, source)
    }
}

pub type FsResult<T> = Result<T, FsError>;
