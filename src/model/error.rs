use std::{fmt, io, path::PathBuf};

use aws_sdk_s3::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStreamError,
};
use thiserror::Error;

use crate::model::object::ObjectTarget;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a failed remote request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Forbidden,
    Timeout,
    Other,
}

impl FailureKind {
    pub fn classify(status: Option<u16>, code: Option<&str>) -> Self {
        match (status, code) {
            (_, Some("NoSuchKey" | "NotFound" | "NoSuchBucket")) | (Some(404), _) => {
                FailureKind::NotFound
            }
            (
                _,
                Some(
                    "AccessDenied"
                    | "AllAccessDisabled"
                    | "ExpiredToken"
                    | "InvalidAccessKeyId"
                    | "InvalidToken"
                    | "SignatureDoesNotMatch",
                ),
            )
            | (Some(401 | 403), _) => FailureKind::Forbidden,
            (_, Some("RequestTimeout")) | (Some(408), _) => FailureKind::Timeout,
            _ => FailureKind::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::NotFound => "not found",
            FailureKind::Forbidden => "forbidden",
            FailureKind::Timeout => "timeout",
            FailureKind::Other => "request failed",
        };
        f.write_str(name)
    }
}

/// A failure reported by an [`ObjectBackend`](crate::adapters::ObjectBackend).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    message: String,
    source: Option<BoxError>,
}

impl RemoteFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn from_sdk<E>(err: SdkError<E>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let status = err.raw_response().map(|resp| resp.status().as_u16());
        let code = err.code().map(str::to_string);
        let kind = match &err {
            SdkError::TimeoutError(_) => FailureKind::Timeout,
            SdkError::DispatchFailure(failure) if failure.is_timeout() => FailureKind::Timeout,
            _ => FailureKind::classify(status, code.as_deref()),
        };

        Self {
            kind,
            status,
            code,
            message: DisplayErrorContext(&err).to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn from_stream(err: ByteStreamError) -> Self {
        Self {
            kind: FailureKind::Other,
            status: None,
            code: None,
            message: format!("body stream interrupted: {}", err),
            source: Some(Box::new(err)),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("no completion within {}ms", after.as_millis()),
        )
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("{target}: invalid input: {reason}")]
    InvalidInput { target: ObjectTarget, reason: String },

    #[error("{target}: cannot open local file {}", .path.display())]
    FileNotFound {
        target: ObjectTarget,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{target}: cannot write local file {}", .path.display())]
    LocalWrite {
        target: ObjectTarget,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{target}: remote object not found")]
    RemoteObjectNotFound {
        target: ObjectTarget,
        #[source]
        source: RemoteFailure,
    },

    #[error("{target}: remote write failed")]
    RemoteWrite {
        target: ObjectTarget,
        #[source]
        source: RemoteFailure,
    },

    #[error("{target}: remote read failed")]
    RemoteRead {
        target: ObjectTarget,
        #[source]
        source: RemoteFailure,
    },

    #[error("{target}: permission denied")]
    PermissionDenied {
        target: ObjectTarget,
        #[source]
        source: RemoteFailure,
    },

    #[error("{target}: cannot generate signed url: {reason}")]
    SignatureGeneration {
        target: ObjectTarget,
        reason: String,
        #[source]
        source: Option<RemoteFailure>,
    },
}

impl StorageError {
    pub fn target(&self) -> Option<&ObjectTarget> {
        match self {
            StorageError::InvalidConfig(_) => None,
            StorageError::InvalidInput { target, .. }
            | StorageError::FileNotFound { target, .. }
            | StorageError::LocalWrite { target, .. }
            | StorageError::RemoteObjectNotFound { target, .. }
            | StorageError::RemoteWrite { target, .. }
            | StorageError::RemoteRead { target, .. }
            | StorageError::PermissionDenied { target, .. }
            | StorageError::SignatureGeneration { target, .. } => Some(target),
        }
    }

    pub fn remote_failure(&self) -> Option<&RemoteFailure> {
        match self {
            StorageError::RemoteObjectNotFound { source, .. }
            | StorageError::RemoteWrite { source, .. }
            | StorageError::RemoteRead { source, .. }
            | StorageError::PermissionDenied { source, .. } => Some(source),
            StorageError::SignatureGeneration { source, .. } => source.as_ref(),
            _ => None,
        }
    }

    /// Only deletion is idempotent, so only a failed delete may be blindly retried.
    pub fn is_retry_safe(&self) -> bool {
        matches!(
            self,
            StorageError::RemoteWrite { target, .. }
                if target.operation == crate::model::object::Operation::Delete
        )
    }
}
