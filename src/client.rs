use std::{future::Future, io, path::Path, time::Duration};

use futures::TryStreamExt;
use tracing::{error, info, info_span, Instrument};

use crate::{
    adapters::{self, ObjectBackend},
    fs::{PartialFile, SourceFile},
    model::{
        config::{ClientConfig, MAX_URL_EXPIRY},
        error::{FailureKind, RemoteFailure, StorageError},
        object::{ObjectTarget, Operation, UploadResult},
    },
};

const MIN_URL_EXPIRY: Duration = Duration::from_secs(1);

/// Upload, download, sign and delete objects in a bucket store.
///
/// Each request, and each wait for the next chunk of a download, is bounded
/// by [`ClientConfig::timeout`]; a whole operation is additionally bounded by
/// [`ClientConfig::operation_timeout`] when one is set. An operation holds its
/// local file handle only for its own duration and is never retried internally.
/// The client keeps no per-operation state, so any number of calls may be in
/// flight at once through a shared reference.
pub struct ObjectStorageClient {
    backend: Box<dyn ObjectBackend>,
    config: ClientConfig,
}

impl ObjectStorageClient {
    /// Validates `config` and connects to S3 (or the configured endpoint).
    pub async fn new(config: ClientConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let client = adapters::s3::connect(&config).await;

        Ok(Self {
            backend: Box::new(client),
            config,
        })
    }

    pub fn with_backend(
        config: ClientConfig,
        backend: Box<dyn ObjectBackend>,
    ) -> Result<Self, StorageError> {
        config.validate()?;

        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Streams the file at `local_path` to `(bucket, key)`, creating or
    /// overwriting the object, and resolves once the service acknowledged it.
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<UploadResult, StorageError> {
        let path = local_path.as_ref();
        let target = ObjectTarget::new(Operation::Upload, bucket, key);
        let span = info_span!("upload_file", context = "upload_file", bucket, key, path = %path.display());

        async {
            info!("called");

            let result = self.bounded(&target, self.upload(&target, path)).await;
            match &result {
                Ok(uploaded) => info!(size = uploaded.size, e_tag = ?uploaded.e_tag, "uploaded"),
                Err(err) => error!(error_message = %err, error_group = "upload_file"),
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Writes the object at `(bucket, key)` to `local_path`.
    ///
    /// The bytes are staged next to `local_path` and renamed into place only
    /// once complete, so on failure `local_path` is untouched.
    pub async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<(), StorageError> {
        let path = local_path.as_ref();
        let target = ObjectTarget::new(Operation::Download, bucket, key);
        let span = info_span!("download_file", context = "download_file", bucket, key, path = %path.display());

        async {
            info!("called");

            let result = self.bounded(&target, self.download(&target, path)).await;
            match &result {
                Ok(size) => info!(size, "downloaded"),
                Err(err) => error!(error_message = %err, error_group = "download_file"),
            }

            result.map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Returns a URL that grants unauthenticated GET access to the object
    /// until `expiry` (or [`ClientConfig::default_url_expiry`]) has passed.
    ///
    /// The URL is signed locally; the object is not checked for existence.
    pub async fn get_file_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Option<Duration>,
    ) -> Result<String, StorageError> {
        let target = ObjectTarget::new(Operation::GetUrl, bucket, key);
        let expires_in = expiry.unwrap_or(self.config.default_url_expiry);
        let span = info_span!("get_file_url", context = "get_file_url", bucket, key);

        async {
            info!(expires_in_secs = expires_in.as_secs(), "called");

            let result = self.bounded(&target, self.sign(&target, expires_in)).await;
            if let Err(err) = &result {
                error!(error_message = %err, error_group = "get_file_url");
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Removes the object. Deleting an absent object succeeds.
    pub async fn delete_file(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let target = ObjectTarget::new(Operation::Delete, bucket, key);
        let span = info_span!("delete_file", context = "delete_file", bucket, key);

        async {
            info!("called");

            let result = self.bounded(&target, self.delete(&target)).await;
            if let Err(err) = &result {
                error!(error_message = %err, error_group = "delete_file");
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn upload(&self, target: &ObjectTarget, path: &Path) -> Result<UploadResult, StorageError> {
        check_target(target)?;

        let not_found = |source: io::Error| StorageError::FileNotFound {
            target: target.clone(),
            path: path.to_path_buf(),
            source,
        };

        let source = SourceFile::open(path).await.map_err(not_found)?;
        let size = source.len();
        let body = source.into_byte_stream().await.map_err(not_found)?;

        // The body travels inside this request, so stalls are left to the
        // backend's own stream protection and the operation deadline.
        let receipt = self
            .backend
            .put_object(&target.bucket, &target.key, body, size)
            .await
            .map_err(|failure| write_failure(target, failure))?;

        Ok(UploadResult {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            size,
            e_tag: receipt.e_tag,
            version_id: receipt.version_id,
        })
    }

    async fn download(&self, target: &ObjectTarget, path: &Path) -> Result<u64, StorageError> {
        check_target(target)?;

        let local_write = |source: io::Error| StorageError::LocalWrite {
            target: target.clone(),
            path: path.to_path_buf(),
            source,
        };

        let mut staged = PartialFile::create(path).await.map_err(local_write)?;

        match self.fill(target, path, &mut staged).await {
            Ok(()) => staged.commit().await.map_err(local_write),
            Err(err) => {
                staged.discard().await;
                Err(err)
            }
        }
    }

    async fn fill(
        &self,
        target: &ObjectTarget,
        path: &Path,
        staged: &mut PartialFile,
    ) -> Result<(), StorageError> {
        let mut body = self
            .within(target, async {
                self.backend
                    .get_object(&target.bucket, &target.key)
                    .await
                    .map_err(|failure| read_failure(target, failure))
            })
            .await?;

        while let Some(chunk) = self
            .within(target, async {
                body.try_next().await.map_err(|source| StorageError::RemoteRead {
                    target: target.clone(),
                    source,
                })
            })
            .await?
        {
            staged
                .write_chunk(&chunk)
                .await
                .map_err(|source| StorageError::LocalWrite {
                    target: target.clone(),
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        Ok(())
    }

    async fn sign(&self, target: &ObjectTarget, expires_in: Duration) -> Result<String, StorageError> {
        if let Some(reason) = target.problem() {
            return Err(StorageError::SignatureGeneration {
                target: target.clone(),
                reason: reason.to_string(),
                source: None,
            });
        }

        if expires_in < MIN_URL_EXPIRY || expires_in > MAX_URL_EXPIRY {
            return Err(StorageError::SignatureGeneration {
                target: target.clone(),
                reason: format!(
                    "expiry must be between {}s and {}s, got {}ms",
                    MIN_URL_EXPIRY.as_secs(),
                    MAX_URL_EXPIRY.as_secs(),
                    expires_in.as_millis()
                ),
                source: None,
            });
        }

        self.within(target, async {
            self.backend
                .presign_get_object(&target.bucket, &target.key, expires_in)
                .await
                .map_err(|failure| StorageError::SignatureGeneration {
                    target: target.clone(),
                    reason: "presign request failed".to_string(),
                    source: Some(failure),
                })
        })
        .await
    }

    async fn delete(&self, target: &ObjectTarget) -> Result<(), StorageError> {
        check_target(target)?;

        self.within(target, async {
            match self.backend.delete_object(&target.bucket, &target.key).await {
                Ok(()) => Ok(()),
                Err(failure) if failure.kind == FailureKind::NotFound => {
                    info!("object already absent");
                    Ok(())
                }
                Err(failure) => Err(write_failure(target, failure)),
            }
        })
        .await
    }

    /// Applies the operation deadline, if any, to a whole operation.
    async fn bounded<T, F>(&self, target: &ObjectTarget, operation: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let Some(limit) = self.config.operation_timeout else {
            return operation.await;
        };

        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(timed_out(target, limit)),
        }
    }

    /// Applies the network timeout to one exchange with the backend, or to
    /// one wait for the next body chunk.
    async fn within<T, F>(&self, target: &ObjectTarget, exchange: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let limit = self.config.timeout;

        match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(timed_out(target, limit)),
        }
    }
}

fn check_target(target: &ObjectTarget) -> Result<(), StorageError> {
    match target.problem() {
        Some(reason) => Err(StorageError::InvalidInput {
            target: target.clone(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn write_failure(target: &ObjectTarget, failure: RemoteFailure) -> StorageError {
    let target = target.clone();

    match failure.kind {
        FailureKind::Forbidden => StorageError::PermissionDenied { target, source: failure },
        _ => StorageError::RemoteWrite { target, source: failure },
    }
}

fn read_failure(target: &ObjectTarget, failure: RemoteFailure) -> StorageError {
    let target = target.clone();

    match failure.kind {
        FailureKind::NotFound => StorageError::RemoteObjectNotFound { target, source: failure },
        FailureKind::Forbidden => StorageError::PermissionDenied { target, source: failure },
        _ => StorageError::RemoteRead { target, source: failure },
    }
}

fn timed_out(target: &ObjectTarget, limit: Duration) -> StorageError {
    let target = target.clone();
    let source = RemoteFailure::timeout(limit);

    match target.operation {
        Operation::Download => StorageError::RemoteRead { target, source },
        Operation::GetUrl => StorageError::SignatureGeneration {
            target,
            reason: "timed out".to_string(),
            source: Some(source),
        },
        Operation::Upload | Operation::Delete => StorageError::RemoteWrite { target, source },
    }
}
