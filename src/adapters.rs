use std::{future::Future, pin::Pin, time::Duration};

use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use futures::Stream;

use crate::model::{error::RemoteFailure, object::ObjectReceipt};

pub mod mock;
pub mod s3;

pub type BackendFuture<T> = Pin<Box<dyn Future<Output = Result<T, RemoteFailure>> + Send>>;

/// Body of a remote object, yielded chunk by chunk.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, RemoteFailure>> + Send>>;

/// The requests an [`ObjectStorageClient`](crate::client::ObjectStorageClient)
/// needs from a storage service.
///
/// Every call is a single remote request; the returned futures own everything
/// they need so they can be awaited independently of `self`.
pub trait ObjectBackend: Send + Sync {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> BackendFuture<ObjectReceipt>;

    fn get_object(&self, bucket: &str, key: &str) -> BackendFuture<BodyStream>;

    /// Succeeds when the object is gone afterwards, whether or not it existed.
    /// Stores that report a missing key fail with `FailureKind::NotFound`.
    fn delete_object(&self, bucket: &str, key: &str) -> BackendFuture<()>;

    fn presign_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> BackendFuture<String>;
}
