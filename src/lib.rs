//! Upload, download, sign and delete files in S3-compatible object storage
//! through a small async client.
//!
//! ```no_run
//! use objectio::{ClientConfig, ObjectStorageClient};
//!
//! # async fn run() -> Result<(), objectio::StorageError> {
//! let client = ObjectStorageClient::new(ClientConfig::from_env()?).await?;
//!
//! client.upload_file("my-bucket", "reports/today.csv", "today.csv").await?;
//! client.download_file("my-bucket", "reports/today.csv", "copy.csv").await?;
//! let url = client.get_file_url("my-bucket", "reports/today.csv", None).await?;
//! client.delete_file("my-bucket", "reports/today.csv").await?;
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod client;
pub mod fs;
pub mod model;
pub mod util;

pub use client::ObjectStorageClient;
pub use model::{
    config::ClientConfig,
    error::{FailureKind, RemoteFailure, StorageError},
    object::{ObjectTarget, Operation, UploadResult},
};
