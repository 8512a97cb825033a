use std::{fmt, time::Duration};

use crate::model::error::StorageError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(15 * 60);
/// Longest validity SigV4 presigning accepts.
pub const MAX_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Connection settings for an [`ObjectStorageClient`](crate::client::ObjectStorageClient).
///
/// The three credential fields are mandatory; a client is never built from a
/// config that fails [`ClientConfig::validate`].
#[derive(Clone)]
pub struct ClientConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub session_token: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub default_bucket: Option<String>,
    /// Network timeout: connecting, waiting on a response, and the longest
    /// pause allowed while a body is streaming.
    pub timeout: Duration,
    /// Deadline for a whole operation, transfer included. `None` lets a
    /// transfer run for as long as it keeps making progress.
    pub operation_timeout: Option<Duration>,
    pub default_url_expiry: Duration,
}

impl ClientConfig {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
            session_token: None,
            endpoint_url: None,
            force_path_style: false,
            default_bucket: None,
            timeout: DEFAULT_TIMEOUT,
            operation_timeout: None,
            default_url_expiry: DEFAULT_URL_EXPIRY,
        }
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Option<Duration>) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = Some(bucket.into());
        self
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with the variable lookup supplied by the caller.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut config = Self::new(
            var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            var("AWS_REGION").unwrap_or_default(),
        );
        config.session_token = var("AWS_SESSION_TOKEN");
        config.endpoint_url = var("S3_ENDPOINT_URL");
        config.default_bucket = var("S3_BUCKET");

        if let Some(value) = var("S3_FORCE_PATH_STYLE") {
            config.force_path_style = parse_bool("S3_FORCE_PATH_STYLE", &value)?;
        }
        if let Some(value) = var("S3_TIMEOUT_SECS") {
            config.timeout = parse_secs("S3_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("S3_OPERATION_TIMEOUT_SECS") {
            let deadline = parse_secs("S3_OPERATION_TIMEOUT_SECS", &value)?;
            config.operation_timeout = Some(deadline).filter(|deadline| !deadline.is_zero());
        }
        if let Some(value) = var("S3_URL_EXPIRY_SECS") {
            config.default_url_expiry = parse_secs("S3_URL_EXPIRY_SECS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        let missing: Vec<&str> = [
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("region", &self.region),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(StorageError::InvalidConfig(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        if self.timeout.is_zero() {
            return Err(StorageError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if self.operation_timeout.is_some_and(|deadline| deadline.is_zero()) {
            return Err(StorageError::InvalidConfig(
                "operation_timeout must be greater than zero".to_string(),
            ));
        }

        if self.default_url_expiry < Duration::from_secs(1)
            || self.default_url_expiry > MAX_URL_EXPIRY
        {
            return Err(StorageError::InvalidConfig(format!(
                "default_url_expiry must be between 1s and {}s",
                MAX_URL_EXPIRY.as_secs()
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .field("default_bucket", &self.default_bucket)
            .field("timeout", &self.timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("default_url_expiry", &self.default_url_expiry)
            .finish()
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, StorageError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(StorageError::InvalidConfig(format!(
            "{} is not a boolean: {}",
            name, value
        ))),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, StorageError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|err| StorageError::InvalidConfig(format!("{} is not a number of seconds: {}", name, err)))
}
