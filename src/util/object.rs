use thiserror::Error;

const S3_SCHEME: &str = "s3://";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("failed to parse object uri: {0}")]
    Malformed(String),

    #[error("no bucket in {0} and no default bucket configured")]
    MissingBucket(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

/// Parses `s3://bucket/key`, or a bare key placed in `default_bucket`.
pub fn parse_object_uri(uri: &str, default_bucket: Option<&str>) -> Result<ObjectLocation, UriError> {
    if let Some(rest) = uri.strip_prefix(S3_SCHEME) {
        return match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(ObjectLocation {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(UriError::Malformed(uri.to_string())),
        };
    }

    if uri.contains("://") || uri.is_empty() {
        return Err(UriError::Malformed(uri.to_string()));
    }

    match default_bucket.filter(|bucket| !bucket.is_empty()) {
        Some(bucket) => Ok(ObjectLocation {
            bucket: bucket.to_string(),
            key: uri.to_string(),
        }),
        None => Err(UriError::MissingBucket(uri.to_string())),
    }
}
