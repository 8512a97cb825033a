use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Download,
    GetUrl,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::GetUrl => "get_url",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation and object an error refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectTarget {
    pub operation: Operation,
    pub bucket: String,
    pub key: String,
}

impl ObjectTarget {
    pub fn new(operation: Operation, bucket: &str, key: &str) -> Self {
        Self {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Returns the reason the bucket/key pair cannot be sent, if any.
    pub fn problem(&self) -> Option<&'static str> {
        if self.bucket.trim().is_empty() {
            return Some("bucket must not be empty");
        }

        if self.key.is_empty() {
            return Some("key must not be empty");
        }

        None
    }
}

impl fmt::Display for ObjectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} s3://{}/{}", self.operation, self.bucket, self.key)
    }
}

/// Acknowledgement of a completed write, as reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectReceipt {
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadResult {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
}
