use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Region};
use aws_sdk_s3::{
    config::{Credentials, StalledStreamProtectionConfig},
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use futures::{stream, StreamExt};

use crate::{
    adapters::{self, BackendFuture, BodyStream},
    model::{
        config::ClientConfig,
        error::{FailureKind, RemoteFailure},
        object::ObjectReceipt,
    },
};

const CREDENTIALS_PROVIDER: &str = "objectio";

/// Builds an S3 client from explicit settings rather than the ambient AWS profile.
///
/// Retries are disabled: whether to repeat a failed write is the caller's call.
/// A body that moves no bytes for longer than [`ClientConfig::timeout`] fails
/// through the SDK's stalled stream protection.
pub async fn connect(config: &ClientConfig) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        config.session_token.clone(),
        None,
        CREDENTIALS_PROVIDER,
    );

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .retry_config(RetryConfig::disabled())
        .timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(config.timeout)
                .read_timeout(config.timeout)
                .build(),
        )
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.force_path_style)
        .stalled_stream_protection(
            StalledStreamProtectionConfig::enabled()
                .grace_period(config.timeout)
                .build(),
        );
    if let Some(endpoint) = &config.endpoint_url {
        builder = builder.endpoint_url(endpoint);
    }

    aws_sdk_s3::Client::from_conf(builder.build())
}

impl adapters::ObjectBackend for aws_sdk_s3::Client {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> BackendFuture<ObjectReceipt> {
        // The read timeout would cover sending the whole body, so it is off
        // for uploads; stalled stream protection still catches a dead peer.
        let mut timeouts = TimeoutConfig::builder().disable_read_timeout();
        if let Some(connect) = self.config().timeout_config().and_then(|t| t.connect_timeout()) {
            timeouts = timeouts.connect_timeout(connect);
        }

        let req = self
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(content_length as i64)
            .body(body)
            .customize()
            .config_override(aws_sdk_s3::config::Builder::default().timeout_config(timeouts.build()));

        Box::pin(async move {
            let po = req.send().await.map_err(RemoteFailure::from_sdk)?;

            Ok(ObjectReceipt {
                e_tag: po.e_tag().map(|tag| tag.to_string()),
                version_id: po.version_id().map(|id| id.to_string()),
            })
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> BackendFuture<BodyStream> {
        let req = self.get_object().bucket(bucket).key(key);

        Box::pin(async move {
            let o = req.send().await.map_err(RemoteFailure::from_sdk)?;

            let body = stream::try_unfold(o.body, |mut body| async move {
                let chunk = body.try_next().await.map_err(RemoteFailure::from_stream)?;
                Ok::<_, RemoteFailure>(chunk.map(|bytes| (bytes, body)))
            });

            let body: BodyStream = body.boxed();
            Ok(body)
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> BackendFuture<()> {
        let req = self.delete_object().bucket(bucket).key(key);

        Box::pin(async move {
            req.send().await.map_err(RemoteFailure::from_sdk)?;
            Ok(())
        })
    }

    fn presign_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> BackendFuture<String> {
        let req = self.get_object().bucket(bucket).key(key);

        Box::pin(async move {
            let presigning = PresigningConfig::expires_in(expires_in).map_err(|err| {
                RemoteFailure::new(
                    FailureKind::Other,
                    format!("invalid presigning config: {}", err),
                )
            })?;

            let signed = req
                .presigned(presigning)
                .await
                .map_err(RemoteFailure::from_sdk)?;

            Ok(signed.uri().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::TryStreamExt;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        sync::mpsc,
    };

    use super::*;
    use crate::{adapters::ObjectBackend, client::ObjectStorageClient, StorageError};

    const DEMO_CONTENT: &[u8] = b"The quick brown fox jumps over the lazy dog. 12345";

    /// A one-reply-per-connection HTTP server standing in for an S3 endpoint.
    struct LocalEndpoint {
        url: String,
        requests: mpsc::UnboundedReceiver<String>,
    }

    impl LocalEndpoint {
        async fn start(reply: Vec<u8>, delay: Duration) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let (tx, requests) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let reply = reply.clone();
                    let tx = tx.clone();

                    tokio::spawn(async move {
                        let Some(head) = read_request(&mut socket).await else {
                            return;
                        };
                        let _ = tx.send(head);

                        tokio::time::sleep(delay).await;
                        let _ = socket.write_all(&reply).await;
                        let _ = socket.shutdown().await;
                    });
                }
            });

            Self { url, requests }
        }

        fn config(&self) -> ClientConfig {
            let mut config = ClientConfig::new("AKIDEXAMPLE", "wJalrXUtnFEMI", "us-east-1")
                .with_endpoint(&self.url)
                .with_timeout(Duration::from_secs(5));
            config.force_path_style = true;
            config
        }

        fn received(&mut self) -> Vec<String> {
            let mut heads = Vec::new();
            while let Ok(head) = self.requests.try_recv() {
                heads.push(head);
            }
            heads
        }
    }

    /// Reads the request head and drains a `Content-Length` body.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<String> {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];

        let end = loop {
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            let n = socket.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            data.extend_from_slice(&buf[..n]);
        };

        let head = String::from_utf8_lossy(&data[..end]).to_string();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        if head.to_ascii_lowercase().contains("expect: 100-continue") {
            socket.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.ok()?;
        }

        let mut body = data.len() - (end + 4);
        while body < length {
            let n = socket.read(&mut buf).await.ok()?;
            if n == 0 {
                break;
            }
            body += n;
        }

        Some(head)
    }

    fn reply(status: &str, headers: &[&str], body: &[u8]) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
        for header in headers {
            head.push_str(header);
            head.push_str("\r\n");
        }
        if !headers.iter().any(|h| h.starts_with("Content-Length")) {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn error_reply(status: &str, code: &str) -> Vec<u8> {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{}</Code><Message>{}</Message><RequestId>local</RequestId></Error>",
            code, code
        );
        reply(status, &["Content-Type: application/xml"], body.as_bytes())
    }

    fn client() -> aws_sdk_s3::Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                "AKIDEXAMPLE",
                "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
                None,
                None,
                "test",
            ))
            .build();

        aws_sdk_s3::Client::from_conf(config)
    }

    #[tokio::test]
    async fn test_presign_get_object() {
        let cases = vec![
            ("demo.txt", 900, "X-Amz-Expires=900"),
            ("folder/demo.txt", 60, "X-Amz-Expires=60"),
        ];

        for (key, secs, expected) in cases {
            let url = client()
                .presign_get_object("bucket", key, Duration::from_secs(secs))
                .await
                .unwrap();

            assert!(url.starts_with("https://"), "failed on scheme for case: {}", key);
            assert!(url.contains(key), "failed on key for case: {}", key);
            assert!(url.contains(expected), "failed on expiry for case: {}", key);
            assert!(
                url.contains("X-Amz-Signature="),
                "failed on signature for case: {}",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_presign_rejects_long_expiry() {
        let err = client()
            .presign_get_object("bucket", "demo.txt", Duration::from_secs(8 * 24 * 60 * 60))
            .await
            .unwrap_err();

        assert_eq!(err.kind, FailureKind::Other);
    }

    #[tokio::test]
    async fn test_connect_uses_endpoint() {
        let mut config = ClientConfig::new("id", "secret", "eu-west-1")
            .with_endpoint("http://127.0.0.1:9000");
        config.force_path_style = true;

        let url = connect(&config)
            .await
            .presign_get_object("bucket", "demo.txt", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(
            url.starts_with("http://127.0.0.1:9000/bucket/demo.txt"),
            "unexpected url: {}",
            url
        );
    }

    #[tokio::test]
    async fn test_get_object_from_endpoint() {
        let mut endpoint =
            LocalEndpoint::start(reply("200 OK", &["ETag: \"abc\""], DEMO_CONTENT), Duration::ZERO).await;
        let client = connect(&endpoint.config()).await;

        let chunks: Vec<Bytes> = match ObjectBackend::get_object(&client, "bucket", "demo.txt").await {
            Ok(body) => body.try_collect().await.unwrap(),
            Err(err) => panic!("unexpected error: {}", err),
        };

        assert_eq!(chunks.concat(), DEMO_CONTENT);
        let heads = endpoint.received();
        assert_eq!(heads.len(), 1);
        assert!(heads[0].starts_with("GET /bucket/demo.txt"), "unexpected request: {}", heads[0]);
    }

    #[tokio::test]
    async fn test_put_object_to_endpoint() {
        let mut endpoint =
            LocalEndpoint::start(reply("200 OK", &["ETag: \"abc\""], b""), Duration::ZERO).await;
        let client = connect(&endpoint.config()).await;

        let body = ByteStream::from_static(DEMO_CONTENT);
        let receipt = ObjectBackend::put_object(&client, "bucket", "demo.txt", body, 50)
            .await
            .unwrap();

        assert_eq!(receipt.e_tag.as_deref(), Some("\"abc\""));
        let heads = endpoint.received();
        assert_eq!(heads.len(), 1);
        assert!(heads[0].starts_with("PUT /bucket/demo.txt"), "unexpected request: {}", heads[0]);
    }

    #[tokio::test]
    async fn test_error_responses() {
        let cases = vec![
            ("GET", "404 Not Found", "NoSuchKey", FailureKind::NotFound, 404),
            ("GET", "403 Forbidden", "AccessDenied", FailureKind::Forbidden, 403),
            ("GET", "500 Internal Server Error", "InternalError", FailureKind::Other, 500),
            ("DELETE", "404 Not Found", "NoSuchBucket", FailureKind::NotFound, 404),
            ("DELETE", "403 Forbidden", "AccessDenied", FailureKind::Forbidden, 403),
        ];

        for (method, status, code, kind, status_code) in cases {
            let mut endpoint = LocalEndpoint::start(error_reply(status, code), Duration::ZERO).await;
            let client = connect(&endpoint.config()).await;

            let err = match method {
                "GET" => ObjectBackend::get_object(&client, "bucket", "demo.txt").await.err(),
                _ => ObjectBackend::delete_object(&client, "bucket", "demo.txt").await.err(),
            }
            .unwrap();

            assert_eq!(err.kind, kind, "failed on kind for case: {} {}", method, code);
            assert_eq!(err.status, Some(status_code), "failed on status for case: {} {}", method, code);
            assert_eq!(err.code.as_deref(), Some(code), "failed on code for case: {} {}", method, code);
            assert_eq!(endpoint.received().len(), 1, "retried for case: {} {}", method, code);
        }
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let endpoint = LocalEndpoint::start(
            reply("200 OK", &["Content-Length: 100"], &DEMO_CONTENT[..10]),
            Duration::ZERO,
        )
        .await;
        let client = connect(&endpoint.config()).await;

        let body = match ObjectBackend::get_object(&client, "bucket", "demo.txt").await {
            Ok(body) => body,
            Err(err) => panic!("unexpected error: {}", err),
        };
        let err = body.try_collect::<Vec<Bytes>>().await.unwrap_err();

        assert_eq!(err.kind, FailureKind::Other);
        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let endpoint =
            LocalEndpoint::start(reply("200 OK", &[], DEMO_CONTENT), Duration::from_secs(3)).await;
        let config = endpoint.config().with_timeout(Duration::from_millis(200));
        let client = connect(&config).await;

        let err = ObjectBackend::get_object(&client, "bucket", "demo.txt").await.err().unwrap();

        assert_eq!(err.kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_client_download_from_endpoint() {
        let cases = vec![
            (error_reply("404 Not Found", "NoSuchKey"), "RemoteObjectNotFound"),
            (error_reply("403 Forbidden", "AccessDenied"), "PermissionDenied"),
            (reply("200 OK", &["Content-Length: 100"], &DEMO_CONTENT[..10]), "RemoteRead"),
            (reply("200 OK", &[], DEMO_CONTENT), "Ok"),
        ];

        for (response, expected) in cases {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("download.txt");
            let endpoint = LocalEndpoint::start(response, Duration::ZERO).await;
            let config = endpoint.config();
            let client =
                ObjectStorageClient::with_backend(config.clone(), Box::new(connect(&config).await))
                    .unwrap();

            let result = client.download_file("bucket", "demo.txt", &dest).await;
            let outcome = match &result {
                Ok(()) => "Ok",
                Err(StorageError::RemoteObjectNotFound { .. }) => "RemoteObjectNotFound",
                Err(StorageError::PermissionDenied { .. }) => "PermissionDenied",
                Err(StorageError::RemoteRead { .. }) => "RemoteRead",
                Err(err) => panic!("unexpected error: {}", err),
            };
            assert_eq!(outcome, expected);

            let names: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
            if expected == "Ok" {
                assert_eq!(std::fs::read(&dest).unwrap(), DEMO_CONTENT);
            } else {
                assert!(names.is_empty(), "leftover files for case: {}", expected);
            }
        }
    }

    #[tokio::test]
    async fn test_client_delete_missing_from_endpoint() {
        let mut endpoint =
            LocalEndpoint::start(error_reply("404 Not Found", "NoSuchKey"), Duration::ZERO).await;
        let config = endpoint.config();
        let client =
            ObjectStorageClient::with_backend(config.clone(), Box::new(connect(&config).await))
                .unwrap();

        client.delete_file("bucket", "demo.txt").await.unwrap();
        assert!(endpoint.received()[0].starts_with("DELETE /bucket/demo.txt"));
    }
}
