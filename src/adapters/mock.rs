use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use futures::{stream, StreamExt};

use crate::{
    adapters::{self, BackendFuture, BodyStream},
    model::{
        error::{FailureKind, RemoteFailure},
        object::ObjectReceipt,
    },
};

/// Size of the chunks the mock hands out when streaming a body.
const MOCK_CHUNK: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Put,
    Get,
    Delete,
    Presign,
}

#[derive(Default)]
struct MockState {
    objects: HashMap<(String, String), Bytes>,
    requests: usize,
    failures: HashMap<MockOperation, FailureKind>,
    interrupt_after: Option<usize>,
    latency: Duration,
    chunk_delay: Duration,
}

struct Admission {
    failure: Option<FailureKind>,
    interrupt_after: Option<usize>,
    latency: Duration,
    chunk_delay: Duration,
}

/// In-memory backend with failure injection, for tests and local runs.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of requests that reached the backend so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    /// Makes every later `op` request fail with `kind`.
    pub fn fail(&self, op: MockOperation, kind: FailureKind) {
        self.lock().failures.insert(op, kind);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.interrupt_after = None;
    }

    /// Breaks uploads and downloads once `bytes` bytes have moved.
    pub fn interrupt_transfers_after(&self, bytes: usize) {
        self.lock().interrupt_after = Some(bytes);
    }

    /// Delay before the response of every later request.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Pause between body chunks, in both directions.
    pub fn set_chunk_delay(&self, delay: Duration) {
        self.lock().chunk_delay = delay;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .expect("failed to acquire `state` guard")
    }

    fn admit(state: &Mutex<MockState>, op: MockOperation) -> Admission {
        let mut state = state.lock().expect("failed to acquire `state` guard");
        state.requests += 1;

        Admission {
            failure: state.failures.get(&op).copied(),
            interrupt_after: state.interrupt_after,
            latency: state.latency,
            chunk_delay: state.chunk_delay,
        }
    }
}

fn injected(kind: FailureKind, op: MockOperation) -> RemoteFailure {
    let status = match kind {
        FailureKind::NotFound => 404,
        FailureKind::Forbidden => 403,
        FailureKind::Timeout => 408,
        FailureKind::Other => 500,
    };

    RemoteFailure::new(kind, format!("injected {:?} failure", op)).with_status(status)
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn interrupted() -> RemoteFailure {
    RemoteFailure::new(FailureKind::Other, "connection reset mid-transfer")
}

impl adapters::ObjectBackend for MockClient {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteStream,
        _content_length: u64,
    ) -> BackendFuture<ObjectReceipt> {
        let state = self.state.clone();
        let id = (bucket.to_string(), key.to_string());

        Box::pin(async move {
            let admission = MockClient::admit(&state, MockOperation::Put);
            pause(admission.latency).await;
            if let Some(kind) = admission.failure {
                return Err(injected(kind, MockOperation::Put));
            }

            let mut received = Vec::new();
            while let Some(chunk) = body.try_next().await.map_err(RemoteFailure::from_stream)? {
                received.extend_from_slice(&chunk);
                pause(admission.chunk_delay).await;

                if let Some(limit) = admission.interrupt_after {
                    if received.len() >= limit {
                        return Err(interrupted());
                    }
                }
            }

            let e_tag = format!("\"mock-{}\"", received.len());
            state
                .lock()
                .expect("failed to acquire `state` guard")
                .objects
                .insert(id, Bytes::from(received));

            Ok(ObjectReceipt {
                e_tag: Some(e_tag),
                version_id: None,
            })
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> BackendFuture<BodyStream> {
        let state = self.state.clone();
        let id = (bucket.to_string(), key.to_string());

        Box::pin(async move {
            let admission = MockClient::admit(&state, MockOperation::Get);
            pause(admission.latency).await;
            if let Some(kind) = admission.failure {
                return Err(injected(kind, MockOperation::Get));
            }

            let object = state
                .lock()
                .expect("failed to acquire `state` guard")
                .objects
                .get(&id)
                .cloned();

            let Some(object) = object else {
                return Err(RemoteFailure::new(
                    FailureKind::NotFound,
                    format!("NoSuchKey: {}", id.1),
                )
                .with_status(404));
            };

            let limit = admission.interrupt_after.unwrap_or(object.len());
            let mut chunks: Vec<Result<Bytes, RemoteFailure>> = Vec::new();
            let mut offset = 0;
            while offset < object.len().min(limit) {
                let end = (offset + MOCK_CHUNK).min(object.len()).min(limit);
                chunks.push(Ok(object.slice(offset..end)));
                offset = end;
            }
            if limit < object.len() {
                chunks.push(Err(interrupted()));
            }

            let delay = admission.chunk_delay;
            let body: BodyStream = stream::iter(chunks)
                .then(move |chunk| async move {
                    pause(delay).await;
                    chunk
                })
                .boxed();
            Ok(body)
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> BackendFuture<()> {
        let state = self.state.clone();
        let id = (bucket.to_string(), key.to_string());

        Box::pin(async move {
            let admission = MockClient::admit(&state, MockOperation::Delete);
            pause(admission.latency).await;
            if let Some(kind) = admission.failure {
                return Err(injected(kind, MockOperation::Delete));
            }

            state
                .lock()
                .expect("failed to acquire `state` guard")
                .objects
                .remove(&id);

            Ok(())
        })
    }

    fn presign_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> BackendFuture<String> {
        let state = self.state.clone();
        let url = format!(
            "https://{}.mock.invalid/{}?X-Amz-Expires={}&X-Amz-Signature=mock",
            bucket,
            key,
            expires_in.as_secs()
        );

        Box::pin(async move {
            let admission = MockClient::admit(&state, MockOperation::Presign);
            if let Some(kind) = admission.failure {
                return Err(injected(kind, MockOperation::Presign));
            }

            Ok(url)
        })
    }
}
