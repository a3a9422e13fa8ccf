use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use snafu::Snafu;

use crate::message::ChatMessage;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
/// Upstream body. Dropping it releases the underlying connection.
pub type ByteStream = BoxStream<'static, BackendResult<Bytes>>;
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("missing API key for backend '{backend_id}'"))]
    MissingApiKey {
        stage: &'static str,
        backend_id: String,
    },
    #[snafu(display("failed to build HTTP client on `{stage}`, {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to reach model backend on `{stage}`, {source}"))]
    SendRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("model backend stream failed on `{stage}`, {source}"))]
    StreamRead {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("model backend connection closed on `{stage}`: {details}"))]
    UpstreamClosed {
        stage: &'static str,
        details: String,
    },
}

impl BackendError {
    /// Builds a mid-stream disconnect error for backends without a typed transport error.
    pub fn upstream_closed(stage: &'static str, details: impl Into<String>) -> Self {
        UpstreamClosedSnafu {
            stage,
            details: details.into(),
        }
        .build()
    }
}

/// Backend-agnostic streaming completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    /// Request with the default output-token cap.
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
            max_output_tokens: 1500,
        }
    }

    /// Overrides the output-token cap.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Live upstream response: status line plus a not-yet-read body.
pub struct UpstreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl UpstreamResponse {
    /// Pairs a status code with its unread body.
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads at most `max_bytes` of the body as lossy text; used for
    /// diagnostics on failure statuses. The rest of the body is dropped unread.
    pub async fn into_text(mut self, max_bytes: usize) -> BackendResult<String> {
        let mut bytes = Vec::new();
        while bytes.len() < max_bytes {
            let Some(chunk) = self.body.next().await else {
                break;
            };
            let chunk = chunk?;
            let take = chunk.len().min(max_bytes - bytes.len());
            bytes.extend_from_slice(&chunk[..take]);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opaque text-generation service that streams event-framed records.
pub trait CompletionBackend: Send + Sync {
    /// Short name used in logs.
    fn id(&self) -> &str;

    /// Opens a streaming completion. Resolves once the status line is known;
    /// the body is returned unread so the caller decides whether to relay it.
    fn open_stream<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> BoxFuture<'a, BackendResult<UpstreamResponse>>;
}
