use std::time::Duration;

use bytes::Bytes;
use dociq_llm::{BoxFuture, ChatRequest};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use snafu::{ResultExt, Snafu, ensure};

pub const CHAT_PATH: &str = "/api/chat";
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:3000";

pub type TransportResult<T> = Result<T, TransportError>;
/// Reply body as it arrives. Dropping it closes the connection.
pub type ReplyStream = BoxStream<'static, TransportResult<Bytes>>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("failed to build HTTP client on `{stage}`, {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to reach gateway on `{stage}`, {source}"))]
    SendRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("gateway answered with status {status} on `{stage}`"))]
    ResponseStatus { stage: &'static str, status: u16 },
    #[snafu(display("reply stream failed on `{stage}`, {source}"))]
    StreamRead {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("reply stream closed on `{stage}`: {details}"))]
    Disconnected {
        stage: &'static str,
        details: String,
    },
}

impl TransportError {
    pub fn disconnected(stage: &'static str, details: impl Into<String>) -> Self {
        DisconnectedSnafu {
            stage,
            details: details.into(),
        }
        .build()
    }
}

/// Sends one chat turn and hands back the streamed plain-text reply.
pub trait ChatTransport: Send + Sync {
    /// Resolves once the reply status is known to be successful.
    fn open<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, TransportResult<ReplyStream>>;
}

/// Talks to a running gateway over HTTP.
pub struct HttpChatTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChatTransport {
    pub fn new(base_url: &str) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}{CHAT_PATH}", base_url.trim().trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatTransport for HttpChatTransport {
    fn open<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, TransportResult<ReplyStream>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&request)
                .send()
                .await
                .context(SendRequestSnafu {
                    stage: "send-chat-request",
                })?;

            let status = response.status();
            ensure!(
                status.is_success(),
                ResponseStatusSnafu {
                    stage: "check-chat-status",
                    status: status.as_u16(),
                }
            );

            Ok(response
                .bytes_stream()
                .map_err(|source| TransportError::StreamRead {
                    stage: "read-chat-reply",
                    source,
                })
                .boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_chat_path() {
        let transport = HttpChatTransport::new("http://localhost:3000/").unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:3000/api/chat");

        let transport = HttpChatTransport::new(DEFAULT_GATEWAY_URL).unwrap();
        assert_eq!(transport.endpoint(), "http://127.0.0.1:3000/api/chat");
    }

    #[tokio::test]
    async fn unreachable_gateway_surfaces_send_error() {
        // Port 9 (discard) is closed on test hosts; connection is refused.
        let transport = HttpChatTransport::new("http://127.0.0.1:9").unwrap();
        let result = transport
            .open(ChatRequest::new("doc", vec![dociq_llm::ChatMessage::user("hi")]))
            .await;
        assert!(matches!(result, Err(TransportError::SendRequest { .. })));
    }
}
