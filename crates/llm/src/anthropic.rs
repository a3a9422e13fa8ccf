use std::fmt;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use snafu::{ResultExt, ensure};

use crate::message::ChatMessage;
use crate::provider::{
    BackendError, BackendResult, BoxFuture, BuildHttpClientSnafu, CompletionBackend,
    CompletionRequest, MissingApiKeySnafu, SendRequestSnafu, UpstreamResponse,
};

pub const ANTHROPIC_BACKEND_ID: &str = "anthropic";
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";

#[derive(Clone, PartialEq, Eq)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub api_base: String,
    pub api_version: String,
    pub model: String,
    pub connect_timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim().to_string();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into().trim().to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into().trim().to_string();
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.api_base.trim_end_matches('/'))
    }
}

// The key must never reach logs.
impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    system: &'a str,
    messages: &'a [ChatMessage],
}

/// Streams completions from the Anthropic Messages API.
pub struct AnthropicBackend {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> BackendResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "anthropic-backend-new",
                backend_id: ANTHROPIC_BACKEND_ID,
            }
        );

        // No total timeout: long generations are bounded by the relay's idle timeout.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self { config, client })
    }
}

impl CompletionBackend for AnthropicBackend {
    fn id(&self) -> &str {
        ANTHROPIC_BACKEND_ID
    }

    fn open_stream<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> BoxFuture<'a, BackendResult<UpstreamResponse>> {
        Box::pin(async move {
            let payload = MessagesRequest {
                model: &self.config.model,
                max_tokens: request.max_output_tokens,
                stream: true,
                system: &request.system,
                messages: &request.messages,
            };

            tracing::debug!(
                model = %self.config.model,
                message_count = request.messages.len(),
                max_tokens = request.max_output_tokens,
                "opening upstream completion stream"
            );

            let response = self
                .client
                .post(self.config.messages_url())
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", &self.config.api_version)
                .json(&payload)
                .send()
                .await
                .context(SendRequestSnafu {
                    stage: "send-messages-request",
                })?;

            let status = response.status().as_u16();
            let body = response
                .bytes_stream()
                .map_err(|source| BackendError::StreamRead {
                    stage: "read-messages-stream",
                    source,
                })
                .boxed();

            Ok(UpstreamResponse::new(status, body))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_api_key_is_rejected() {
        let result = AnthropicBackend::new(AnthropicConfig::new("   "));
        assert!(matches!(result, Err(BackendError::MissingApiKey { .. })));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AnthropicConfig::new("sk-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn messages_url_tolerates_trailing_slash() {
        let config = AnthropicConfig::new("k").with_api_base("http://localhost:9000/");
        assert_eq!(config.messages_url(), "http://localhost:9000/v1/messages");
    }

    #[test]
    fn request_body_matches_messages_api_shape() {
        let messages = vec![ChatMessage::user("What color is the sky?")];
        let payload = MessagesRequest {
            model: DEFAULT_MODEL,
            max_tokens: 1500,
            stream: true,
            system: "sys",
            messages: &messages,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "claude-haiku-4-5",
                "max_tokens": 1500,
                "stream": true,
                "system": "sys",
                "messages": [{ "role": "user", "content": "What color is the sky?" }],
            })
        );
    }
}
