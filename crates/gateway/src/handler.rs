use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use dociq_llm::{ChatRequest, CompletionBackend, CompletionRequest};
use snafu::{ResultExt, ensure};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{
    GatewayError, GatewayResult, InvalidRequestSnafu, UpstreamStatusSnafu,
    UpstreamUnavailableSnafu,
};
use crate::prompt::build_system_prompt;
use crate::relay::RelayStream;

pub const CHAT_ROUTE: &str = "/api/chat";
pub const HEALTH_ROUTE: &str = "/healthz";

/// Upper bound on how much of an upstream error body is read for logging.
const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;
/// Error-body read deadline when the idle timeout is disabled.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared by every request; holds no per-call mutable state.
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn CompletionBackend>,
    config: Arc<ArcSwap<GatewayConfig>>,
}

impl AppState {
    /// Wraps the backend and the initial config.
    pub fn new(backend: Arc<dyn CompletionBackend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            config: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Snapshot of the live config.
    pub fn config(&self) -> Arc<GatewayConfig> {
        self.config.load_full()
    }

    /// Replaces the live config; in-flight requests keep their snapshot.
    pub fn replace_config(&self, config: GatewayConfig) {
        self.config.store(Arc::new(config));
    }
}

/// Chat and health routes bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CHAT_ROUTE, post(chat))
        .route(HEALTH_ROUTE, get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", request_id = %request_id);

    async move {
        match handle_chat(&state, payload).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(error = %error, "chat request rejected");
                error.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn handle_chat(
    state: &AppState,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> GatewayResult<Response> {
    let Json(request) = payload.map_err(invalid_json)?;

    ensure!(
        !request.document.trim().is_empty(),
        InvalidRequestSnafu {
            stage: "validate-chat-request",
            details: "document is missing or blank",
        }
    );

    let config = state.config();
    let prompt = build_system_prompt(&request.document, config.max_document_chars);

    tracing::info!(
        document_chars = prompt.document_chars,
        truncated = prompt.truncated,
        message_count = request.messages.len(),
        backend = state.backend.id(),
        "forwarding chat request"
    );

    let completion = CompletionRequest::new(prompt.text, request.messages)
        .with_max_output_tokens(config.max_output_tokens);

    let upstream = state
        .backend
        .open_stream(completion)
        .await
        .inspect_err(|error| {
            tracing::error!(error = %error, "model backend unreachable");
        })
        .context(UpstreamUnavailableSnafu {
            stage: "open-upstream-stream",
        })?;

    if !upstream.is_success() {
        let status = upstream.status;
        // Read for diagnostics only; nothing from it reaches the client.
        let read_timeout = config.upstream_idle_timeout().unwrap_or(ERROR_BODY_TIMEOUT);
        match tokio::time::timeout(read_timeout, upstream.into_text(MAX_ERROR_BODY_BYTES)).await {
            Ok(Ok(body)) => {
                tracing::error!(status, body = %body, "model backend returned an error status")
            }
            Ok(Err(error)) => tracing::error!(
                status,
                error = %error,
                "model backend returned an error status; error body unreadable"
            ),
            Err(_) => tracing::error!(
                status,
                ?read_timeout,
                "model backend returned an error status; error body stalled"
            ),
        }
        return UpstreamStatusSnafu {
            stage: "check-upstream-status",
            status,
        }
        .fail();
    }

    Ok(RelayStream::spawn(upstream.body, config.relay_options()).into_response())
}

/// Keeps only the rejection kind; serde messages can quote request values.
fn invalid_json(rejection: JsonRejection) -> GatewayError {
    let kind = match rejection {
        JsonRejection::JsonDataError(_) => "json-data",
        JsonRejection::JsonSyntaxError(_) => "json-syntax",
        JsonRejection::MissingJsonContentType(_) => "missing-content-type",
        JsonRejection::BytesRejection(_) => "body-read",
        _ => "other",
    };
    InvalidRequestSnafu {
        stage: "parse-chat-request",
        details: format!("malformed chat request body ({kind})"),
    }
    .build()
}
