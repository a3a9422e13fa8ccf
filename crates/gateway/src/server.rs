use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use dociq_llm::{AnthropicBackend, BackendError, CompletionBackend};
use snafu::{ResultExt, Snafu};
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::handler::{AppState, router};

pub type ServeResult<T> = Result<T, ServeError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ServeError {
    #[snafu(display("failed to build model backend on `{stage}`, {source}"))]
    BuildBackend {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("failed to bind {addr} on `{stage}`, {source}"))]
    Bind {
        stage: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("http server failed on `{stage}`, {source}"))]
    Serve {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Runs the gateway against the Anthropic backend until Ctrl-C.
pub async fn serve(config: GatewayConfig) -> ServeResult<()> {
    let backend = AnthropicBackend::new(config.anthropic_config()).context(BuildBackendSnafu {
        stage: "build-anthropic-backend",
    })?;

    let addr = config.bind_addr;
    let listener = TcpListener::bind(addr).await.context(BindSnafu {
        stage: "bind-listener",
        addr,
    })?;

    serve_on(listener, Arc::new(backend), config, shutdown_signal()).await
}

/// Serves on an already-bound listener until `shutdown` resolves.
pub async fn serve_on(
    listener: TcpListener,
    backend: Arc<dyn CompletionBackend>,
    config: GatewayConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> ServeResult<()> {
    let local_addr = listener.local_addr().ok();
    tracing::info!(
        addr = ?local_addr,
        backend = backend.id(),
        model = %config.model,
        "DocIQ gateway listening"
    );

    let app = router(AppState::new(backend, config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context(ServeSnafu { stage: "serve-http" })?;

    tracing::info!("DocIQ gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received, draining connections"),
        Err(error) => {
            tracing::warn!(error = %error, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
