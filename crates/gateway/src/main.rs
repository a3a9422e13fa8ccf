use dociq_gateway::{ConfigError, GatewayConfig, ServeError, serve};
use snafu::{ResultExt, Snafu};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Snafu)]
enum RunError {
    #[snafu(display("failed to load configuration on `{stage}`, {source}"))]
    LoadConfig {
        stage: &'static str,
        source: ConfigError,
    },
    #[snafu(display("gateway stopped with an error on `{stage}`, {source}"))]
    Run {
        stage: &'static str,
        source: ServeError,
    },
}

type RunResult<T> = Result<T, RunError>;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(error) = run().await {
        tracing::error!(error = %error, "dociq-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> RunResult<()> {
    let config = GatewayConfig::load().context(LoadConfigSnafu {
        stage: "load-gateway-config",
    })?;
    tracing::debug!(?config, "gateway configuration loaded");

    serve(config).await.context(RunSnafu { stage: "serve" })
}
