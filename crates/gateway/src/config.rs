use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dociq_llm::{AnthropicConfig, DEFAULT_API_BASE, DEFAULT_API_VERSION, DEFAULT_MODEL};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

use crate::prompt::DEFAULT_MAX_DOCUMENT_CHARS;
use crate::relay::RelayOptions;

pub const CONFIG_DIRECTORY_NAME: &str = "dociq";
pub const CONFIG_FILE_NAME: &str = "gateway.json";
pub const CONFIG_PATH_ENV: &str = "DOCIQ_CONFIG";
pub const ENV_PREFIX: &str = "DOCIQ_";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between upstream chunks; 0 disables the check.
    #[serde(default = "default_upstream_idle_timeout_secs")]
    pub upstream_idle_timeout_secs: u64,
    #[serde(default = "default_relay_buffer")]
    pub relay_buffer: usize,
    #[serde(default, skip_serializing)]
    pub api_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_base: default_api_base(),
            api_version: default_api_version(),
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            max_document_chars: default_max_document_chars(),
            connect_timeout_secs: default_connect_timeout_secs(),
            upstream_idle_timeout_secs: default_upstream_idle_timeout_secs(),
            relay_buffer: default_relay_buffer(),
            api_key: String::new(),
        }
    }
}

impl GatewayConfig {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".dociq"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    /// Layers defaults, the optional JSON file, then the environment.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(GatewayConfig::default()))
            .merge(Json::file(config_path))
            .merge(Env::raw().only(&[API_KEY_ENV]).map(|_| "api_key".into()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Loads from `$DOCIQ_CONFIG` or the per-user config directory.
    pub fn load() -> ConfigResult<Self> {
        let config_path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            tracing::info!(
                "gateway config not found at {:?}, using defaults and environment",
                config_path
            );
        }

        Self::from_figment(&Self::figment(&config_path))
    }

    pub fn from_figment(figment: &Figment) -> ConfigResult<Self> {
        let config = figment
            .extract::<GatewayConfig>()
            .map_err(Box::new)
            .context(ExtractSnafu {
                stage: "extract-gateway-config",
            })?
            .normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.api_base = if self.api_base.trim().is_empty() {
            default_api_base()
        } else {
            self.api_base.trim().trim_end_matches('/').to_string()
        };
        self.api_version = if self.api_version.trim().is_empty() {
            default_api_version()
        } else {
            self.api_version.trim().to_string()
        };
        self.model = if self.model.trim().is_empty() {
            default_model()
        } else {
            self.model.trim().to_string()
        };
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        ensure!(
            !self.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "validate-gateway-config",
            }
        );
        ensure!(
            self.max_document_chars > 0,
            InvalidSnafu {
                stage: "validate-gateway-config",
                details: "max_document_chars must be positive",
            }
        );
        ensure!(
            self.max_output_tokens > 0,
            InvalidSnafu {
                stage: "validate-gateway-config",
                details: "max_output_tokens must be positive",
            }
        );
        ensure!(
            self.relay_buffer > 0,
            InvalidSnafu {
                stage: "validate-gateway-config",
                details: "relay_buffer must be positive",
            }
        );
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn upstream_idle_timeout(&self) -> Option<Duration> {
        (self.upstream_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.upstream_idle_timeout_secs))
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            buffer: self.relay_buffer,
            idle_timeout: self.upstream_idle_timeout(),
        }
    }

    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig::new(&self.api_key)
            .with_api_base(&self.api_base)
            .with_api_version(&self.api_version)
            .with_model(&self.model)
            .with_connect_timeout(self.connect_timeout())
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind_addr", &self.bind_addr)
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_document_chars", &self.max_document_chars)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("upstream_idle_timeout_secs", &self.upstream_idle_timeout_secs)
            .field("relay_buffer", &self.relay_buffer)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to load gateway config on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: Box<figment::Error>,
    },
    #[snafu(display("no model API key configured; set ANTHROPIC_API_KEY or DOCIQ_API_KEY"))]
    MissingApiKey { stage: &'static str },
    #[snafu(display("invalid gateway config on `{stage}`: {details}"))]
    Invalid {
        stage: &'static str,
        details: String,
    },
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 3000))
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_output_tokens() -> u32 {
    1500
}

fn default_max_document_chars() -> usize {
    DEFAULT_MAX_DOCUMENT_CHARS
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_upstream_idle_timeout_secs() -> u64 {
    60
}

fn default_relay_buffer() -> usize {
    32
}
