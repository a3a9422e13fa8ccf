#![deny(unsafe_code)]

//! HTTP gateway that turns a document question into a streamed model answer.

/// Layered configuration (defaults, JSON file, environment).
pub mod config;
pub mod error;
pub mod handler;
/// System prompt construction and document truncation.
pub mod prompt;
pub mod relay;
pub mod server;

pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use handler::{AppState, router};
pub use prompt::{SystemPrompt, build_system_prompt, truncate_document};
pub use relay::{RelayError, RelayOptions, RelayStream};
pub use server::{ServeError, serve, serve_on};
