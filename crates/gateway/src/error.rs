use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dociq_llm::BackendError;
use snafu::Snafu;

pub const INVALID_REQUEST_BODY: &str = "Invalid request";
pub const UPSTREAM_ERROR_BODY: &str = "Upstream model error";

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures the gateway reports before any response bytes are committed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GatewayError {
    #[snafu(display("invalid chat request on `{stage}`: {details}"))]
    InvalidRequest {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("model backend unavailable on `{stage}`, {source}"))]
    UpstreamUnavailable {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("model backend returned status {status} on `{stage}`"))]
    UpstreamStatus { stage: &'static str, status: u16 },
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable { .. } | Self::UpstreamStatus { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Fixed client-facing body; internal details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => INVALID_REQUEST_BODY,
            Self::UpstreamUnavailable { .. } | Self::UpstreamStatus { .. } => UPSTREAM_ERROR_BODY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use snafu::IntoError;

    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let error = InvalidRequestSnafu {
            stage: "test",
            details: "document is blank",
        }
        .build();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.public_message(), "Invalid request");
    }

    #[test]
    fn upstream_failures_hide_details() {
        let error = UpstreamStatusSnafu {
            stage: "test",
            status: 401u16,
        }
        .build();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), "Upstream model error");

        let error = UpstreamUnavailableSnafu { stage: "test" }
            .into_error(BackendError::upstream_closed("test", "connection refused"));
        assert_eq!(error.public_message(), "Upstream model error");
        assert!(!error.public_message().contains("refused"));
    }
}
