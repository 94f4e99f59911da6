//! Error taxonomy returned to the host gateway.
//!
//! Every variant is terminal for the current request. None are retried here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PluginError {
    /// No key, or an empty key, in the configured header.
    #[error("apikey not found in request")]
    Unauthenticated,
    #[error("apikey not found")]
    CredentialNotFound,
    /// No binding configured for the proxy's binding name.
    #[error("no binding found for associated proxy")]
    BindingNotFound,
    /// The binding exists but does not grant the key.
    #[error("api key not authorized for this proxy")]
    KeyNotGranted,
    #[error("api key unauthorized")]
    Unauthorized,
    /// Route configuration cannot be evaluated. Reported exactly like
    /// `Unauthorized`; `detail` is for logs only.
    #[error("api key unauthorized")]
    Misconfigured { detail: String },
    /// The request path has no single canonical form (encoded separator,
    /// bad escape). `detail` is for logs only.
    #[error("invalid request path")]
    InvalidPath { detail: String },
    #[error("quota limit reached. please contact your administrator")]
    QuotaExceeded,
    #[error("rate limit exceeded")]
    RateExceeded,
}

impl PluginError {
    pub fn misconfigured(detail: impl Into<String>) -> Self {
        Self::Misconfigured {
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PluginError::QuotaExceeded | PluginError::RateExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PluginError::Unauthenticated => "unauthenticated",
            PluginError::CredentialNotFound => "credential_not_found",
            PluginError::BindingNotFound => "binding_not_found",
            PluginError::KeyNotGranted => "key_not_granted",
            PluginError::Unauthorized => "unauthorized",
            PluginError::Misconfigured { .. } => "misconfigured",
            PluginError::InvalidPath { .. } => "invalid_path",
            PluginError::QuotaExceeded => "quota_exceeded",
            PluginError::RateExceeded => "rate_exceeded",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    message: String,
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            status: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
