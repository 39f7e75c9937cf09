//! Unified error taxonomy for the routing runtime
//!
//! Every adapter and every router-level operation converges on [`RouterError`]. Adapters
//! are responsible for mapping their backend's native failures onto [`ErrorCode`]; nothing
//! above the adapter boundary should ever see a raw protocol error.

use std::fmt;

/// Normalized error classification shared by every provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ProviderUnavailable,
    ModelNotFound,
    RateLimited,
    AuthenticationFailed,
    ContextLengthExceeded,
    ContentFiltered,
    Timeout,
    NetworkError,
    InvalidRequest,
    UnknownError,
}

impl ErrorCode {
    /// Whether this code belongs to the default retryable set.
    ///
    /// `{RATE_LIMITED, TIMEOUT, NETWORK_ERROR, PROVIDER_UNAVAILABLE}`
    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimited
                | ErrorCode::Timeout
                | ErrorCode::NetworkError
                | ErrorCode::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::ContextLengthExceeded => "CONTEXT_LENGTH_EXCEEDED",
            ErrorCode::ContentFiltered => "CONTENT_FILTERED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        };
        f.write_str(s)
    }
}

/// The single error currency of the crate.
///
/// Carries a normalized [`ErrorCode`], the provider it originated from (if known), whether
/// the Retry Executor should retry it, and the underlying cause for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("{code} ({provider}): {message}")]
pub struct RouterError {
    pub code: ErrorCode,
    pub provider: String,
    pub message: String,
    pub retryable: bool,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RouterError {
    pub fn new(code: ErrorCode, provider: impl Into<String>, message: impl Into<String>) -> Self {
        let retryable = code.is_retryable_by_default();
        Self {
            code,
            provider: provider.into(),
            message: message.into(),
            retryable,
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn provider_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderUnavailable, provider, message)
    }

    pub fn model_not_found(provider: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::ModelNotFound,
            provider,
            format!("model not found: {model}"),
        )
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimited, provider, message)
    }

    pub fn authentication_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationFailed, provider, message)
    }

    pub fn context_length_exceeded(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ContextLengthExceeded, provider, message)
    }

    pub fn content_filtered(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ContentFiltered, provider, message)
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, provider, message)
    }

    pub fn network_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, provider, message)
    }

    pub fn invalid_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, provider, message)
    }

    pub fn unknown(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnknownError, provider, message)
    }

    /// Build the aggregate failure the Router Core surfaces once it exhausts every
    /// candidate provider. Its cause is the last underlying error observed.
    pub fn aggregate_unavailable(last: RouterError) -> Self {
        Self {
            code: ErrorCode::ProviderUnavailable,
            provider: last.provider.clone(),
            message: format!(
                "no provider satisfied the request; last error from {}: {}",
                last.provider, last.message
            ),
            retryable: false,
            source: Some(Box::new(last)),
        }
    }

    /// Classify an HTTP status code plus a best-effort body sniff against the normalization table.
    pub fn from_http_status(
        provider: impl Into<String>,
        status: u16,
        body_hint: &str,
    ) -> Self {
        let provider = provider.into();
        let lower = body_hint.to_lowercase();
        match status {
            401 | 403 => Self::authentication_failed(provider, "credentials rejected"),
            429 => Self::rate_limited(provider, "rate limit exceeded"),
            408 | 504 => Self::timeout(provider, "request timed out"),
            400 if lower.contains("context") && lower.contains("length") => {
                Self::context_length_exceeded(provider, body_hint.to_string())
            }
            400 if lower.contains("content") && (lower.contains("filter") || lower.contains("safety")) => {
                Self::content_filtered(provider, body_hint.to_string())
            }
            404 => Self::model_not_found(provider, body_hint.to_string()),
            500..=599 => Self::provider_unavailable(provider, format!("server error {status}")),
            400..=499 => Self::invalid_request(provider, body_hint.to_string()),
            _ => Self::unknown(provider, format!("unexpected status {status}: {body_hint}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
