use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::response;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch timed out after {0} ms")]
    Timeout(u64),

    #[error("response of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    #[error("upstream responded with status {0}")]
    BadStatus(u16),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("redirect refused: {0}")]
    Redirect(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "fetch_timeout",
            FetchError::TooLarge { .. } => "fetch_too_large",
            FetchError::BadStatus(_) => "fetch_bad_status",
            FetchError::UnsupportedContentType(_) => "unsupported_content_type",
            FetchError::Redirect(_) => "fetch_redirect",
            FetchError::Network(_) => "fetch_network",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("model backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("model returned an empty completion")]
    EmptyResponse,

    #[error("unexpected reply from model backend: {0}")]
    Protocol(String),
}

impl CompletionError {
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::BackendUnavailable(_) => "backend_unavailable",
            CompletionError::EmptyResponse => "empty_completion",
            CompletionError::Protocol(_) => "backend_protocol",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The raw completion is kept for diagnostics and never sent to callers.
    #[error("could not parse model output: {reason}")]
    MalformedModelOutput { raw: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Fetch(_) => StatusCode::BAD_GATEWAY,
            AppError::Completion(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Extraction(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid_request",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::Fetch(err) => err.kind(),
            AppError::Completion(err) => err.kind(),
            AppError::Extraction(ExtractionError::MalformedModelOutput { .. }) => {
                "malformed_model_output"
            }
            AppError::Config(_) => "config",
        }
    }
}

/// Body extraction failures get the same JSON error shape as everything else.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                AppError::UnsupportedMediaType(rejection.body_text())
            }
            _ => AppError::Validation(rejection.body_text()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        response::error(self.status(), self.kind(), self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
