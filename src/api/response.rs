use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    pub timestamp: String,
}

pub fn error(
    status: StatusCode,
    kind: &'static str,
    message: String,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message,
            kind,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}
