use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::{Json, State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::api::models::{CoderRequest, CoderResponse, PageResponse, UrlRequest};
use crate::error::{AppError, ExtractionError, Result};
use crate::extract::{PageRecord, extract};
use crate::fetcher::fetch_page;
use crate::prompts::{EndpointProfile, build_page_message, coder_question};
use crate::validator::is_valid_url;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/url", post(url_handler))
        .route("/coder", post(coder_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn url_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<PageResponse>> {
    let Json(req) = payload
        .map_err(AppError::from)
        .inspect_err(|err| log_failure("/url", None, err))?;
    let started = Instant::now();

    match analyze_page(&state, &req.url).await {
        Ok(record) => {
            tracing::info!(
                url = %req.url,
                category = ?record.category(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "page analyzed"
            );
            Ok(Json(PageResponse { data: record }))
        }
        Err(err) => {
            log_failure("/url", Some(&req.url), &err);
            Err(err)
        }
    }
}

/// Validate, fetch, prompt, extract. Stops at the first failure.
async fn analyze_page(state: &AppState, url: &str) -> Result<PageRecord> {
    if !is_valid_url(url, &state.config.url_policy()) {
        return Err(AppError::Validation("Invalid URL provided".to_string()));
    }

    let page = fetch_page(url, &state.config.fetch_constraints()).await?;
    tracing::debug!(
        url,
        final_url = %page.url,
        content_type = %page.content_type,
        chars = page.body.len(),
        "page fetched"
    );

    let message = build_page_message(url, &page.body, state.config.prompt_body_only);
    let request = EndpointProfile::page(&state.config).request(message);
    let completion = state.llm.complete(&request).await?;

    Ok(extract(&completion, &page.body)?)
}

async fn coder_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CoderRequest>, JsonRejection>,
) -> Result<Response> {
    let result = match payload {
        Ok(Json(req)) => answer_question(&state, req).await,
        Err(rejection) => Err(AppError::from(rejection)),
    };
    result.inspect_err(|err| log_failure("/coder", None, err))
}

/// Buffered or streamed answer over the same prompt.
async fn answer_question(state: &AppState, req: CoderRequest) -> Result<Response> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("A question is required".to_string()));
    }

    let request = EndpointProfile::coder(&state.config).request(coder_question(question));

    if !req.stream {
        let res = state.llm.complete(&request).await?;
        return Ok(Json(CoderResponse { res }).into_response());
    }

    let chunks = state.llm.complete_stream(&request).await?;
    let body = Body::from_stream(chunks.map(|chunk| {
        chunk.inspect_err(|e| {
            tracing::warn!(kind = e.kind(), error = %e, "completion stream failed mid-response");
        })
    }));

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

fn log_failure(route: &'static str, url: Option<&str>, err: &AppError) {
    let url = url.unwrap_or("-");
    match err {
        AppError::Validation(_) | AppError::UnsupportedMediaType(_) => {
            tracing::info!(route, url, kind = err.kind(), error = %err, "rejected request");
        }
        AppError::Extraction(ExtractionError::MalformedModelOutput { raw, reason }) => {
            tracing::warn!(
                route,
                url,
                kind = err.kind(),
                %reason,
                raw_completion = %raw,
                "could not parse model output"
            );
        }
        _ => {
            tracing::warn!(route, url, kind = err.kind(), error = %err, "request failed");
        }
    }
}
