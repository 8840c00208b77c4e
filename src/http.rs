//! HTTP surface used by the editor frontend.
//!
//! `POST /execute` takes `{ "language", "code" }` and answers with
//! `{ "output", "error" }` on success or `{ "error", "details" }` on
//! failure.

use std::any::Any;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::executor::{ExecuteError, ExecutionRequest, Executor};
use crate::language::{Language, UnknownLanguage};

/// Failure body shared by every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    fn response(status: StatusCode, error: &'static str, details: Option<String>) -> Response {
        (status, Json(Self { error, details })).into_response()
    }
}

impl IntoResponse for ExecuteError {
    fn into_response(self) -> Response {
        match &self {
            Self::UnsupportedLanguage(_) => ErrorBody::response(
                StatusCode::BAD_REQUEST,
                "Invalid language selected!",
                None,
            ),
            Self::Failed { .. } | Self::Runtime(_) => ErrorBody::response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Execution Error",
                Some(self.details()),
            ),
            Self::Materialize(_) => ErrorBody::response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                Some(self.details()),
            ),
        }
    }
}

/// Pull the language tag and source out of a JSON body.
///
/// The language is checked first, so a body with a missing, non-string or
/// unknown tag is always an invalid-language failure.
fn parse_request(body: &Value) -> Result<ExecutionRequest, Response> {
    let language = match body.get("language") {
        Some(Value::String(tag)) => tag,
        other => {
            let shown = other.map_or_else(|| "<missing>".to_string(), Value::to_string);
            warn!(language = %shown, "Rejected request without a language tag");
            return Err(ExecuteError::from(UnknownLanguage(shown)).into_response());
        }
    };
    if let Err(e) = language.parse::<Language>() {
        warn!(language = %e.0, "Rejected unsupported language");
        return Err(ExecuteError::from(e).into_response());
    }

    let Some(code) = body.get("code").and_then(Value::as_str) else {
        return Err(ErrorBody::response(
            StatusCode::BAD_REQUEST,
            "Invalid request body",
            Some("field 'code' must be a string".to_string()),
        ));
    };

    Ok(ExecutionRequest {
        language: language.clone(),
        code: code.to_string(),
    })
}

async fn execute(
    State(executor): State<Arc<Executor>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected malformed request body");
            return ErrorBody::response(
                rejection.status(),
                "Invalid request body",
                Some(rejection.body_text()),
            );
        }
    };
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match executor.execute(&request.language, &request.code).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn languages(State(executor): State<Arc<Executor>>) -> Json<Vec<Language>> {
    Json(executor.languages())
}

async fn health() -> &'static str {
    "OK"
}

async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Convert a handler panic into the generic internal-failure body.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let details = payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(ToString::to_string))
        .unwrap_or_else(|| "handler panicked".to_string());

    error!(details = %details, "Request handler panicked");

    ErrorBody::response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
        Some(details),
    )
}

/// Build the application router.
pub fn router(executor: Arc<Executor>) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/languages", get(languages))
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(executor)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve the router on `addr` until Ctrl-C.
pub async fn serve(addr: &str, executor: Arc<Executor>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, "Starting HTTP server");

    axum::serve(listener, router(executor))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
