//! HTTP surface of the renderer.
//!
//! - `POST /render-pdf` renders a page and streams back the PDF bytes
//! - `GET /health` reports liveness without touching the browser engine

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::browser::{EngineLauncher, EngineStatus, LifecycleManager};
use crate::config::Config;
use crate::error::{ErrorCategory, ErrorPayload};
use crate::render::{RenderRequest, RenderSettings, Renderer};
use crate::{RenderError, Result};

// ============================================================================
// State
// ============================================================================

/// Shared state behind every route.
pub struct AppState<L: EngineLauncher> {
    pub renderer: Renderer<L>,
    pub service_name: String,
    pub max_body_bytes: usize,
}

impl<L: EngineLauncher> AppState<L> {
    pub fn new(config: &Config, manager: Arc<LifecycleManager<L>>) -> Self {
        Self {
            renderer: Renderer::new(manager, RenderSettings::from(config)),
            service_name: config.service_name.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn manager(&self) -> &Arc<LifecycleManager<L>> {
        self.renderer.manager()
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub engine: EngineStatus,
    pub active_contexts: usize,
}

impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_payload())).into_response()
    }
}

fn rejection_response(rejection: JsonRejection, max_body_bytes: usize) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(limit = max_body_bytes, "rejected oversized request body");
        let payload = ErrorPayload::new(
            ErrorCategory::PayloadTooLarge,
            format!("request body exceeds the {} byte limit", max_body_bytes),
        );
        return (StatusCode::PAYLOAD_TOO_LARGE, Json(payload)).into_response();
    }
    warn!(error = %rejection.body_text(), "rejected malformed request body");
    RenderError::validation(rejection.body_text()).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn render_pdf<L: EngineLauncher>(
    State(state): State<Arc<AppState<L>>>,
    body: std::result::Result<Json<RenderRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(rejection, state.max_body_bytes),
    };

    match state.renderer.render(request).await {
        Ok(pdf) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (header::CONTENT_LENGTH, pdf.len().to_string()),
            ],
            pdf.bytes,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health<L: EngineLauncher>(State(state): State<Arc<AppState<L>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service_name.clone(),
        engine: state.manager().status(),
        active_contexts: state.renderer.active_contexts(),
    })
}

// ============================================================================
// Router Configuration
// ============================================================================

pub fn router<L: EngineLauncher>(state: Arc<AppState<L>>) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route(
            "/render-pdf",
            post(render_pdf::<L>).layer(DefaultBodyLimit::max(limit)),
        )
        .route("/health", get(health::<L>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled, then stop accepting connections, let
/// in-flight requests finish for up to `grace`, and terminate the engine.
pub async fn serve<L: EngineLauncher>(
    listener: TcpListener,
    state: Arc<AppState<L>>,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, service = %state.service_name, "listening");
    }

    let signal = shutdown.clone();
    let server = axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();
    let drain_deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        served = server => served?,
        _ = drain_deadline => {
            warn!(grace_ms = grace.as_millis() as u64, "in-flight requests outlived the grace period");
        }
    }

    info!("server stopped; terminating browser engine");
    match tokio::time::timeout(grace, state.manager().shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "browser engine shutdown failed"),
        Err(_) => warn!(grace_ms = grace.as_millis() as u64, "browser engine shutdown timed out"),
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
