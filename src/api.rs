// HTTP API for the quota engine
//
// Routes:
// - GET  /v1/subjects/{id}/quota          eligibility snapshot
// - GET  /v1/subjects/{id}/history        paged ledger, newest first
// - GET  /v1/subjects/{id}/stats          per-subject usage report
// - POST /v1/subjects/{id}/consumptions   consume one unit
// - GET  /v1/admin/stats                  global usage report
// - POST /v1/admin/tier-sweep             expire lapsed premium tiers
// - GET  /metrics                         Prometheus scrape endpoint
// - GET  /health                          liveness

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::engine::{ConsumptionOutcome, ConsumptionRequest, QuotaService};
use crate::error::{ErrorCode, QuotaError};
use crate::ids::{ResourceId, SubjectId};
use crate::ledger::{ClientMeta, SourceChannel};
use crate::metrics;
use crate::quota::{format_countdown, Gate, QuotaCheckResult};

/// Default history page size
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Error body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown: Option<String>,
}

impl ErrorBody {
    fn new(code: ErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            gate: None,
            reset_at: None,
            retry_after_secs: None,
            countdown: None,
        }
    }

    fn quota_exceeded(gate: Gate, reason: String, reset_at: DateTime<Utc>, retry_after_secs: u64) -> Self {
        Self {
            code: ErrorCode::Ineligible,
            message: reason,
            gate: Some(gate),
            reset_at: Some(iso(reset_at)),
            retry_after_secs: Some(retry_after_secs),
            countdown: Some(format_countdown(retry_after_secs)),
        }
    }
}

/// 429 body for a denied consumption, with the full quota snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeniedBody {
    pub error: ErrorBody,
    pub status: QuotaCheckResult,
}

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(QuotaError);

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        ApiError(err)
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn retry_after(secs: u64) -> [(header::HeaderName, HeaderValue); 1] {
    [(header::RETRY_AFTER, HeaderValue::from(secs.max(1)))]
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = match code {
            ErrorCode::Invalid => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Ineligible => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = ErrorBody::new(code, self.0.to_string());

        match self.0 {
            QuotaError::QuotaExceeded {
                gate,
                reason,
                reset_at,
                retry_after_secs,
            } => {
                let body = ErrorBody::quota_exceeded(gate, reason, reset_at, retry_after_secs);
                (status, retry_after(retry_after_secs), Json(body)).into_response()
            }
            QuotaError::Conflict(_) => (status, retry_after(1), Json(body)).into_response(),
            QuotaError::Persistence(ref e) => {
                error!("Request failed on storage: {}", e);
                body.message = "internal storage error".to_string();
                (status, Json(body)).into_response()
            }
            _ => (status, Json(body)).into_response(),
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Paging parameters for history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Body of `POST /v1/subjects/{id}/consumptions`
#[derive(Debug, Deserialize)]
pub struct ConsumeBody {
    pub resource_id: String,
    #[serde(default)]
    pub channel: Option<SourceChannel>,
    #[serde(default)]
    pub client: Option<ClientMeta>,
}

/// Build the API router
pub fn router(service: Arc<QuotaService>) -> Router {
    Router::new()
        .route("/v1/subjects/{id}/quota", get(status_handler))
        .route("/v1/subjects/{id}/history", get(history_handler))
        .route("/v1/subjects/{id}/stats", get(subject_stats_handler))
        .route("/v1/subjects/{id}/consumptions", post(consume_handler))
        .route("/v1/admin/stats", get(global_stats_handler))
        .route("/v1/admin/tier-sweep", post(sweep_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind `addr` and serve until the task is cancelled
pub async fn serve(service: Arc<QuotaService>, addr: SocketAddr) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🚀 QuotaGuard API listening on {}", addr);

    axum::serve(listener, router(service))
        .await
        .context("HTTP server error")?;
    Ok(())
}

async fn status_handler(
    State(service): State<Arc<QuotaService>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let subject = SubjectId::parse(id)?;
    let status = service.status(&subject).await?;
    Ok(Json(status).into_response())
}

async fn history_handler(
    State(service): State<Arc<QuotaService>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Response> {
    let subject = SubjectId::parse(id)?;
    let page = service
        .history(
            &subject,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page).into_response())
}

async fn subject_stats_handler(
    State(service): State<Arc<QuotaService>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let subject = SubjectId::parse(id)?;
    Ok(Json(service.subject_stats(&subject).await?).into_response())
}

fn client_from_headers(headers: &HeaderMap) -> ClientMeta {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ClientMeta {
        address: text(header::HeaderName::from_static("x-forwarded-for"))
            .and_then(|v| v.split(',').next().map(|a| a.trim().to_string())),
        user_agent: text(header::USER_AGENT),
    }
}

async fn consume_handler(
    State(service): State<Arc<QuotaService>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ConsumeBody>,
) -> ApiResult<Response> {
    let request = ConsumptionRequest::new(SubjectId::parse(id)?, ResourceId::parse(body.resource_id)?)
        .via(body.channel.unwrap_or_default())
        .with_client(body.client.unwrap_or_else(|| client_from_headers(&headers)));

    let response = match service.consume(request).await? {
        ConsumptionOutcome::Denied { denial, status } => {
            let body = DeniedBody {
                error: ErrorBody::quota_exceeded(
                    denial.gate,
                    denial.reason,
                    denial.reset_at,
                    denial.retry_after_secs,
                ),
                status,
            };
            (
                StatusCode::TOO_MANY_REQUESTS,
                retry_after(denial.retry_after_secs),
                Json(body),
            )
                .into_response()
        }
        outcome @ ConsumptionOutcome::Accepted { .. } => {
            (StatusCode::CREATED, Json(outcome)).into_response()
        }
        outcome @ ConsumptionOutcome::Replayed { .. } => {
            (StatusCode::OK, Json(outcome)).into_response()
        }
    };
    Ok(response)
}

async fn global_stats_handler(State(service): State<Arc<QuotaService>>) -> ApiResult<Response> {
    Ok(Json(service.global_stats().await?).into_response())
}

async fn sweep_handler(State(service): State<Arc<QuotaService>>) -> ApiResult<Response> {
    Ok(Json(service.sweep_expired_tiers().await?).into_response())
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            metrics_text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
