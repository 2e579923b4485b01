use super::AppState;
use crate::error::{RankerError, Result};
use crate::metrics::{encode_metrics, exporter, LatencySample, StatsSummary};
use crate::services::ranking::{ArtifactInfo, ModelKind};
use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub ready: bool,
    pub lambdamart_loaded: bool,
    pub ctr_loaded: bool,
    pub schema_version: String,
    pub artifacts: Vec<ArtifactInfo>,
    pub in_flight: usize,
    pub queued: usize,
    pub capacity: usize,
    pub total_requests: u64,
    pub avg_latency_ms: f64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub metrics_dropped: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub summary: StatsSummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LatencyQuery {
    #[serde(default = "default_latency_limit")]
    pub limit: usize,
}

fn default_latency_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct LatencyResponse {
    pub metrics: Vec<LatencySample>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequest {
    /// Defaults to the path the artifact was last loaded from
    pub path: Option<PathBuf>,
}

/// GET /health
/// Liveness only; does not look at the models
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

/// GET /ready
#[get("/ready")]
pub async fn readiness(state: web::Data<AppState>) -> HttpResponse {
    if state.dispatcher.registry().is_ready() {
        HttpResponse::Ok().json(serde_json::json!({ "ready": true }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({ "ready": false }))
    }
}

/// GET /status
#[get("/status")]
pub async fn service_status(state: web::Data<AppState>) -> HttpResponse {
    let registry = state.dispatcher.registry();
    let summary = state.stats.summary();

    HttpResponse::Ok().json(StatusResponse {
        service: state.service_name.clone(),
        ready: registry.is_ready(),
        lambdamart_loaded: registry.get(ModelKind::LambdaMart).is_some(),
        ctr_loaded: registry.get(ModelKind::Ctr).is_some(),
        schema_version: registry.schema().version.clone(),
        artifacts: registry.status(),
        in_flight: state.dispatcher.in_flight(),
        queued: state.dispatcher.queued(),
        capacity: state.dispatcher.capacity(),
        total_requests: summary.total_requests,
        avg_latency_ms: summary.avg_latency_ms,
        last_request_at: summary.last_request_at,
        metrics_dropped: state.dispatcher.metrics().dropped(),
        started_at: state.started_at,
    })
}

/// GET /metrics/summary
#[get("/metrics/summary")]
pub async fn metrics_summary(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(SummaryResponse {
        summary: state.stats.summary(),
        timestamp: Utc::now(),
    })
}

/// GET /metrics/latency?limit=N
/// Most recent successful requests, newest first
#[get("/metrics/latency")]
pub async fn latency_metrics(
    state: web::Data<AppState>,
    query: web::Query<LatencyQuery>,
) -> Result<HttpResponse> {
    if !(1..=1000).contains(&query.limit) {
        return Err(RankerError::MalformedRequest(
            "limit must be between 1 and 1000".to_string(),
        ));
    }

    let metrics = state.stats.recent(query.limit);
    Ok(HttpResponse::Ok().json(LatencyResponse {
        count: metrics.len(),
        metrics,
    }))
}

/// GET /metrics
/// Prometheus text exposition
#[get("/metrics")]
pub async fn prometheus_metrics() -> Result<HttpResponse> {
    let body = encode_metrics().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        RankerError::Internal(format!("metrics encoding failed: {}", e))
    })?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

/// POST /models/{kind}/reload
/// Swap in a new artifact; the current one keeps serving if loading fails.
///
/// A caller-supplied path that cannot be loaded is a 400. Reloading from the
/// remembered source path stays a 500.
#[post("/models/{kind}/reload")]
pub async fn reload_model(
    state: web::Data<AppState>,
    kind: web::Path<String>,
    body: Option<web::Json<ReloadRequest>>,
) -> Result<HttpResponse> {
    let kind: ModelKind = kind.into_inner().parse()?;
    let path = body.map(|b| b.into_inner()).unwrap_or_default().path;
    let explicit_path = path.is_some();

    let registry = state.dispatcher.registry().clone();
    let result = web::block(move || registry.reload(kind, path))
        .await
        .map_err(|e| RankerError::Internal(format!("reload task failed: {}", e)))?;

    match result {
        Ok(info) => {
            exporter::record_model_reload(kind.as_str(), "success");
            info!(model = %kind, version = %info.version, "Model reloaded via API");
            Ok(HttpResponse::Ok().json(info))
        }
        Err(e) => {
            exporter::record_model_reload(kind.as_str(), "error");
            match e {
                RankerError::ArtifactLoad { .. } | RankerError::SchemaMismatch { .. }
                    if explicit_path =>
                {
                    Err(RankerError::MalformedRequest(e.to_string()))
                }
                e => Err(e),
            }
        }
    }
}
