/// HTTP API Handlers
///
/// Thin actix-web adapter over the dispatcher and model registry.
pub mod ranking;
pub mod status;

pub use ranking::{rank_items, RankRequest, RankResponse};
pub use status::{
    health, latency_metrics, metrics_summary, prometheus_metrics, readiness, reload_model,
    service_status,
};

use crate::error::RankerError;
use crate::metrics::RequestStats;
use crate::services::dispatcher::RequestDispatcher;
use actix_web::web;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared handler state
pub struct AppState {
    pub service_name: String,
    pub dispatcher: Arc<RequestDispatcher>,
    pub stats: Arc<RequestStats>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        service_name: impl Into<String>,
        dispatcher: Arc<RequestDispatcher>,
        stats: Arc<RequestStats>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            dispatcher,
            stats,
            started_at: Utc::now(),
        }
    }
}

/// Register every route and the JSON error mapping
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        RankerError::MalformedRequest(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        RankerError::MalformedRequest(err.to_string()).into()
    }))
    .service(health)
    .service(readiness)
    .service(service_status)
    .service(rank_items)
    .service(metrics_summary)
    .service(latency_metrics)
    .service(prometheus_metrics)
    .service(reload_model);
}
