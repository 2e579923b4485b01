use actix_web::{web, App, HttpServer};
use anyhow::Context;
use feed_ranker::handlers::{configure, AppState};
use feed_ranker::metrics::{MetricsEmitter, MetricsSink, PrometheusSink, RequestStats};
use feed_ranker::{Config, EnsembleScorer, FeatureSchema, ModelRegistry, RequestDispatcher};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with JSON format
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration loading failed: {}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting {} v{}",
        config.service.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let registry = match load_models(&config) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(error = %e, "Model artifacts failed to load, refusing to start");
            eprintln!("ERROR: {:#}", e);
            std::process::exit(1);
        }
    };

    let stats = Arc::new(RequestStats::default());
    let sinks: Vec<Arc<dyn MetricsSink>> = vec![Arc::new(PrometheusSink), stats.clone()];
    let (metrics, _metrics_task) = MetricsEmitter::spawn(config.metrics.channel_capacity, sinks);

    let dispatcher = Arc::new(RequestDispatcher::new(
        registry,
        EnsembleScorer::new(config.ensemble),
        config.dispatcher_settings(),
        metrics,
    ));

    let state = web::Data::new(AppState::new(
        config.service.service_name.clone(),
        dispatcher,
        stats,
    ));

    let bind_address = config.bind_address();
    info!("HTTP server listening on {}:{}", bind_address.0, bind_address.1);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(bind_address)
        .context("Failed to bind HTTP server")?
        .run()
        .await
        .context("HTTP server error")?;

    info!("Server shut down");
    Ok(())
}

fn load_models(config: &Config) -> anyhow::Result<ModelRegistry> {
    let schema = match &config.models.feature_schema_path {
        Some(path) => FeatureSchema::from_path(path)?,
        None => {
            info!("FEATURE_SCHEMA_PATH not set, using built-in schema");
            FeatureSchema::default_schema()
        }
    };

    let registry = ModelRegistry::load(
        Arc::new(schema),
        &config.models.lambdamart_path,
        &config.models.ctr_path,
    )
    .context("Failed to load model artifacts")?;

    Ok(registry)
}
