use crate::cli::ServeArgs;
use crate::infra::{build_pipeline, AppState, Workers};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hireflow::config::AppConfig;
use hireflow::error::AppError;
use hireflow::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let pipeline = build_pipeline(&config)?;
    let workers = (!args.no_workers).then(|| Workers::spawn(Arc::clone(&pipeline)));

    let app = with_application_routes(pipeline)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "candidate analysis service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    if let Some(workers) = workers {
        workers.stop().await;
    }
    info!("candidate analysis service stopped");
    Ok(())
}

/// Worker-only process: no HTTP surface, stops on Ctrl-C.
pub(crate) async fn run_workers() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let pipeline = build_pipeline(&config)?;
    let workers = Workers::spawn(pipeline);

    shutdown_signal().await;
    workers.stop().await;
    info!("analysis workers stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
