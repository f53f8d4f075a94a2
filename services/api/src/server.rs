use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_tenancy_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rentroll::config::AppConfig;
use rentroll::error::AppError;
use rentroll::telemetry;
use rentroll::tenancy::{InMemoryTenancyStore, TenancyServices, TracingNotifier};
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

    let store = Arc::new(InMemoryTenancyStore::new());
    let notifier = Arc::new(TracingNotifier);
    let services = Arc::new(TenancyServices::new(store, notifier, config.lifecycle));
    let sweeper = services.sweeper.clone().spawn();

    let app = with_tenancy_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        invitation_ttl_hours = config.lifecycle.invitation_ttl.num_hours(),
        sweep_interval_secs = config.lifecycle.sweep_interval.as_secs(),
        "tenancy service ready"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(readiness_flag))
        .await;
    sweeper.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal; serving until killed");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown requested; draining connections");
}
