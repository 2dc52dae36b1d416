use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryEmergencyRepository, InMemoryProviderDirectory, InMemoryScheduleRepository,
};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use vet_dispatch::availability::AvailabilityService;
use vet_dispatch::config::AppConfig;
use vet_dispatch::dispatch::{EmergencyDispatcher, HaversineGeoProvider};
use vet_dispatch::error::AppError;
use vet_dispatch::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let availability = Arc::new(AvailabilityService::new(Arc::new(
        InMemoryScheduleRepository::default(),
    )));
    let dispatcher = Arc::new(EmergencyDispatcher::new(
        Arc::new(InMemoryEmergencyRepository::default()),
        Arc::new(InMemoryProviderDirectory::seeded()),
        Arc::new(HaversineGeoProvider::new(config.dispatch.average_speed_kmh)),
        &config.dispatch,
    ));

    let app = with_service_routes(availability, dispatcher)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "veterinary dispatch service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
