use crate::cli::ServeArgs;
use crate::infra::{seed_listing, AppState};
use crate::routes::with_buying_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use property_closing::config::{AppConfig, StorageBackend};
use property_closing::error::AppError;
use property_closing::storage::{JsonFileStore, MemoryStore};
use property_closing::telemetry;
use property_closing::workflows::buying::{
    BuyingService, DocumentRepository, PropertyRepository, TransactionRepository,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    match config.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(MemoryStore::default());
            serve(config, store, args.seed_listing).await
        }
        StorageBackend::Json => {
            let store = Arc::new(JsonFileStore::open(&config.storage.data_dir)?);
            info!(data_dir = %store.root().display(), "using json file storage");
            serve(config, store, args.seed_listing).await
        }
    }
}

async fn serve<S>(config: AppConfig, store: Arc<S>, seed: bool) -> Result<(), AppError>
where
    S: TransactionRepository + DocumentRepository + PropertyRepository + 'static,
{
    if seed && seed_listing(store.as_ref(), Utc::now())? {
        info!("sample listing registered");
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(BuyingService::new(store.clone(), store.clone(), store));

    let app = with_buying_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        ?config.storage.backend,
        %addr,
        "property closing service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
