use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use k1s0_batch_import_server::adapter;
use k1s0_batch_import_server::domain;
use k1s0_batch_import_server::infrastructure;
use k1s0_batch_import_server::usecase;

use adapter::handler::{self, AppState};
use adapter::repository::batch_import_in_memory::InMemoryBatchImportRepository;
use adapter::repository::batch_import_postgres::BatchImportPostgresRepository;
use adapter::repository::catalog_in_memory::InMemoryCatalogRepository;
use domain::repository::{BatchImportJobRepository, CatalogRepository};
use domain::service::csv_inspector::FileLimits;
use infrastructure::config::Config;
use infrastructure::file_storage::{LocalFileStorage, SourceFileStorage};
use infrastructure::kafka_producer::{BatchEventPublisher, KafkaProducer};
use infrastructure::product_applier::{HttpProductApplier, LoggingProductApplier, ProductApplier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Config
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let cfg = Config::load(&config_path)?;

    // 2. Telemetry
    infrastructure::telemetry::init_telemetry(&cfg.telemetry)?;
    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting batch import server"
    );

    // 3. Database pool (optional)
    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| cfg.database.as_ref().map(|db| db.connection_url()));
    let db_pool = if let Some(url) = database_url {
        info!("connecting to database");
        let pool = infrastructure::database::connect(&url, cfg.database.as_ref()).await?;
        info!("database connection pool established, migrations applied");
        Some(pool)
    } else {
        info!("no database configured, using in-memory repositories");
        None
    };

    // 4. Job repository
    let job_repo: Arc<dyn BatchImportJobRepository> = if let Some(ref pool) = db_pool {
        Arc::new(BatchImportPostgresRepository::new(pool.clone()))
    } else {
        Arc::new(InMemoryBatchImportRepository::new())
    };

    // 5. Catalog schemas
    let catalog_repo = Arc::new(InMemoryCatalogRepository::new());
    let loader = infrastructure::catalog_loader::CatalogLoader::new(&cfg.import.catalog_dir);
    let schemas = loader.load_all().await?;
    let schema_count = schemas.len();
    for schema in schemas {
        catalog_repo.register(schema).await?;
    }
    info!(count = schema_count, "catalog schemas loaded");
    let catalog_repo: Arc<dyn CatalogRepository> = catalog_repo;

    // 6. Source file storage
    let storage: Arc<dyn SourceFileStorage> =
        Arc::new(LocalFileStorage::new(&cfg.import.storage_dir));
    info!(dir = %cfg.import.storage_dir, "source files stored on local disk");

    // 7. Product applier
    let applier: Arc<dyn ProductApplier> = if let Some(ref api) = cfg.catalog_api {
        info!(base_url = %api.base_url, "product applier uses catalog api");
        Arc::new(HttpProductApplier::new(
            &api.base_url,
            Duration::from_millis(api.timeout_ms),
        )?)
    } else {
        tracing::warn!("no catalog api configured, valid rows are only logged");
        Arc::new(LoggingProductApplier)
    };

    // 8. Kafka publisher (optional)
    let publisher: Option<Arc<dyn BatchEventPublisher>> = if let Some(ref kafka_config) = cfg.kafka
    {
        match KafkaProducer::new(kafka_config) {
            Ok(producer) => {
                info!("kafka producer initialized");
                Some(Arc::new(producer))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to create kafka producer, events will not be published");
                None
            }
        }
    } else {
        info!("no kafka configured, batch events will not be published");
        None
    };

    // 9. Runner and scheduler
    let settings = usecase::RunnerSettings {
        apply_timeout: Duration::from_millis(cfg.import.apply_timeout_ms),
        max_consecutive_apply_failures: cfg.import.max_consecutive_apply_failures,
    };
    let execute_uc = Arc::new(usecase::ExecuteBatchUseCase::new(
        job_repo.clone(),
        catalog_repo.clone(),
        storage.clone(),
        applier,
        publisher.clone(),
        settings,
    ));
    let scheduler = Arc::new(usecase::BatchScheduler::new(
        Arc::new(usecase::ExecutionRegistry::new()),
        execute_uc,
    ));

    // 10. Use cases
    let limits = FileLimits {
        max_bytes: cfg.import.max_file_size_bytes(),
        max_rows: cfg.import.max_rows_per_import,
    };
    let state = AppState {
        create_batch_uc: Arc::new(usecase::CreateBatchUseCase::new(
            job_repo.clone(),
            catalog_repo.clone(),
            publisher.clone(),
        )),
        attach_file_uc: Arc::new(usecase::AttachFileUseCase::new(
            job_repo.clone(),
            catalog_repo.clone(),
            storage.clone(),
            publisher.clone(),
            limits,
        )),
        start_batch_uc: Arc::new(usecase::StartBatchUseCase::new(
            job_repo.clone(),
            scheduler.clone(),
            publisher.clone(),
        )),
        pause_batch_uc: Arc::new(usecase::PauseBatchUseCase::new(
            job_repo.clone(),
            scheduler.clone(),
            publisher.clone(),
        )),
        resume_batch_uc: Arc::new(usecase::ResumeBatchUseCase::new(
            job_repo.clone(),
            scheduler.clone(),
            publisher.clone(),
        )),
        cancel_batch_uc: Arc::new(usecase::CancelBatchUseCase::new(
            job_repo.clone(),
            scheduler.clone(),
            publisher.clone(),
        )),
        retry_batch_uc: Arc::new(usecase::RetryBatchUseCase::new(
            job_repo.clone(),
            scheduler.clone(),
            publisher.clone(),
        )),
        delete_batch_uc: Arc::new(usecase::DeleteBatchUseCase::new(
            job_repo.clone(),
            storage.clone(),
            publisher.clone(),
        )),
        get_batch_uc: Arc::new(usecase::GetBatchUseCase::new(job_repo.clone())),
        get_batch_errors_uc: Arc::new(usecase::GetBatchErrorsUseCase::new(job_repo.clone())),
        list_batches_uc: Arc::new(usecase::ListBatchesUseCase::new(job_repo.clone())),
        generate_template_uc: Arc::new(usecase::GenerateTemplateUseCase::new(
            catalog_repo.clone(),
        )),
        max_upload_bytes: limits.max_bytes,
    };

    // 11. Startup recovery
    let recover_uc = usecase::RecoverBatchesUseCase::new(job_repo.clone(), scheduler.clone());
    let recovered = recover_uc.execute().await?;
    if recovered > 0 {
        info!(count = recovered, "batch imports recovered at startup");
    }

    // 12. REST server
    let app = handler::router(state);
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!("REST server starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(publisher) = publisher {
        if let Err(e) = publisher.close().await {
            tracing::warn!(error = %e, "failed to flush kafka producer");
        }
    }
    info!("batch import server exited");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
