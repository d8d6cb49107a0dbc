use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use std::env;
use std::sync::Arc;

use visio_backend::config::AppConfig;
use visio_backend::ddb::{DynamoDbInstanceStore, InstanceStore, MemoryInstanceStore};
use visio_backend::detector::DetectorInvoker;
use visio_backend::routes::{configure_routes, WaitSettings};
use visio_backend::storage::s3_service::S3Service;
use visio_backend::workflow::{DetectionActivity, Orchestrator};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    if !config.detector.script_dir.is_dir() {
        log::warn!(
            "Detector directory {} does not exist; detections will fail until it is provisioned",
            config.detector.script_dir.display()
        );
    }

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let s3_client = S3Client::new(&aws_config);

    let source_store = Arc::new(S3Service::new(s3_client.clone(), config.source_bucket.clone()));
    let predictions_store = Arc::new(S3Service::new(s3_client, config.predictions_bucket.clone()));

    let instances: Arc<dyn InstanceStore> = match &config.instances_table {
        Some(table) => Arc::new(DynamoDbInstanceStore::new(
            DynamoDbClient::new(&aws_config),
            table.clone(),
        )),
        None => {
            log::warn!("INSTANCES_TABLE not set; orchestration records are kept in memory");
            Arc::new(MemoryInstanceStore::with_retention(config.instance_retention))
        }
    };

    let activity = DetectionActivity::new(
        source_store,
        predictions_store,
        DetectorInvoker::new(config.detector.clone()),
        config.scratch_dir.clone(),
    );
    let orchestrator = web::Data::new(Orchestrator::new(Arc::new(activity), instances));
    let wait = web::Data::new(WaitSettings {
        timeout: config.wait_timeout,
    });

    log::info!(
        "Source bucket '{}', predictions bucket '{}'",
        config.source_bucket,
        config.predictions_bucket
    );
    log::info!("Starting server on {}", config.bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(orchestrator.clone())
            .app_data(wait.clone())
            .configure(configure_routes)
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
