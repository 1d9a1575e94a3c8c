mod classifier;
mod config;
mod knowledge;
mod prediction;
mod routes;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use classifier::gradio::GradioClient;
use config::{AppConfig, ServerConfig};
use prediction::service::PredictionService;
use routes::configure_routes;
use std::sync::Arc;

fn cors(server: &ServerConfig) -> Cors {
    let cors = if server.allows_any_origin() {
        Cors::default().allow_any_origin()
    } else {
        server
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let classifier = GradioClient::new(&config.classifier).map_err(|e| {
        log::error!("Failed to build classifier client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let service = PredictionService::new(Arc::new(classifier), config.classifier.operation.clone());
    log::info!(
        "Classifier: space {} at {} (operation {}, timeout {}s)",
        config.classifier.space,
        service.classifier_endpoint(),
        service.operation(),
        config.classifier.timeout.as_secs()
    );
    log::info!(
        "Knowledge table loaded with {} curated labels",
        knowledge::disease_table::labels().count()
    );
    if config.server.allows_any_origin() {
        log::warn!("CORS allows any origin");
    }

    let service = web::Data::new(service);
    let server_config = config.server.clone();
    let bind_address = server_config.bind_address();

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&server_config))
            .app_data(service.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
