use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use issue_classifier::{
    configure, model::warm_up, AppState, Classifier, Config, OnnxClassifier, PredictionLog,
};

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::parse();

    let model_path = config.resolved_model_path();
    let classifier: Arc<dyn Classifier> = match OnnxClassifier::load(&model_path) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            error!("ERROR loading model: {e}");
            std::process::exit(1);
        }
    };
    warm_up(classifier.as_ref());

    let state = web::Data::new(AppState::new(
        classifier,
        PredictionLog::new(&config.prediction_path),
    ));
    let origins = config.allowed_origins.clone();

    let (host, port) = config.bind_address();
    info!("Server running at http://{host}:{port}");

    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
