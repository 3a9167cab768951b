use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use potato_disease_api::classifier::OnnxClassifier;
use potato_disease_api::config::Config;
use potato_disease_api::handlers::{self, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let classifier = OnnxClassifier::load(&config.model_path, config.image_size, config.input_layout)
        .context("model could not be loaded, refusing to serve")?;

    let state = web::Data::new(AppState::new(Arc::new(classifier), &config));
    let origins = config.cors_origins.clone();

    tracing::info!(
        host = %config.host,
        port = config.port,
        threshold = config.confidence_threshold,
        "Server running at http://{}:{}",
        config.host,
        config.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(potato_disease_api::cors(&origins))
            .app_data(state.clone())
            .configure(handlers::routes)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("server terminated")
}
