// src/main.rs
use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pbx_directory::ami::StatusPoller;
use pbx_directory::api;
use pbx_directory::config::Config;
use pbx_directory::services::DirectoryService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .json()
        .init();

    info!("🚀 Starting PBX Directory");

    // Load configuration
    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to load configuration")?;

    info!("Environment: {}", config.environment);

    // Fired on Ctrl-C so in-flight AMI sessions close promptly
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, cancelling AMI sessions");
            signal_shutdown.cancel();
        }
    });

    let directory = Arc::new(DirectoryService::new(
        StatusPoller::tcp(config.session.clone()),
        config.ami.clone(),
        shutdown,
    ));

    // HTTP Server
    let bind_address = format!("{}:{}", config.host, config.port);
    info!("🌐 Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::HeaderName::from_static("x-client-info"),
                header::HeaderName::from_static("apikey"),
            ])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(web::Data::new(directory.clone()))
            .configure(api::routes::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await?;

    Ok(())
}
