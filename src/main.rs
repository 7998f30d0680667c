use actix_cors::Cors;
use actix_web::{http::header, App, HttpServer};
use anyhow::Context;
use authgate::config::CorsConfig;
use authgate::{configure, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn build_cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        // CORS disabled - use most restrictive settings
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default().allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(config.max_age as usize)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let config = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded successfully ({} environment)", config.environment);

    // Store connections are established once; failing here aborts startup
    let state = AppState::new(config.clone())
        .await
        .context("failed to initialise stores")?;

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
        .context("failed to bind listener")?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let workers = config.server.workers as usize;
    let cors_config = config.cors.clone();

    // Graceful shutdown on SIGINT/SIGTERM is handled by the actix server itself
    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_config))
            .configure(configure(state.clone()))
    })
    .listen(listener)?
    .workers(workers)
    .shutdown_timeout(5)
    .run()
    .await
    .context("server terminated with an error")?;

    Ok(())
}
