use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_facilitator::bootstrap;
use x402_facilitator::config::FacilitatorConfig;
use x402_facilitator::routes;

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default().allowed_origin_fn(|origin, _| {
            origin
                .to_str()
                .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                .unwrap_or(false)
        })
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allow_any_method()
        .allowed_headers(vec!["content-type", "authorization", "x-facilitator-auth"])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match FacilitatorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let state = match bootstrap::build_state(&config) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            tracing::error!("Refusing to start: {e}");
            std::process::exit(1);
        }
    };
    state.facilitator.start_cache_cleanup();

    if config.metrics_token.is_none() && config.public_metrics {
        tracing::warn!("METRICS_TOKEN not set and X402_PUBLIC_METRICS enabled: /metrics is public");
    }

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("invalid RATE_LIMIT_RPM: {}", config.rate_limit_rpm);
            std::process::exit(1);
        }
    };

    let port = config.port;
    tracing::info!("x402 settlement facilitator listening on port {port}");
    tracing::info!("Ledger owner: {}", config.owner);
    tracing::info!(
        "Network {} / ledger {}",
        config.chain.network,
        config.chain.ledger_address
    );
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  GET  http://localhost:{port}/supported");
    tracing::info!("  POST http://localhost:{port}/verify");
    tracing::info!("  POST http://localhost:{port}/settle");

    let cors_origins = config.allowed_origins.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .app_data(web::PayloadConfig::new(65_536))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::supported)
            .service(routes::balance)
            .service(routes::verify)
            .service(routes::settle)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
