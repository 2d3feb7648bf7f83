use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{Router, http::HeaderValue};
use be_update_service::{UpdateServiceConfig, init_update_service};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Configuration for running the update server.
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub service: UpdateServiceConfig,
    /// When this receiver gets a value, the server shuts down gracefully.
    pub shutdown: tokio::sync::watch::Receiver<()>,
}

fn build_cors() -> CorsLayer {
    let allowed: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "https://www.zotero.org".into())
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<HeaderValue>().ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Update routes plus `/health`
pub fn build_router(update_router: Router) -> Router {
    let health_route = Router::new().route(
        "/health",
        axum::routing::get(|| async { axum::http::StatusCode::OK }),
    );

    update_router.merge(health_route).layer(build_cors())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let update_router =
        init_update_service(config.service).context("Failed to initialize update service")?;
    let http_router = build_router(update_router);

    tracing::info!("Starting HTTP server at {}", config.http_addr);

    let mut http_shutdown = config.shutdown.clone();
    let http_listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    axum::serve(
        http_listener,
        http_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = http_shutdown.changed().await;
        tracing::info!("Shutting down HTTP server...");
    })
    .await
    .context("HTTP server error")?;

    Ok(())
}
