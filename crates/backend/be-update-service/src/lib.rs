//! Client Update Service
//!
//! Answers the client updater's `update.xml` checks from a manifest tree
//! published by the release pipeline, and resolves direct download links.
//! Which build a client is offered depends on its channel, platform, current
//! version and OS, through the ordered rules in [`policy`].

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub mod config;
pub mod descriptor;
pub mod download;
pub mod error;
pub mod handlers;
pub mod manifest;
pub mod policy;
pub mod render;
pub mod service;
pub mod types;
pub mod utils;
pub mod version;

use service::UpdateEngine;

/// Create the axum router. CORS is left to the embedding server.
pub fn create_router(engine: Arc<UpdateEngine>) -> Router {
    Router::new()
        .route(
            "/update/{version}/{build_id}/{build_target}/{locale}/{channel}/{os_version}/update.xml",
            get(handlers::update_xml_handler),
        )
        .route("/download", get(handlers::download_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(engine)
}

/// Initialize the update service and return the router
pub fn init_update_service(config: UpdateServiceConfig) -> Result<Router> {
    debug!(
        "Initializing update service with manifests at {}",
        config.manifests_dir.display()
    );

    let manifests_dir = config.manifests_dir.clone();
    if !manifests_dir.is_dir() {
        return Err(anyhow::anyhow!("manifest directory does not exist"))
            .with_context(|| format!("Failed to open {}", manifests_dir.display()));
    }
    if config.host.is_none() {
        warn!("UPDATE_HOST is not set; update and download requests will fail");
    }

    Ok(create_router(Arc::new(UpdateEngine::new(config))))
}

// Re-export commonly used types
pub use config::{RolloutConfig, UpdateServiceConfig};
pub use error::{ErrorResponse, UpdateServiceError, UpdateServiceResult};
pub use types::{
    Build, Channel, ClientRequest, NoUpdateReason, Patch, PatchType, Platform, Resolution,
    UpdateDescriptor, UpdateType,
};
