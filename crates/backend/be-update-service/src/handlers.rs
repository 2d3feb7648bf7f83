use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::{
    error::UpdateServiceError,
    render::render_updates_xml,
    service::UpdateEngine,
    types::{ClientRequest, DownloadQuery, Resolution, UpdateParams, UpdateQuery, flag_set},
    utils::{client_address, user_agent},
};

/// Request metadata policy rules may look at
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub remote_address: Option<IpAddr>,
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientMeta {
            user_agent: user_agent(&parts.headers),
            remote_address: client_address(&parts.headers, peer),
        })
    }
}

#[instrument(skip(engine, query, meta), fields(
    version = %params.version,
    build_target = %params.build_target,
    channel = %params.channel,
    os_version = %params.os_version
))]
pub async fn update_xml_handler(
    State(engine): State<Arc<UpdateEngine>>,
    Path(params): Path<UpdateParams>,
    Query(query): Query<UpdateQuery>,
    meta: ClientMeta,
) -> Response {
    let request = ClientRequest::builder()
        .from_version(params.version)
        .build_id(params.build_id)
        .build_target(params.build_target)
        .locale(params.locale)
        .channel(params.channel)
        .os_version(params.os_version)
        .manual(flag_set(query.force.as_deref()))
        .force(flag_set(query.reoffer.as_deref()))
        .updater_fixed(flag_set(query.updater_fixed.as_deref()))
        .maybe_user_agent(meta.user_agent)
        .maybe_remote_address(meta.remote_address)
        .build();

    let result = tokio::task::spawn_blocking(move || -> Result<String, UpdateServiceError> {
        let resolution = engine.resolve_update(&request)?;
        match &resolution {
            Resolution::Update(update) => debug!(
                "Offering {} update to {} with {} patches",
                update.update_type.as_str(),
                update.version,
                update.patches.len()
            ),
            Resolution::NoUpdate(reason) => debug!("No update: {}", reason.as_str()),
        }
        render_updates_xml(&resolution)
    })
    .await;

    match result {
        Ok(Ok(xml)) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], xml).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => UpdateServiceError::Internal(e.to_string()).into_response(),
    }
}

/// Redirect to an installer, or return its bare filename when `fn` is set
#[instrument(skip(engine, query), fields(platform = ?query.platform, channel = ?query.channel))]
pub async fn download_handler(
    State(engine): State<Arc<UpdateEngine>>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let Some(platform) = query.platform.filter(|p| !p.is_empty()) else {
        return UpdateServiceError::InvalidPlatform(String::new()).into_response();
    };
    let filename_only = flag_set(query.filename_only.as_deref());
    let (channel, version) = (query.channel, query.version);

    let result = tokio::task::spawn_blocking(move || -> Result<String, UpdateServiceError> {
        let target =
            engine.resolve_download(&platform, channel.as_deref(), version.as_deref())?;
        if filename_only {
            return Ok(target.filename);
        }
        target.redirect_url(engine.config().host.as_deref())
    })
    .await;

    match result {
        Ok(Ok(body)) if filename_only => (StatusCode::OK, body).into_response(),
        Ok(Ok(location)) => {
            debug!("Redirecting to {}", location);
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(e) => UpdateServiceError::Internal(e.to_string()).into_response(),
    }
}
