//! Utility functions for artifact URLs and request metadata

use std::net::IpAddr;

use axum::http::{HeaderMap, header::USER_AGENT};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::{error::UpdateServiceError, types::Channel};

/// Everything but ASCII alphanumerics and `-_.` is escaped
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Percent-encode one URL path segment, e.g. `7.0.0-beta.28+3a43a98f1`
/// becomes `7.0.0-beta.28%2B3a43a98f1`
pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Directory URL artifacts of one build are served from:
/// `<host>/client/<channel>/<version>/`
pub fn artifact_base_url(
    host: Option<&str>,
    channel: Channel,
    version: &str,
) -> Result<String, UpdateServiceError> {
    let host = host.ok_or(UpdateServiceError::MissingHost)?;
    Ok(format!(
        "{}/client/{}/{}/",
        host,
        channel.as_str(),
        encode_path_segment(version)
    ))
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Client address as reported by the fronting proxy in `X-Forwarded-For`
/// (first entry), falling back to the socket peer
pub fn client_address(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or(peer)
}
