//! Service configuration, read from the environment
//!
//! - `UPDATE_MANIFESTS_DIR`: root of the manifest tree (default: "./manifests")
//! - `UPDATE_HOST`: base URL artifacts are served from, e.g. "https://download.example.org"
//! - `UPDATE_PRODUCT_NAME`: product name in artifact filenames (default: "Zotero")
//! - `UPDATE_ROLLOUT_ALLOW_IPS`: comma-separated client addresses exempt from rollout ceilings
//! - `UPDATE_ROLLOUT_PERCENT`: share of automatic checks let past rollout ceilings (0-100)

use std::{net::IpAddr, path::PathBuf};

use crate::error::UpdateServiceError;

pub const DEFAULT_PRODUCT_NAME: &str = "Zotero";

#[derive(Debug, Clone)]
pub struct UpdateServiceConfig {
    pub manifests_dir: PathBuf,
    /// Checked per request; a missing host fails URL construction
    pub host: Option<String>,
    pub product_name: String,
    pub rollout: RolloutConfig,
}

/// Extension point for staged rollouts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutConfig {
    pub allow_ips: Vec<IpAddr>,
    pub percent: u8,
}

impl UpdateServiceConfig {
    pub fn new(manifests_dir: impl Into<PathBuf>, host: Option<String>) -> Self {
        Self {
            manifests_dir: manifests_dir.into(),
            host: host.map(normalize_host),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            rollout: RolloutConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self, UpdateServiceError> {
        let manifests_dir =
            std::env::var("UPDATE_MANIFESTS_DIR").unwrap_or_else(|_| "./manifests".to_string());

        let host = std::env::var("UPDATE_HOST")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(normalize_host);

        let product_name = std::env::var("UPDATE_PRODUCT_NAME")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string());

        let allow_ips = match std::env::var("UPDATE_ROLLOUT_ALLOW_IPS") {
            Ok(list) => parse_ip_list(&list)?,
            Err(_) => Vec::new(),
        };

        let percent = match std::env::var("UPDATE_ROLLOUT_PERCENT") {
            Ok(value) => parse_percent(&value)?,
            Err(_) => 0,
        };

        Ok(Self {
            manifests_dir: PathBuf::from(manifests_dir),
            host,
            product_name,
            rollout: RolloutConfig { allow_ips, percent },
        })
    }
}

fn normalize_host(host: String) -> String {
    host.trim().trim_end_matches('/').to_string()
}

fn parse_ip_list(list: &str) -> Result<Vec<IpAddr>, UpdateServiceError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>().map_err(|e| {
                UpdateServiceError::Configuration(format!(
                    "UPDATE_ROLLOUT_ALLOW_IPS entry '{s}' is not an IP address: {e}"
                ))
            })
        })
        .collect()
}

fn parse_percent(value: &str) -> Result<u8, UpdateServiceError> {
    match value.trim().parse::<u8>() {
        Ok(p) if p <= 100 => Ok(p),
        _ => Err(UpdateServiceError::Configuration(format!(
            "UPDATE_ROLLOUT_PERCENT must be between 0 and 100, got '{value}'"
        ))),
    }
}
