//! Update resolution and download lookup over the manifest tree

use tracing::{debug, instrument, warn};

use crate::{
    config::UpdateServiceConfig,
    descriptor::{DescriptorBuilder, DescriptorRequest},
    download::{DownloadPlatform, DownloadTarget, validate_version},
    error::{UpdateServiceError, UpdateServiceResult},
    manifest::ManifestStore,
    policy::{self, Decision, PolicyContext},
    types::{Build, Channel, ClientRequest, NoUpdateReason, Platform, Resolution},
};

/// Stateless resolver; every call reads the manifest tree afresh
#[derive(Debug, Clone)]
pub struct UpdateEngine {
    config: UpdateServiceConfig,
    store: ManifestStore,
}

impl UpdateEngine {
    pub fn new(config: UpdateServiceConfig) -> Self {
        let store = ManifestStore::new(config.manifests_dir.clone());
        Self { config, store }
    }

    pub fn config(&self) -> &UpdateServiceConfig {
        &self.config
    }

    /// Decide what, if anything, to offer the client
    #[instrument(skip(self, request), fields(
        channel = %request.channel,
        build_target = %request.build_target,
        from_version = %request.from_version,
        manual = request.manual,
        force = request.force
    ))]
    pub fn resolve_update(&self, request: &ClientRequest) -> UpdateServiceResult<Resolution> {
        let channel = Channel::from_client(&request.channel)
            .map_err(|_| UpdateServiceError::InvalidChannel(request.channel.clone()))?;
        let platform = Platform::from_build_target(&request.build_target).ok_or_else(|| {
            warn!("Unknown build target {}", request.build_target);
            UpdateServiceError::InvalidBuildTarget(request.build_target.clone())
        })?;
        debug!("Resolved platform {} on channel {}", platform, channel);

        if policy::is_denied(
            channel,
            platform,
            &request.from_version,
            request.updater_fixed,
        ) {
            debug!("Client version is denylisted");
            return Ok(Resolution::NoUpdate(NoUpdateReason::Denied));
        }

        let ctx = PolicyContext::new(request, channel, platform, &self.config.rollout);
        let (target_channel, target) = match policy::evaluate(&ctx) {
            Some(decision) => {
                let target_channel = decision.channel_or(channel);
                (target_channel, self.decided_build(decision, target_channel, platform)?)
            }
            None => {
                let build = self
                    .store
                    .get_latest_build(channel, platform)
                    .ok_or(UpdateServiceError::BuildNotFound { channel, platform })?;
                (channel, build)
            }
        };
        debug!("Target build {} in {}", target.version, target_channel);

        let builder = DescriptorBuilder::new(
            &self.store,
            self.config.host.as_deref(),
            &self.config.product_name,
        );
        builder.build(
            &DescriptorRequest {
                channel: target_channel,
                platform,
                from_version: &request.from_version,
                user_agent: request.user_agent.as_deref(),
                force: request.force,
            },
            &target,
        )
    }

    fn decided_build(
        &self,
        decision: Decision,
        channel: Channel,
        platform: Platform,
    ) -> UpdateServiceResult<Build> {
        match decision {
            Decision::Pin { build, .. } => Ok(build),
            Decision::Cap { version, .. } => self
                .store
                .get_build_for_version(channel, platform, &version)
                .ok_or(UpdateServiceError::CeilingBuildNotFound {
                    channel,
                    platform,
                    version,
                }),
        }
    }

    /// Version of the newest build published for a channel and platform
    pub fn latest_version(
        &self,
        channel: Channel,
        platform: Platform,
    ) -> UpdateServiceResult<String> {
        self.store
            .get_latest_build(channel, platform)
            .map(|build| build.version)
            .ok_or(UpdateServiceError::BuildNotFound { channel, platform })
    }

    /// Installer or archive a download link points at
    #[instrument(skip(self))]
    pub fn resolve_download(
        &self,
        platform: &str,
        channel: Option<&str>,
        version: Option<&str>,
    ) -> UpdateServiceResult<DownloadTarget> {
        let platform: DownloadPlatform = platform
            .parse()
            .map_err(|_| UpdateServiceError::InvalidPlatform(platform.to_string()))?;
        let channel = match channel.filter(|c| !c.is_empty()) {
            Some(c) => c
                .parse::<Channel>()
                .map_err(|_| UpdateServiceError::InvalidChannel(c.to_string()))?,
            None => Channel::Release,
        };

        let version = match version.filter(|v| !v.is_empty()) {
            Some(v) => validate_version(v)?.to_string(),
            None => self.latest_version(channel, platform.build_platform())?,
        };

        let filename = platform.filename(&self.config.product_name, &version);
        debug!("Download {} for {} {}", filename, channel, platform);
        Ok(DownloadTarget {
            channel,
            version,
            filename,
        })
    }
}
