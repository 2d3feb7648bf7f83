//! Turns a resolved target build into the update offered to a client.

use tracing::{debug, instrument, warn};

use crate::{
    error::UpdateServiceResult,
    manifest::{HASH_FUNCTION, ManifestStore},
    types::{
        Build, Channel, NoUpdateReason, Patch, PatchType, Platform, Resolution,
        UpdateDescriptor, UpdateType,
    },
    utils::{artifact_base_url, encode_path_segment},
    version::{compare, is_at_least, release_line},
};

/// Clients at or below this version can only unpack bzip2-compressed
/// update archives; artifacts built for them carry a `bz_` marker
pub const LEGACY_COMPRESSION_BOUNDARY: &str = "6.999";

/// Release-line pairs that count as a minor update even though the
/// leading version components differ
const ADJACENT_MINOR_LINES: &[((u64, u64), (u64, u64))] = &[((7, 0), (7, 1))];

/// The parts of a client request the builder looks at
#[derive(Debug, Clone)]
pub struct DescriptorRequest<'a> {
    pub channel: Channel,
    pub platform: Platform,
    pub from_version: &'a str,
    pub user_agent: Option<&'a str>,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct DescriptorBuilder<'a> {
    store: &'a ManifestStore,
    host: Option<&'a str>,
    product_name: &'a str,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(store: &'a ManifestStore, host: Option<&'a str>, product_name: &'a str) -> Self {
        Self {
            store,
            host,
            product_name,
        }
    }

    #[instrument(skip(self, request, target), fields(
        channel = %request.channel,
        platform = %request.platform,
        from_version = request.from_version,
        target_version = %target.version
    ))]
    pub fn build(
        &self,
        request: &DescriptorRequest<'_>,
        target: &Build,
    ) -> UpdateServiceResult<Resolution> {
        // Forcing re-offers the current build but never a downgrade
        let current = if request.force {
            compare(request.from_version, &target.version).is_gt()
        } else {
            is_at_least(request.from_version, &target.version)
        };
        if current {
            debug!("Client is already on {} or newer", target.version);
            return Ok(Resolution::NoUpdate(NoUpdateReason::AlreadyCurrent));
        }

        if let Some(descriptor) = hardcoded_descriptor(request, self.host)? {
            debug!("Serving hard-coded update {}", descriptor.version);
            return Ok(Resolution::Update(descriptor));
        }

        let update_type = classify(request.from_version, target);
        let names = ArtifactNames::new(
            self.product_name,
            &target.version,
            request.from_version,
            request.platform,
        );
        let base_url = artifact_base_url(self.host, request.channel, &target.version)?;

        let mut patches = Vec::with_capacity(2);
        for (patch_type, filename) in [
            (PatchType::Complete, &names.complete),
            (PatchType::Partial, &names.partial),
        ] {
            let Some(info) = self.store.get_patch_info(
                request.channel,
                &target.version,
                request.platform,
                filename,
            ) else {
                debug!("No {} patch {}", patch_type.as_str(), filename);
                continue;
            };
            patches.push(Patch {
                patch_type,
                url: format!("{}{}", base_url, encode_path_segment(filename)),
                hash_function: HASH_FUNCTION.to_string(),
                hash_value: info.hash_value,
                size: info.size,
            });
        }

        if patches.is_empty() {
            warn!(
                "No patches found for {}/{}/{}",
                request.channel, request.platform, target.version
            );
            return Ok(Resolution::NoUpdate(NoUpdateReason::NoPatches));
        }

        Ok(Resolution::Update(UpdateDescriptor {
            update_type,
            version: target.version.clone(),
            build_id: target.build_id.clone(),
            details_url: target.details_url.clone(),
            show_prompt: None,
            prompt_wait_time: None,
            patches,
        }))
    }
}

/// Major or minor, from the build's explicit flag or else from whether the
/// two versions share a release line
pub fn classify(from_version: &str, target: &Build) -> UpdateType {
    if let Some(major) = target.major {
        return if major {
            UpdateType::Major
        } else {
            UpdateType::Minor
        };
    }
    match (release_line(from_version), release_line(&target.version)) {
        (Some(from), Some(to)) if from == to || ADJACENT_MINOR_LINES.contains(&(from, to)) => {
            UpdateType::Minor
        }
        _ => UpdateType::Major,
    }
}

/// Filenames of the complete and partial update archives for a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub complete: String,
    pub partial: String,
}

impl ArtifactNames {
    pub fn new(product: &str, target_version: &str, from_version: &str, platform: Platform) -> Self {
        let marker = if !compare(from_version, LEGACY_COMPRESSION_BOUNDARY).is_gt()
            && compare(target_version, LEGACY_COMPRESSION_BOUNDARY).is_gt()
        {
            "bz_"
        } else {
            ""
        };
        let platform = platform.as_str();
        Self {
            complete: format!("{product}-{target_version}-full_{marker}{platform}.mar"),
            partial: format!("{product}-{target_version}-{from_version}_{marker}{platform}.mar"),
        }
    }
}

enum Trigger {
    UserAgent(&'static [&'static str]),
    FromVersion(&'static [&'static str]),
}

/// A literal update for an upgrade path the normal patch chain cannot serve
struct HardcodedUpdate {
    /// Any channel when unset
    channel: Option<Channel>,
    platform: Platform,
    trigger: Trigger,
    descriptor: fn(Option<&str>) -> UpdateServiceResult<UpdateDescriptor>,
}

const HARDCODED_UPDATES: &[HardcodedUpdate] = &[
    HardcodedUpdate {
        channel: None,
        platform: Platform::Mac,
        trigger: Trigger::UserAgent(&["OS X 10.6;", "OS X 10.7;", "OS X 10.8;"]),
        descriptor: last_update_for_mac_10_6,
    },
    HardcodedUpdate {
        channel: None,
        platform: Platform::Mac,
        trigger: Trigger::FromVersion(&["4.0.28.6", "4.0.28.7"]),
        descriptor: manual_download_after_failed_mac_update,
    },
];

fn hardcoded_descriptor(
    request: &DescriptorRequest<'_>,
    host: Option<&str>,
) -> UpdateServiceResult<Option<UpdateDescriptor>> {
    let matched = HARDCODED_UPDATES.iter().find(|entry| {
        entry.channel.is_none_or(|c| c == request.channel)
            && entry.platform == request.platform
            && match entry.trigger {
                Trigger::UserAgent(patterns) => request
                    .user_agent
                    .is_some_and(|ua| patterns.iter().any(|p| ua.contains(p))),
                Trigger::FromVersion(versions) => versions.contains(&request.from_version),
            }
    });
    matched.map(|entry| (entry.descriptor)(host)).transpose()
}

/// macOS 10.6-10.8 cannot run anything past 4.0.29.11
fn last_update_for_mac_10_6(host: Option<&str>) -> UpdateServiceResult<UpdateDescriptor> {
    let base_url = artifact_base_url(host, Channel::Release, "4.0.29.11")?;
    Ok(UpdateDescriptor {
        update_type: UpdateType::Minor,
        version: "4.0.29.11".to_string(),
        build_id: "20160827171848".to_string(),
        details_url: "http://www.zotero.org/support/4.0_changelog".to_string(),
        show_prompt: None,
        prompt_wait_time: None,
        patches: vec![Patch {
            patch_type: PatchType::Complete,
            url: format!("{base_url}Zotero-4.0.29.11-full_mac.mar"),
            hash_function: "SHA512".to_string(),
            hash_value: "1433f86d7faa28ae46c8c064aa436da20b6eef3cd9403c70aa8eca7e85255e7a2596919377d22f44232714852135c36c591282d438757b0a7c77d6356caf3822".to_string(),
            size: 75353698,
        }],
    })
}

/// 4.0.28.6 and 4.0.28.7 on macOS cannot apply updates; prompt the user to
/// download the next release by hand
fn manual_download_after_failed_mac_update(
    _host: Option<&str>,
) -> UpdateServiceResult<UpdateDescriptor> {
    Ok(UpdateDescriptor {
        update_type: UpdateType::Minor,
        version: "You will need to download this update from zotero.org/download".to_string(),
        build_id: "20151003".to_string(),
        details_url: "http://www.zotero.org/support/4.0_changelog".to_string(),
        show_prompt: Some(true),
        prompt_wait_time: Some(1),
        patches: vec![Patch {
            patch_type: PatchType::Complete,
            url: "https://www.zotero.org/download/client/4.0.28.8-mac-update-failure".to_string(),
            hash_function: "SHA512".to_string(),
            hash_value: "3a777d6df7c87a496643d1a24261b2bce65a2cea16e9fff1ab7f9dfdb5c752af537783e49d6f14be818f06c9bc92debc6d0e3efa539ff0ff15ec9421a26e8e7b".to_string(),
            size: 44520206,
        }],
    })
}
