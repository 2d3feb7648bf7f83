//! Data types and structures for the update service

use std::net::IpAddr;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Release channel with an independent build list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Release,
    Beta,
    Dev,
}

impl Channel {
    /// Get the manifest directory name for this channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Release => "release",
            Channel::Beta => "beta",
            Channel::Dev => "dev",
        }
    }

    /// Parse the channel reported by an update client.
    ///
    /// Clients built without an explicit channel report `default`, which is
    /// served from the release channel.
    pub fn from_client(s: &str) -> Result<Self, String> {
        if s == "default" {
            return Ok(Channel::Release);
        }
        s.parse()
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(Channel::Release),
            "beta" => Ok(Channel::Beta),
            "dev" => Ok(Channel::Dev),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform a build list and its update artifacts are published for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Mac,
    Win32,
    Win64,
    WinArm64,
    LinuxI686,
    LinuxX86_64,
    LinuxArm64,
}

/// Build target prefixes sent by update clients, e.g. `Darwin_x86_64-gcc3`
/// or `WINNT_x86-msvc-x64`. Resolved by longest matching prefix.
const BUILD_TARGET_PREFIXES: &[(&str, Platform)] = &[
    ("Darwin", Platform::Mac),
    ("WINNT_x86", Platform::Win32),
    ("WINNT_x86_64", Platform::Win64),
    ("WINNT_aarch64", Platform::WinArm64),
    ("Linux_x86", Platform::LinuxI686),
    ("Linux_x86_64", Platform::LinuxX86_64),
    ("Linux_aarch64", Platform::LinuxArm64),
];

impl Platform {
    /// Get the manifest name for this platform, also used as the platform tag
    /// in update artifact filenames
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mac => "mac",
            Platform::Win32 => "win32",
            Platform::Win64 => "win64",
            Platform::WinArm64 => "win-arm64",
            Platform::LinuxI686 => "linux-i686",
            Platform::LinuxX86_64 => "linux-x86_64",
            Platform::LinuxArm64 => "linux-arm64",
        }
    }

    pub fn os_family(&self) -> OsFamily {
        match self {
            Platform::Mac => OsFamily::Mac,
            Platform::Win32 | Platform::Win64 | Platform::WinArm64 => OsFamily::Win,
            Platform::LinuxI686 | Platform::LinuxX86_64 | Platform::LinuxArm64 => {
                OsFamily::Linux
            }
        }
    }

    /// Resolve the platform from a client build target
    pub fn from_build_target(build_target: &str) -> Option<Self> {
        BUILD_TARGET_PREFIXES
            .iter()
            .filter(|(prefix, _)| build_target.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, platform)| *platform)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    /// Zip variants and the installer-style Windows names share the build list
    /// of their installer platform.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mac" => Ok(Platform::Mac),
            "win32" | "win32-zip" => Ok(Platform::Win32),
            "win64" | "win64-zip" | "win-x64" | "win-x64-zip" => Ok(Platform::Win64),
            "win-arm64" | "win-arm64-zip" => Ok(Platform::WinArm64),
            "linux-i686" => Ok(Platform::LinuxI686),
            "linux-x86_64" => Ok(Platform::LinuxX86_64),
            "linux-arm64" => Ok(Platform::LinuxArm64),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operating system family; patch manifests are published per family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Mac,
    Win,
    Linux,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Mac => "mac",
            OsFamily::Win => "win",
            OsFamily::Linux => "linux",
        }
    }
}

/// A published build, as stored in `updates-<platform>.json`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub version: String,
    #[serde(rename = "buildID")]
    pub build_id: String,
    #[serde(rename = "detailsURL")]
    pub details_url: String,
    /// Explicit classification; inferred from the versions when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<bool>,
}

/// An update check as reported by a client
#[derive(Builder, Debug, Clone)]
#[builder(on(String, into))]
pub struct ClientRequest {
    pub from_version: String,
    #[builder(default)]
    pub build_id: String,
    pub build_target: String,
    #[builder(default)]
    pub locale: String,
    pub channel: String,
    #[builder(default)]
    pub os_version: String,
    /// User-initiated check rather than a background one
    #[builder(default)]
    pub manual: bool,
    /// Offer the target even when the client already runs it
    #[builder(default)]
    pub force: bool,
    /// The client reports an updater patched by hand, skipping the denylist
    #[builder(default)]
    pub updater_fixed: bool,
    pub user_agent: Option<String>,
    pub remote_address: Option<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    Major,
    Minor,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Major => "major",
            UpdateType::Minor => "minor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    Complete,
    Partial,
}

impl PatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchType::Complete => "complete",
            PatchType::Partial => "partial",
        }
    }
}

/// Hash and size of one artifact, as listed in a patch manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchInfo {
    pub hash_value: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub patch_type: PatchType,
    pub url: String,
    pub hash_function: String,
    pub hash_value: String,
    pub size: u64,
}

/// The update offered to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDescriptor {
    pub update_type: UpdateType,
    pub version: String,
    pub build_id: String,
    pub details_url: String,
    pub show_prompt: Option<bool>,
    pub prompt_wait_time: Option<u32>,
    /// Complete patch first, then partial
    pub patches: Vec<Patch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoUpdateReason {
    AlreadyCurrent,
    Denied,
    NoPatches,
}

impl NoUpdateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoUpdateReason::AlreadyCurrent => "already_current",
            NoUpdateReason::Denied => "denied",
            NoUpdateReason::NoPatches => "no_patches",
        }
    }
}

/// Outcome of a successful update check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Update(UpdateDescriptor),
    NoUpdate(NoUpdateReason),
}

impl Resolution {
    pub fn update(&self) -> Option<&UpdateDescriptor> {
        match self {
            Resolution::Update(descriptor) => Some(descriptor),
            Resolution::NoUpdate(_) => None,
        }
    }
}

/// Path parameters for the update check endpoint
#[derive(Deserialize, Debug)]
pub struct UpdateParams {
    pub version: String,
    pub build_id: String,
    pub build_target: String, // e.g., "Darwin_x86_64-gcc3", "WINNT_x86-msvc-x64"
    pub locale: String,
    pub channel: String,    // "release", "beta", "dev" or "default"
    pub os_version: String, // e.g., "Darwin 22.4.0", "Windows_NT 10.0.0.0 (x64)"
}

/// Query flags for the update check endpoint
#[derive(Deserialize, Debug, Default)]
pub struct UpdateQuery {
    /// Sent by update clients on user-initiated checks
    pub force: Option<String>,
    pub reoffer: Option<String>,
    #[serde(rename = "updaterFixed")]
    pub updater_fixed: Option<String>,
}

/// Query parameters for the download redirect endpoint
#[derive(Deserialize, Debug, Default)]
pub struct DownloadQuery {
    pub platform: Option<String>,
    pub channel: Option<String>,
    pub version: Option<String>,
    /// Return the bare filename instead of redirecting
    #[serde(rename = "fn")]
    pub filename_only: Option<String>,
}

/// A query flag is set when present, non-empty and not `0`
pub fn flag_set(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0")
}
