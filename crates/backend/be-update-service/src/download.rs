//! Installer and archive names for direct download links

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    descriptor::LEGACY_COMPRESSION_BOUNDARY,
    error::{UpdateServiceError, UpdateServiceResult},
    types::{Channel, Platform},
    utils::{artifact_base_url, encode_path_segment},
    version::compare,
};

static DOWNLOAD_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+").expect("download version pattern is valid"));

/// Platform names accepted by the download endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPlatform {
    Mac,
    LinuxI686,
    LinuxX86_64,
    LinuxArm64,
    Win32,
    Win32Zip,
    WinX64,
    WinX64Zip,
    WinArm64,
    WinArm64Zip,
}

impl DownloadPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadPlatform::Mac => "mac",
            DownloadPlatform::LinuxI686 => "linux-i686",
            DownloadPlatform::LinuxX86_64 => "linux-x86_64",
            DownloadPlatform::LinuxArm64 => "linux-arm64",
            DownloadPlatform::Win32 => "win32",
            DownloadPlatform::Win32Zip => "win32-zip",
            DownloadPlatform::WinX64 => "win-x64",
            DownloadPlatform::WinX64Zip => "win-x64-zip",
            DownloadPlatform::WinArm64 => "win-arm64",
            DownloadPlatform::WinArm64Zip => "win-arm64-zip",
        }
    }

    /// Build list the latest version is taken from
    pub fn build_platform(&self) -> Platform {
        match self {
            DownloadPlatform::Mac => Platform::Mac,
            DownloadPlatform::LinuxI686 => Platform::LinuxI686,
            DownloadPlatform::LinuxX86_64 => Platform::LinuxX86_64,
            DownloadPlatform::LinuxArm64 => Platform::LinuxArm64,
            DownloadPlatform::Win32 | DownloadPlatform::Win32Zip => Platform::Win32,
            DownloadPlatform::WinX64 | DownloadPlatform::WinX64Zip => Platform::Win64,
            DownloadPlatform::WinArm64 | DownloadPlatform::WinArm64Zip => Platform::WinArm64,
        }
    }

    pub fn filename(&self, product: &str, version: &str) -> String {
        match self {
            DownloadPlatform::Mac => format!("{product}-{version}.dmg"),
            DownloadPlatform::LinuxI686
            | DownloadPlatform::LinuxX86_64
            | DownloadPlatform::LinuxArm64 => {
                format!("{product}-{version}_{}.tar.bz2", self.as_str())
            }
            DownloadPlatform::WinX64 => format!("{product}-{version}_x64_setup.exe"),
            DownloadPlatform::WinX64Zip => format!("{product}-{version}_win-x64.zip"),
            DownloadPlatform::WinArm64 => format!("{product}-{version}_arm64_setup.exe"),
            DownloadPlatform::WinArm64Zip => format!("{product}-{version}_win-arm64.zip"),
            // The 32-bit installer was the only Windows installer before 7.0
            DownloadPlatform::Win32 => {
                if compare(version, LEGACY_COMPRESSION_BOUNDARY).is_gt() {
                    format!("{product}-{version}_win32_setup.exe")
                } else {
                    format!("{product}-{version}_setup.exe")
                }
            }
            DownloadPlatform::Win32Zip => format!("{product}-{version}_win32.zip"),
        }
    }
}

impl std::str::FromStr for DownloadPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mac" => Ok(DownloadPlatform::Mac),
            "linux-i686" => Ok(DownloadPlatform::LinuxI686),
            "linux-x86_64" => Ok(DownloadPlatform::LinuxX86_64),
            "linux-arm64" => Ok(DownloadPlatform::LinuxArm64),
            "win32" => Ok(DownloadPlatform::Win32),
            "win32-zip" => Ok(DownloadPlatform::Win32Zip),
            "win-x64" => Ok(DownloadPlatform::WinX64),
            "win-x64-zip" => Ok(DownloadPlatform::WinX64Zip),
            "win-arm64" => Ok(DownloadPlatform::WinArm64),
            "win-arm64-zip" => Ok(DownloadPlatform::WinArm64Zip),
            _ => Err(format!("Unknown download platform: {}", s)),
        }
    }
}

impl std::fmt::Display for DownloadPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reject anything that does not look like a release version
pub fn validate_version(version: &str) -> UpdateServiceResult<&str> {
    if DOWNLOAD_VERSION.is_match(version) {
        Ok(version)
    } else {
        Err(UpdateServiceError::InvalidVersion(version.to_string()))
    }
}

/// A resolved download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub channel: Channel,
    pub version: String,
    pub filename: String,
}

impl DownloadTarget {
    pub fn redirect_url(&self, host: Option<&str>) -> UpdateServiceResult<String> {
        let base_url = artifact_base_url(host, self.channel, &self.version)?;
        Ok(format!("{}{}", base_url, encode_path_segment(&self.filename)))
    }
}
