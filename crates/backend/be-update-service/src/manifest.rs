//! Read access to the on-disk manifest tree.
//!
//! Layout under the manifest root:
//!
//! ```text
//! <channel>/updates-<platform>.json          ordered build list, last entry is the latest
//! <channel>/<version>/build-<os_family>.json optional metadata for a single build
//! <channel>/<version>/files-<os_family>      "<filename> <sha512> <size>" per line
//! <channel>/<version>/files                  legacy: ls-style listing with sizes
//! <channel>/<version>/sha512sums             legacy: "<sha512>  <filename>" per line
//! ```
//!
//! The tree is written by the release pipeline. Every read failure is logged
//! and reported as "not found"; nothing here is fatal.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, instrument, warn};

use crate::types::{Build, Channel, PatchInfo, Platform};

/// Hash function of every digest listed in a patch manifest
pub const HASH_FUNCTION: &str = "sha512";

#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ordered build list for a channel and platform
    #[instrument(skip(self), fields(channel = %channel, platform = %platform))]
    pub fn get_builds(&self, channel: Channel, platform: Platform) -> Option<Vec<Build>> {
        let path = self
            .root
            .join(channel.as_str())
            .join(format!("updates-{}.json", platform.as_str()));
        let content = read_manifest(&path)?;

        match serde_json::from_str::<Vec<Build>>(&content) {
            Ok(builds) => {
                debug!("Loaded {} builds from {}", builds.len(), path.display());
                Some(builds)
            }
            Err(e) => {
                warn!("Failed to parse build list {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn get_latest_build(&self, channel: Channel, platform: Platform) -> Option<Build> {
        self.get_builds(channel, platform)?.pop()
    }

    /// Find a specific build, preferring its dedicated metadata file over a
    /// scan of the build list
    #[instrument(skip(self), fields(channel = %channel, platform = %platform, version))]
    pub fn get_build_for_version(
        &self,
        channel: Channel,
        platform: Platform,
        version: &str,
    ) -> Option<Build> {
        let dir = self.version_dir(channel, version)?;
        let path = dir.join(format!("build-{}.json", platform.os_family().as_str()));

        if path.is_file() {
            if let Some(content) = read_manifest(&path) {
                match serde_json::from_str::<Build>(&content) {
                    Ok(build) if build.version == version => {
                        debug!("Loaded build metadata from {}", path.display());
                        return Some(build);
                    }
                    Ok(build) => warn!(
                        "Build metadata {} is for version {}, not {}",
                        path.display(),
                        build.version,
                        version
                    ),
                    Err(e) => warn!("Failed to parse build metadata {}: {}", path.display(), e),
                }
            }
        }

        let found = self
            .get_builds(channel, platform)?
            .into_iter()
            .find(|build| build.version == version);
        if found.is_none() {
            debug!("Version {} not in build list", version);
        }
        found
    }

    /// Hash and size of one artifact of a build
    #[instrument(skip(self), fields(channel = %channel, version, platform = %platform, filename))]
    pub fn get_patch_info(
        &self,
        channel: Channel,
        version: &str,
        platform: Platform,
        filename: &str,
    ) -> Option<PatchInfo> {
        let dir = self.version_dir(channel, version)?;

        // Legacy directories keep checksums and sizes in two files
        let listing = dir.join("files");
        if listing.is_file() {
            let files = read_manifest(&listing)?;
            let sums = read_manifest(&dir.join("sha512sums"))?;
            return legacy_patch_info(&sums, &files, filename);
        }

        let manifest = dir.join(format!("files-{}", platform.os_family().as_str()));
        if manifest.is_file() {
            let content = read_manifest(&manifest)?;
            return consolidated_patch_info(&content, filename);
        }

        debug!("No patch manifest in {}", dir.display());
        None
    }

    fn version_dir(&self, channel: Channel, version: &str) -> Option<PathBuf> {
        if version.is_empty() || version.contains(['/', '\\']) || version == ".." {
            warn!("Refusing manifest path for version '{}'", version);
            return None;
        }
        Some(self.root.join(channel.as_str()).join(version))
    }
}

fn read_manifest(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!("Manifest {} unavailable: {}", path.display(), e);
            None
        }
    }
}

/// Look up `filename` in a `sha512sums` file and an `ls -l` style listing,
/// where the size sits four columns before the filename
fn legacy_patch_info(sums: &str, files: &str, filename: &str) -> Option<PatchInfo> {
    let hash_value = sums.lines().find_map(|line| {
        let (hash, name) = line.split_once("  ")?;
        (!hash.is_empty() && !hash.contains(' ') && name.trim_end() == filename)
            .then(|| hash.to_string())
    })?;

    let size = files.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let n = fields.len();
        if n < 5 || fields[n - 1] != filename {
            return None;
        }
        fields[n - 5].parse::<u64>().ok()
    })?;

    Some(PatchInfo { hash_value, size })
}

/// Look up `filename` in a `<filename> <hash> <size>` manifest
fn consolidated_patch_info(manifest: &str, filename: &str) -> Option<PatchInfo> {
    manifest.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let (name, hash, size) = (fields.next()?, fields.next()?, fields.next()?);
        if name != filename || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(PatchInfo {
            hash_value: hash.to_string(),
            size: size.parse().ok()?,
        })
    })
}
