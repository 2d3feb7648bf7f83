use std::{fs, path::Path};

use be_update_service::{
    Channel, ClientRequest, NoUpdateReason, PatchType, Platform, Resolution, RolloutConfig,
    UpdateServiceConfig, UpdateServiceError, UpdateType, service::UpdateEngine,
};
use percent_encoding::percent_decode_str;
use tempfile::TempDir;

const HOST: &str = "https://download.example.org";

struct ManifestTree {
    dir: TempDir,
}

impl ManifestTree {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn builds(&self, channel: &str, platform: &str, versions: &[&str]) -> &Self {
        let entries: Vec<String> = versions
            .iter()
            .map(|v| {
                format!(
                    r#"{{"version": "{v}", "buildID": "20240101000000", "detailsURL": "https://www.zotero.org/support/changelog"}}"#
                )
            })
            .collect();
        fs::create_dir_all(self.path().join(channel)).unwrap();
        fs::write(
            self.path()
                .join(channel)
                .join(format!("updates-{platform}.json")),
            format!("[{}]", entries.join(",")),
        )
        .unwrap();
        self
    }

    fn files(&self, channel: &str, version: &str, family: &str, names: &[&str]) -> &Self {
        let dir = self.path().join(channel).join(version);
        fs::create_dir_all(&dir).unwrap();
        let content: String = names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{name} {:064x} {}\n", i + 1, 1000 + i))
            .collect();
        fs::write(dir.join(format!("files-{family}")), content).unwrap();
        self
    }

    fn engine(&self) -> UpdateEngine {
        UpdateEngine::new(UpdateServiceConfig::new(self.path(), Some(HOST.to_string())))
    }
}

fn mac_request(from_version: &str, os_version: &str) -> ClientRequest {
    ClientRequest::builder()
        .from_version(from_version)
        .build_target("Darwin_x86_64-gcc3-u-i386-x86_64")
        .channel("release")
        .os_version(os_version)
        .build()
}

fn win64_request(from_version: &str) -> ClientRequest {
    ClientRequest::builder()
        .from_version(from_version)
        .build_target("WINNT_x86_64-msvc-x64")
        .channel("release")
        .os_version("Windows_NT 10.0.0.0 (x64)")
        .build()
}

#[test]
fn legacy_darwin_is_capped_with_single_complete_patch() {
    let tree = ManifestTree::new();
    tree.builds("release", "mac", &["6.0.36", "6.0.37", "7.0.11"])
        .files("release", "6.0.37", "mac", &["Zotero-6.0.37-full_mac.mar"]);

    let resolution = tree
        .engine()
        .resolve_update(&mac_request("4.0.29.15", "Darwin 15.6.0"))
        .unwrap();
    let update = resolution.update().unwrap();

    assert_eq!(update.update_type, UpdateType::Major);
    assert_eq!(update.version, "6.0.37");
    assert_eq!(update.patches.len(), 1);
    assert_eq!(update.patches[0].patch_type, PatchType::Complete);
    assert!(update.patches[0].url.contains("6.0.37"));
}

#[test]
fn minor_update_with_and_without_partial() {
    let tree = ManifestTree::new();
    tree.builds("release", "win64", &["7.0.9", "7.0.10", "7.0.11"])
        .files(
            "release",
            "7.0.11",
            "win",
            &["Zotero-7.0.11-full_win64.mar", "Zotero-7.0.11-7.0.10_win64.mar"],
        );
    let engine = tree.engine();

    let resolution = engine.resolve_update(&win64_request("7.0.10")).unwrap();
    let update = resolution.update().unwrap();
    assert_eq!(update.update_type, UpdateType::Minor);
    assert_eq!(update.patches.len(), 2);
    assert_eq!(update.patches[0].patch_type, PatchType::Complete);
    assert_eq!(update.patches[1].patch_type, PatchType::Partial);

    let resolution = engine.resolve_update(&win64_request("7.0.9")).unwrap();
    let update = resolution.update().unwrap();
    assert_eq!(update.patches.len(), 1);
    assert_eq!(update.patches[0].patch_type, PatchType::Complete);
}

#[test]
fn current_client_gets_no_update_unless_forced() {
    let tree = ManifestTree::new();
    tree.builds("release", "win64", &["7.0.10", "7.0.11"])
        .files("release", "7.0.11", "win", &["Zotero-7.0.11-full_win64.mar"]);
    let engine = tree.engine();

    assert_eq!(
        engine.resolve_update(&win64_request("7.0.11")).unwrap(),
        Resolution::NoUpdate(NoUpdateReason::AlreadyCurrent)
    );
    assert_eq!(
        engine.resolve_update(&win64_request("7.1")).unwrap(),
        Resolution::NoUpdate(NoUpdateReason::AlreadyCurrent)
    );

    let mut forced = win64_request("7.0.11");
    forced.force = true;
    let resolution = engine.resolve_update(&forced).unwrap();
    assert_eq!(resolution.update().unwrap().version, "7.0.11");
}

#[test]
fn force_respects_os_ceiling() {
    let tree = ManifestTree::new();
    tree.builds("release", "win64", &["7.0.15", "7.0.20"])
        .files("release", "7.0.15", "win", &["Zotero-7.0.15-full_win64.mar"]);
    let engine = tree.engine();

    let mut request = win64_request("7.0.20");
    request.os_version = "Windows_NT 6.1.1.0 (x64)".to_string();
    assert_eq!(
        engine.resolve_update(&request).unwrap(),
        Resolution::NoUpdate(NoUpdateReason::AlreadyCurrent)
    );

    // Windows 7 stays on 7.0.15; forcing must not offer it as a downgrade
    request.force = true;
    assert_eq!(
        engine.resolve_update(&request).unwrap(),
        Resolution::NoUpdate(NoUpdateReason::AlreadyCurrent)
    );

    // A client below the ceiling is still offered it
    let mut request = win64_request("7.0.10");
    request.os_version = "Windows_NT 6.1.1.0 (x64)".to_string();
    request.force = true;
    let resolution = engine.resolve_update(&request).unwrap();
    assert_eq!(resolution.update().unwrap().version, "7.0.15");
}

#[test]
fn malformed_requests_are_errors() {
    let tree = ManifestTree::new();
    tree.builds("release", "mac", &["7.0.11"]);
    let engine = tree.engine();

    let mut request = mac_request("7.0.10", "Darwin 23.1.0");
    request.build_target = "SunOS_sparc-gcc3".to_string();
    assert!(matches!(
        engine.resolve_update(&request),
        Err(UpdateServiceError::InvalidBuildTarget(_))
    ));

    let mut request = mac_request("7.0.10", "Darwin 23.1.0");
    request.channel = "nightly".to_string();
    assert!(matches!(
        engine.resolve_update(&request),
        Err(UpdateServiceError::InvalidChannel(_))
    ));

    // `default` is an alias for release
    let mut request = mac_request("7.0.10", "Darwin 23.1.0");
    request.channel = "default".to_string();
    assert!(engine.resolve_update(&request).is_ok());
}

#[test]
fn denylisted_version_needs_updater_fix() {
    let tree = ManifestTree::new();
    tree.builds("release", "win32", &["7.0.11"]).files(
        "release",
        "7.0.11",
        "win",
        &["Zotero-7.0.11-full_bz_win32.mar"],
    );
    let engine = tree.engine();

    let mut request = ClientRequest::builder()
        .from_version("5.0.96.1")
        .build_target("WINNT_x86-msvc")
        .channel("release")
        .os_version("Windows_NT 10.0.0.0")
        .build();
    assert_eq!(
        engine.resolve_update(&request).unwrap(),
        Resolution::NoUpdate(NoUpdateReason::Denied)
    );

    request.force = true;
    request.manual = true;
    assert_eq!(
        engine.resolve_update(&request).unwrap(),
        Resolution::NoUpdate(NoUpdateReason::Denied)
    );

    request.updater_fixed = true;
    let resolution = engine.resolve_update(&request).unwrap();
    let update = resolution.update().unwrap();
    assert_eq!(update.update_type, UpdateType::Major);
    // Clients from before the compression change get bzip2 archives
    assert!(update.patches[0].url.ends_with("Zotero-7.0.11-full_bz_win32.mar"));
}

#[test]
fn resolution_is_idempotent() {
    let tree = ManifestTree::new();
    tree.builds("release", "win64", &["7.0.10", "7.0.11"])
        .files(
            "release",
            "7.0.11",
            "win",
            &["Zotero-7.0.11-full_win64.mar", "Zotero-7.0.11-7.0.10_win64.mar"],
        );
    let engine = tree.engine();

    let first = engine.resolve_update(&win64_request("7.0.10")).unwrap();
    let second = engine.resolve_update(&win64_request("7.0.10")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn patch_filenames_round_trip_to_manifest() {
    let target = "7.0.0-beta.30+4b2c1d0e";
    let complete = format!("Zotero-{target}-full_linux-x86_64.mar");
    let partial = format!("Zotero-{target}-7.0.0-beta.29+9f8e7d6c_linux-x86_64.mar");

    let tree = ManifestTree::new();
    tree.builds("beta", "linux-x86_64", &["7.0.0-beta.29+9f8e7d6c", target])
        .files("beta", target, "linux", &[&complete, &partial]);

    let request = ClientRequest::builder()
        .from_version("7.0.0-beta.29+9f8e7d6c")
        .build_target("Linux_x86_64-gcc3")
        .channel("beta")
        .os_version("Linux 6.8.0-45-generic")
        .build();
    let resolution = tree.engine().resolve_update(&request).unwrap();
    let update = resolution.update().unwrap();
    assert_eq!(update.patches.len(), 2);

    let manifest =
        fs::read_to_string(tree.path().join("beta").join(target).join("files-linux")).unwrap();
    for patch in &update.patches {
        let encoded = patch.url.rsplit('/').next().unwrap();
        let filename = percent_decode_str(encoded).decode_utf8().unwrap();
        assert!(
            manifest
                .lines()
                .any(|line| line.split(' ').next() == Some(filename.as_ref())),
            "{filename} not in manifest"
        );
    }
}

#[test]
fn ceiling_equal_to_current_version_is_no_update() {
    let tree = ManifestTree::new();
    tree.builds("release", "mac", &["6.0.37", "7.0.11"])
        .files("release", "7.0.11", "mac", &["Zotero-7.0.11-full_bz_mac.mar"]);
    let engine = tree.engine();

    // Automatic checks on 6.0 stay there
    assert_eq!(
        engine
            .resolve_update(&mac_request("6.0.37", "Darwin 22.4.0"))
            .unwrap(),
        Resolution::NoUpdate(NoUpdateReason::AlreadyCurrent)
    );

    // Manual checks see the newest release
    let mut manual = mac_request("6.0.37", "Darwin 22.4.0");
    manual.manual = true;
    let resolution = engine.resolve_update(&manual).unwrap();
    let update = resolution.update().unwrap();
    assert_eq!(update.version, "7.0.11");
    assert_eq!(update.update_type, UpdateType::Major);
}

#[test]
fn rollout_allow_list_passes_ceiling() {
    let tree = ManifestTree::new();
    tree.builds("release", "mac", &["6.0.37", "7.0.11"])
        .files("release", "7.0.11", "mac", &["Zotero-7.0.11-full_bz_mac.mar"]);

    let mut config = UpdateServiceConfig::new(tree.path(), Some(HOST.to_string()));
    config.rollout = RolloutConfig {
        allow_ips: vec!["198.51.100.4".parse().unwrap()],
        percent: 0,
    };
    let engine = UpdateEngine::new(config);

    let mut request = mac_request("6.0.30", "Darwin 22.4.0");
    request.remote_address = Some("198.51.100.4".parse().unwrap());
    let resolution = engine.resolve_update(&request).unwrap();
    assert_eq!(resolution.update().unwrap().version, "7.0.11");

    request.remote_address = Some("198.51.100.5".parse().unwrap());
    assert_eq!(
        engine.resolve_update(&request).unwrap(),
        Resolution::NoUpdate(NoUpdateReason::NoPatches)
    );
}

#[test]
fn beta_clients_step_through_pinned_beta() {
    let stepping_stone = "7.0.0-beta.28+3a43a98f1";
    let tree = ManifestTree::new();
    tree.builds(
        "beta",
        "mac",
        &["7.0.0-beta.20+aaaaaaaaa", stepping_stone, "7.0.0-beta.40+bbbbbbbbb"],
    )
    .files(
        "beta",
        stepping_stone,
        "mac",
        &[&format!("Zotero-{stepping_stone}-full_mac.mar")],
    );

    let mut request = mac_request("7.0.0-beta.20+aaaaaaaaa", "Darwin 22.4.0");
    request.channel = "beta".to_string();
    let resolution = tree.engine().resolve_update(&request).unwrap();
    let update = resolution.update().unwrap();

    assert_eq!(update.version, stepping_stone);
    assert_eq!(update.update_type, UpdateType::Minor);
    assert!(update.patches[0].url.contains("/client/beta/7.0.0-beta.28%2B3a43a98f1/"));
}

#[test]
fn old_mac_user_agent_gets_hardcoded_update() {
    let tree = ManifestTree::new();
    tree.builds("release", "mac", &["6.0.37", "7.0.11"]);

    let mut request = mac_request("4.0.29.10", "Darwin 12.6.0");
    request.user_agent = Some(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.8; rv:48.0) Gecko/20100101 Zotero/4.0.29.10"
            .to_string(),
    );
    let resolution = tree.engine().resolve_update(&request).unwrap();
    let update = resolution.update().unwrap();

    assert_eq!(update.version, "4.0.29.11");
    assert_eq!(update.update_type, UpdateType::Minor);
    assert_eq!(update.patches[0].hash_function, "SHA512");
    assert_eq!(update.patches[0].size, 75353698);
}

#[test]
fn windows_xp_is_pinned() {
    let tree = ManifestTree::new();
    tree.files("release", "5.0.77", "win", &["Zotero-5.0.77-full_win32.mar"]);

    let request = ClientRequest::builder()
        .from_version("4.0.29.17")
        .build_target("WINNT_x86-msvc")
        .channel("release")
        .os_version("Windows_NT 5.1.3.0")
        .build();
    let resolution = tree.engine().resolve_update(&request).unwrap();
    let update = resolution.update().unwrap();

    assert_eq!(update.version, "5.0.77");
    assert_eq!(update.build_id, "20191031072159");
    assert_eq!(update.update_type, UpdateType::Major);
}

#[test]
fn legacy_patch_manifest_format() {
    let tree = ManifestTree::new();
    tree.builds("release", "linux-i686", &["5.0.95", "5.0.96"]);
    let dir = tree.path().join("release/5.0.96");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("sha512sums"),
        "abc123  Zotero-5.0.96-full_linux-i686.mar\ndef456  Zotero-5.0.96-5.0.95_linux-i686.mar\n",
    )
    .unwrap();
    fs::write(
        dir.join("files"),
        "-rw-r--r-- 1 zotero zotero 52000000 Nov 20 10:11 Zotero-5.0.96-full_linux-i686.mar\n\
         -rw-r--r-- 1 zotero zotero 1200000 Nov 20 10:11 Zotero-5.0.96-5.0.95_linux-i686.mar\n",
    )
    .unwrap();

    let request = ClientRequest::builder()
        .from_version("5.0.95")
        .build_target("Linux_x86-gcc3")
        .channel("release")
        .os_version("Linux 4.15.0")
        .build();
    let resolution = tree.engine().resolve_update(&request).unwrap();
    let update = resolution.update().unwrap();

    assert_eq!(update.patches.len(), 2);
    assert_eq!(update.patches[0].hash_value, "abc123");
    assert_eq!(update.patches[0].size, 52000000);
    assert_eq!(update.patches[1].size, 1200000);
}

#[test]
fn missing_data_and_configuration_are_errors() {
    let tree = ManifestTree::new();
    tree.builds("release", "linux-x86_64", &["7.0.11"])
        .files("release", "7.0.11", "linux", &["Zotero-7.0.11-full_linux-x86_64.mar"]);

    // Cross-major ceiling build is not published
    let request = ClientRequest::builder()
        .from_version("3.0.14")
        .build_target("Linux_x86_64-gcc3")
        .channel("release")
        .os_version("Linux 2.6.32")
        .build();
    let err = tree.engine().resolve_update(&request).unwrap_err();
    assert!(matches!(
        err,
        UpdateServiceError::CeilingBuildNotFound {
            channel: Channel::Release,
            platform: Platform::LinuxX86_64,
            ..
        }
    ));

    let request = ClientRequest::builder()
        .from_version("7.0.10")
        .build_target("Linux_x86_64-gcc3")
        .channel("release")
        .os_version("Linux 6.8.0")
        .build();
    let engine = UpdateEngine::new(UpdateServiceConfig::new(tree.path(), None));
    assert!(
        engine
            .resolve_update(&request)
            .unwrap_err()
            .is_configuration()
    );
}
