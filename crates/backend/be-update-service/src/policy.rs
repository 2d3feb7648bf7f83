//! Eligibility policy: which build a client may be offered.
//!
//! Policy is an ordered list of rules evaluated first-match-wins. Each rule is
//! a pure function of the [`PolicyContext`]. New historical exceptions are
//! added as new rules or new table rows, never as edits to existing branches.
//!
//! The denylist is separate and is checked before any rule.

use std::{net::IpAddr, sync::LazyLock};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    config::RolloutConfig,
    types::{Build, Channel, ClientRequest, OsFamily, Platform},
    version::{compare, release_line},
};

/// Everything a policy rule may look at
#[derive(Debug, Clone)]
pub struct PolicyContext<'a> {
    pub channel: Channel,
    pub platform: Platform,
    pub os_version: &'a str,
    pub user_agent: Option<&'a str>,
    pub from_version: &'a str,
    pub manual: bool,
    pub remote_address: Option<IpAddr>,
    pub rollout: &'a RolloutConfig,
}

impl<'a> PolicyContext<'a> {
    pub fn new(
        request: &'a ClientRequest,
        channel: Channel,
        platform: Platform,
        rollout: &'a RolloutConfig,
    ) -> Self {
        Self {
            channel,
            platform,
            os_version: &request.os_version,
            user_agent: request.user_agent.as_deref(),
            from_version: &request.from_version,
            manual: request.manual,
            remote_address: request.remote_address,
            rollout,
        }
    }
}

/// What a matching rule decides
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Serve exactly this build
    Pin {
        build: Build,
        channel: Option<Channel>,
    },
    /// Serve no newer build than `version`
    Cap {
        version: String,
        channel: Option<Channel>,
    },
}

impl Decision {
    fn cap(version: &str) -> Self {
        Decision::Cap {
            version: version.to_string(),
            channel: None,
        }
    }

    /// A ceiling whose build data lives in a fixed channel, whatever channel
    /// the client follows
    fn cap_in(version: &str, channel: Channel) -> Self {
        Decision::Cap {
            version: version.to_string(),
            channel: Some(channel),
        }
    }

    /// Channel the target build is resolved in
    pub fn channel_or(&self, requested: Channel) -> Channel {
        match self {
            Decision::Pin { channel, .. } | Decision::Cap { channel, .. } => {
                channel.unwrap_or(requested)
            }
        }
    }
}

type Rule = fn(&PolicyContext<'_>) -> Option<Decision>;

const RULES: &[(&str, Rule)] = &[
    ("legacy_windows_pin", legacy_windows_pin),
    ("legacy_os_kernel", legacy_os_kernel),
    ("legacy_mac_user_agent", legacy_mac_user_agent),
    ("cross_major", cross_major),
    ("staged_rollout", staged_rollout),
];

/// Evaluate the rules in order and return the first decision
pub fn evaluate(ctx: &PolicyContext<'_>) -> Option<Decision> {
    RULES.iter().find_map(|(name, rule)| {
        let decision = rule(ctx)?;
        debug!(rule = name, ?decision, "Policy rule matched");
        Some(decision)
    })
}

struct DenyEntry {
    channel: Channel,
    platforms: &'static [Platform],
    versions: &'static [&'static str],
}

/// Builds whose in-place updater is broken
const DENYLIST: &[DenyEntry] = &[
    DenyEntry {
        channel: Channel::Release,
        platforms: &[Platform::Win32, Platform::Win64],
        versions: &["5.0.96", "5.0.96.1"],
    },
    DenyEntry {
        channel: Channel::Beta,
        platforms: &[Platform::Mac],
        versions: &["7.0.0-beta.12+95f5c2b9a"],
    },
];

/// `true` when the client must not be offered any update.
///
/// A client reporting a hand-patched updater is trusted and never denied.
pub fn is_denied(
    channel: Channel,
    platform: Platform,
    from_version: &str,
    updater_fixed: bool,
) -> bool {
    if updater_fixed {
        return false;
    }
    DENYLIST.iter().any(|entry| {
        entry.channel == channel
            && entry.platforms.contains(&platform)
            && entry
                .versions
                .iter()
                .any(|v| compare(v, from_version).is_eq())
    })
}

static OS_KERNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Darwin|Windows_NT) (\d+)\.(\d+)").expect("OS kernel pattern is valid")
});

/// Kernel name and major/minor version from the client's OS string,
/// e.g. `Darwin 15.6.0` or `Windows_NT 6.1.1.0 (x64)`
fn os_kernel(os_version: &str) -> Option<(&str, u32, u32)> {
    let caps = OS_KERNEL.captures(os_version)?;
    let name = caps.get(1)?.as_str();
    let major = caps.get(2)?.as_str().parse().ok()?;
    let minor = caps.get(3)?.as_str().parse().ok()?;
    Some((name, major, minor))
}

/// Windows XP and Vista stay on the last release that ran there
fn legacy_windows_pin(ctx: &PolicyContext<'_>) -> Option<Decision> {
    if !(ctx.os_version.starts_with("Windows_NT 5.")
        || ctx.os_version.starts_with("Windows_NT 6.0"))
    {
        return None;
    }
    let from_pre_5 = matches!(
        ctx.from_version.split_once('.'),
        Some(("1" | "2" | "3" | "4", _))
    );
    Some(Decision::Pin {
        build: Build {
            version: "5.0.77".to_string(),
            build_id: "20191031072159".to_string(),
            details_url: "https://www.zotero.org/support/5.0_changelog".to_string(),
            major: Some(from_pre_5),
        },
        channel: Some(Channel::Release),
    })
}

/// Last release supported on old kernels: macOS before 10.12 (Darwin 16)
/// and Windows 7 through 8.1 (NT 6.1-6.3)
fn legacy_os_kernel(ctx: &PolicyContext<'_>) -> Option<Decision> {
    let (name, major, minor) = os_kernel(ctx.os_version)?;
    match (ctx.platform.os_family(), name) {
        (OsFamily::Mac, "Darwin") if major < 16 => {
            Some(Decision::cap_in("6.0.37", Channel::Release))
        }
        (OsFamily::Win, "Windows_NT") if major == 6 && (1..=3).contains(&minor) => {
            Some(Decision::cap_in("7.0.15", Channel::Release))
        }
        _ => None,
    }
}

const LEGACY_MAC_USER_AGENTS: &[&str] = &["OS X 10.9;", "OS X 10.10;", "OS X 10.11;"];

/// Some clients misreport their OS version; their User-Agent still names the
/// macOS release
fn legacy_mac_user_agent(ctx: &PolicyContext<'_>) -> Option<Decision> {
    let user_agent = ctx.user_agent?;
    if ctx.platform != Platform::Mac {
        return None;
    }
    LEGACY_MAC_USER_AGENTS
        .iter()
        .any(|pattern| user_agent.contains(pattern))
        .then(|| Decision::cap_in("6.0.37", Channel::Release))
}

/// Updaters older than 4.0 cannot apply a jump straight to current releases
fn cross_major(ctx: &PolicyContext<'_>) -> Option<Decision> {
    if !compare(ctx.from_version, "4.0").is_lt() {
        return None;
    }
    let ceiling = match ctx.platform.os_family() {
        OsFamily::Mac => "4.0.29.15",
        OsFamily::Win => "4.0.29.17",
        OsFamily::Linux => "4.0.29.10",
    };
    Some(Decision::cap_in(ceiling, Channel::Release))
}

struct RolloutCeiling {
    channel: Channel,
    /// Release line of the clients held back
    from_line: (u64, u64),
    /// Only clients below this version are held back; the whole line when unset
    from_below: Option<&'static str>,
    ceiling: &'static str,
}

const ROLLOUT_CEILINGS: &[RolloutCeiling] = &[
    // Every 7.0 beta passes through beta 28 before moving on
    RolloutCeiling {
        channel: Channel::Beta,
        from_line: (7, 0),
        from_below: Some("7.0.0-beta.28+3a43a98f1"),
        ceiling: "7.0.0-beta.28+3a43a98f1",
    },
    // 7.0 goes to manual checks first
    RolloutCeiling {
        channel: Channel::Release,
        from_line: (6, 0),
        from_below: None,
        ceiling: "6.0.37",
    },
];

/// Automatic checks are held at a known-good release while a newer one rolls
/// out. Manual checks always see the newest release.
fn staged_rollout(ctx: &PolicyContext<'_>) -> Option<Decision> {
    if ctx.manual {
        return None;
    }
    let line = release_line(ctx.from_version)?;
    let rollout = ROLLOUT_CEILINGS.iter().find(|r| {
        r.channel == ctx.channel
            && r.from_line == line
            && r.from_below
                .is_none_or(|below| compare(ctx.from_version, below).is_lt())
    })?;

    if admitted_to_rollout(ctx.rollout, ctx.remote_address) {
        debug!(
            remote_address = ?ctx.remote_address,
            "Client admitted past rollout ceiling {}",
            rollout.ceiling
        );
        return None;
    }
    Some(Decision::cap(rollout.ceiling))
}

fn admitted_to_rollout(rollout: &RolloutConfig, remote_address: Option<IpAddr>) -> bool {
    let Some(addr) = remote_address else {
        return false;
    };
    rollout.allow_ips.contains(&addr) || rollout_bucket(addr) < rollout.percent
}

/// Stable bucket in `0..100` for a client address, so repeated checks from
/// one address get the same answer
pub fn rollout_bucket(addr: IpAddr) -> u8 {
    let digest = Sha256::digest(addr.to_string().as_bytes());
    (u16::from_be_bytes([digest[0], digest[1]]) % 100) as u8
}
