use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const OS_RELEASE_FILE: &str = "/etc/os-release";
pub const REDHAT_RELEASE_FILE: &str = "/etc/redhat-release";
pub const DEBIAN_PACKAGE_TOOL: &str = "apt-get";

const FEDORA_IDS: &[&str] = &[
    "fedora",
    "centos",
    "rhel",
    "rocky",
    "almalinux",
    "ol",
    "amzn",
];
const DEBIAN_IDS: &[&str] = &["debian", "ubuntu", "linuxmint", "pop", "raspbian"];
const SUSE_IDS: &[&str] = &[
    "opensuse",
    "opensuse-leap",
    "opensuse-tumbleweed",
    "opensuse-microos",
    "sles",
    "sled",
    "sles_sap",
    "suse",
];

/// Distribution family, each implying one package-manager dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionFamily {
    Fedora,
    Debian,
    Suse,
}

impl DistributionFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fedora => "fedora",
            Self::Debian => "debian",
            Self::Suse => "suse",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        if FEDORA_IDS.contains(&id.as_str()) {
            return Some(Self::Fedora);
        }
        if DEBIAN_IDS.contains(&id.as_str()) {
            return Some(Self::Debian);
        }
        if SUSE_IDS.contains(&id.as_str()) || id.starts_with("opensuse-") {
            return Some(Self::Suse);
        }
        None
    }

    /// Family named by an `ID_LIKE` value such as `"rhel fedora"`.
    pub fn from_id_like(id_like: &str) -> Option<Self> {
        let tokens = id_like
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect::<Vec<_>>();
        let has = |token: &str| tokens.iter().any(|value| value == token);

        if has("fedora") {
            Some(Self::Fedora)
        } else if has("opensuse") || has("suse") {
            Some(Self::Suse)
        } else if has("debian") {
            Some(Self::Debian)
        } else {
            None
        }
    }
}

impl fmt::Display for DistributionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value items of an os-release file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    items: BTreeMap<String, String>,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let mut items = BTreeMap::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .or_else(|| {
                    value
                        .strip_prefix('\'')
                        .and_then(|inner| inner.strip_suffix('\''))
                })
                .unwrap_or(value);
            items.insert(key.trim().to_string(), value.to_string());
        }
        Self { items }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.get("ID")
    }

    pub fn id_like(&self) -> Option<&str> {
        self.get("ID_LIKE")
    }

    /// Exact `ID` match first, then an `ID_LIKE` family token.
    pub fn family(&self) -> Option<DistributionFamily> {
        self.id()
            .and_then(DistributionFamily::from_id)
            .or_else(|| self.id_like().and_then(DistributionFamily::from_id_like))
    }
}

/// Classifies the host from OS identification files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionProbe {
    os_release_file: PathBuf,
    redhat_release_file: PathBuf,
    debian_tool: String,
}

impl Default for DistributionProbe {
    fn default() -> Self {
        Self::new(OS_RELEASE_FILE, REDHAT_RELEASE_FILE)
    }
}

impl DistributionProbe {
    pub fn new(os_release_file: impl Into<PathBuf>, redhat_release_file: impl Into<PathBuf>) -> Self {
        Self {
            os_release_file: os_release_file.into(),
            redhat_release_file: redhat_release_file.into(),
            debian_tool: DEBIAN_PACKAGE_TOOL.to_string(),
        }
    }

    pub fn os_release(&self) -> Result<Option<OsRelease>> {
        match fs::read_to_string(&self.os_release_file) {
            Ok(content) => Ok(Some(OsRelease::parse(&content))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!(
                    "failed to read os-release file: {}",
                    self.os_release_file.display()
                )
            }),
        }
    }

    pub fn classify(&self) -> Result<DistributionFamily> {
        self.classify_with(|tool| which::which(tool).is_ok())
    }

    /// Precedence: exact `ID`, `ID_LIKE` token, legacy Red Hat marker file,
    /// Debian package tool on PATH, then Fedora as the default.
    pub fn classify_with<F>(&self, tool_on_path: F) -> Result<DistributionFamily>
    where
        F: FnOnce(&str) -> bool,
    {
        if let Some(family) = self.os_release()?.and_then(|release| release.family()) {
            return Ok(family);
        }
        if self.redhat_release_file.is_file() {
            return Ok(DistributionFamily::Fedora);
        }
        if tool_on_path(&self.debian_tool) {
            return Ok(DistributionFamily::Debian);
        }
        Ok(DistributionFamily::Fedora)
    }
}
