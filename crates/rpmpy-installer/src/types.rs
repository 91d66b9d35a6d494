use std::fmt;
use std::path::PathBuf;

/// Steps of one installation run, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Start,
    SystemVerified,
    DependenciesStaged,
    DescriptorPatched,
    Built,
    Installed,
    InstalledFromBinaryPackage,
    Skipped,
    Failed,
}

impl InstallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::SystemVerified => "system-verified",
            Self::DependenciesStaged => "dependencies-staged",
            Self::DescriptorPatched => "descriptor-patched",
            Self::Built => "built",
            Self::Installed => "installed",
            Self::InstalledFromBinaryPackage => "installed-from-binary-package",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Installed | Self::InstalledFromBinaryPackage | Self::Skipped | Self::Failed
        )
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Proceed,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryInstall {
    /// Binding copied into this site-packages directory.
    Installed(PathBuf),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub git_branch: Option<String>,
    pub optimized: bool,
    pub verbose: bool,
    pub allow_system_python: bool,
    pub prefer_binary_package: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            git_branch: None,
            optimized: true,
            verbose: false,
            allow_system_python: false,
            prefer_binary_package: false,
        }
    }
}
