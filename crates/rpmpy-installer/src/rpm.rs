use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rpmpy_core::{run_checked, tool_command, CommandRunner, Version};

const SYSTEM_RPM_PATHS: &[&str] = &["/usr/bin/rpm", "/bin/rpm"];

/// The rpm command the binding is built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rpm {
    path: PathBuf,
    version: Version,
}

impl Rpm {
    pub fn new(path: impl Into<PathBuf>, version: Version) -> Self {
        Self {
            path: path.into(),
            version,
        }
    }

    /// Reads the version from `rpm --version` ("RPM version 4.14.2").
    pub fn probe(runner: &dyn CommandRunner, path: &Path) -> Result<Self> {
        let mut command = tool_command(path);
        command.arg("--version");
        let output = run_checked(runner, &mut command, "failed to query rpm version")?;
        let raw = output
            .stdout
            .split_whitespace()
            .nth(2)
            .ok_or_else(|| anyhow!("unexpected rpm --version output: '{}'", output.stdout.trim()))?;
        Ok(Self::new(path, Version::parse(raw)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The distribution's own rpm, as opposed to one built into a prefix.
    pub fn is_system(&self) -> bool {
        let path = self.path.to_string_lossy();
        SYSTEM_RPM_PATHS
            .iter()
            .any(|system_path| path.starts_with(system_path))
    }

    /// User-space architecture as rpm sees it; can differ from `uname -m`.
    pub fn query_arch(&self, runner: &dyn CommandRunner) -> Result<String> {
        let mut command = tool_command(&self.path);
        command.arg("--eval").arg("%{_arch}");
        let output = run_checked(runner, &mut command, "failed to query rpm architecture")?;
        let arch = output.stdout.trim();
        if arch.is_empty() || arch.contains('%') {
            return Err(anyhow!("rpm returned no architecture: '{arch}'"));
        }
        Ok(arch.to_string())
    }
}
