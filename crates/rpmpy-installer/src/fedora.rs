use std::path::{Path, PathBuf};

use anyhow::Result;
use rpmpy_core::{command_failure, tool_command, CommandOutput, CommandRunner};

use crate::package_manager::{downloaded_file, rpm_query_installed};
use crate::rpm::Rpm;
use crate::types::DownloadOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FedoraTool {
    Dnf,
    Yum,
}

impl FedoraTool {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dnf => "dnf",
            Self::Yum => "yum",
        }
    }

    /// Package that provides the download subcommand of this tool.
    pub fn download_plugin(self) -> &'static str {
        match self {
            Self::Dnf => "dnf-plugins-core",
            Self::Yum => "yum-utils",
        }
    }
}

/// dnf or yum, with the architecture forced on every download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FedoraBackend {
    rpm_path: PathBuf,
    tool: FedoraTool,
    arch: String,
}

impl FedoraBackend {
    pub fn new(rpm_path: impl Into<PathBuf>, tool: FedoraTool, arch: impl Into<String>) -> Self {
        Self {
            rpm_path: rpm_path.into(),
            tool,
            arch: arch.into(),
        }
    }

    /// dnf when available, yum otherwise.
    pub fn detect(runner: &dyn CommandRunner, rpm: &Rpm, arch_override: Option<&str>) -> Result<Self> {
        let tool = if runner.has_program("dnf") {
            FedoraTool::Dnf
        } else {
            FedoraTool::Yum
        };
        let arch = match arch_override {
            Some(arch) => arch.to_string(),
            None => rpm.query_arch(runner)?,
        };
        Ok(Self::new(rpm.path(), tool, arch))
    }

    pub fn rpm_path(&self) -> &Path {
        &self.rpm_path
    }

    pub fn tool(&self) -> FedoraTool {
        self.tool
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub(crate) fn is_installed(&self, runner: &dyn CommandRunner, name: &str) -> bool {
        rpm_query_installed(runner, &self.rpm_path, name)
    }

    pub(crate) fn is_downloadable(&self, runner: &dyn CommandRunner) -> bool {
        self.is_installed(runner, self.tool.download_plugin())
    }

    pub(crate) fn download(
        &self,
        runner: &dyn CommandRunner,
        name: &str,
        dest_dir: &Path,
    ) -> Result<DownloadOutcome> {
        let target = format!("{name}.{}", self.arch);
        let mut command = match self.tool {
            FedoraTool::Dnf => {
                let mut command = tool_command("dnf");
                command.arg("download").arg(&target);
                command
            }
            FedoraTool::Yum => {
                let mut command = tool_command("yumdownloader");
                command.arg(&target);
                command
            }
        };
        command.current_dir(dest_dir);

        let output = runner.run(&mut command)?;
        if self.is_not_found(name, &output) {
            return Ok(DownloadOutcome::NotFound);
        }
        if !output.success() {
            return Err(command_failure(
                &format!("failed to download package {target}"),
                &command,
                &output,
            ));
        }
        let package_file = downloaded_file(dest_dir, &format!("{name}-[0-9]*.{}.rpm", self.arch))?;
        Ok(DownloadOutcome::Downloaded(package_file))
    }

    pub fn is_not_found(&self, name: &str, output: &CommandOutput) -> bool {
        let combined = output.combined().to_ascii_lowercase();
        let missing_package = format!("no package {name}.{} available", self.arch).to_ascii_lowercase();
        combined.contains(&missing_package) || combined.contains("no match for argument")
    }
}
