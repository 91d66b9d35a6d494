use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use rpmpy_core::{run_checked, tool_command, CommandRunner, DistributionFamily, Logger, Version};

use crate::debian::DebianBackend;
use crate::fedora::FedoraBackend;
use crate::fs_utils::remove_file_if_exists;
use crate::rpm::Rpm;
use crate::suse::SuseBackend;
use crate::types::DownloadOutcome;

pub const DEFAULT_INCLUDE_DIR: &str = "/usr/include";

/// Package tooling of the host, one variant per distribution family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    Fedora(FedoraBackend),
    Debian(DebianBackend),
    Suse(SuseBackend),
}

impl PackageManager {
    pub fn detect(
        family: DistributionFamily,
        rpm: &Rpm,
        arch_override: Option<&str>,
        runner: &dyn CommandRunner,
    ) -> Result<Self> {
        Ok(match family {
            DistributionFamily::Fedora => {
                Self::Fedora(FedoraBackend::detect(runner, rpm, arch_override)?)
            }
            DistributionFamily::Debian => Self::Debian(DebianBackend::default()),
            DistributionFamily::Suse => Self::Suse(SuseBackend::new(rpm.path())),
        })
    }

    pub fn family(&self) -> DistributionFamily {
        match self {
            Self::Fedora(_) => DistributionFamily::Fedora,
            Self::Debian(_) => DistributionFamily::Debian,
            Self::Suse(_) => DistributionFamily::Suse,
        }
    }

    /// Name of the package command, e.g. `dnf`.
    pub fn package_tool(&self) -> &'static str {
        match self {
            Self::Fedora(backend) => backend.tool().as_str(),
            Self::Debian(_) => "apt-get",
            Self::Suse(_) => "zypper",
        }
    }

    /// Never fails: a failing query means "not installed".
    pub fn is_installed(&self, runner: &dyn CommandRunner, name: &str) -> bool {
        match self {
            Self::Fedora(backend) => backend.is_installed(runner, name),
            Self::Debian(backend) => backend.is_installed(runner, name),
            Self::Suse(backend) => backend.is_installed(runner, name),
        }
    }

    pub fn is_downloadable(&self, runner: &dyn CommandRunner) -> bool {
        match self {
            Self::Fedora(backend) => backend.is_downloadable(runner),
            Self::Debian(_) | Self::Suse(_) => true,
        }
    }

    /// Fetches a package file into `dest_dir` without installing it.
    pub fn download(
        &self,
        runner: &dyn CommandRunner,
        name: &str,
        dest_dir: &Path,
    ) -> Result<DownloadOutcome> {
        match self {
            Self::Fedora(backend) => backend.download(runner, name, dest_dir),
            Self::Debian(backend) => backend.download(runner, name, dest_dir),
            Self::Suse(backend) => backend.download(runner, name, dest_dir),
        }
    }

    /// Unpacks the payload of a downloaded package file into `dest_dir`.
    pub fn extract(
        &self,
        runner: &dyn CommandRunner,
        package_file: &Path,
        dest_dir: &Path,
    ) -> Result<()> {
        match self {
            Self::Fedora(_) | Self::Suse(_) => extract_rpm_payload(runner, package_file, dest_dir),
            Self::Debian(backend) => backend.extract(runner, package_file, dest_dir),
        }
    }

    pub fn download_and_extract(
        &self,
        runner: &dyn CommandRunner,
        logger: &Logger,
        name: &str,
        dest_dir: &Path,
    ) -> Result<DownloadOutcome> {
        let outcome = self.download(runner, name, dest_dir)?;
        match &outcome {
            DownloadOutcome::Downloaded(package_file) => {
                logger.debug(format!("Downloaded {}", package_file.display()));
                self.extract(runner, package_file, dest_dir)?;
            }
            DownloadOutcome::NotFound => {
                logger.debug(format!("Package {name} not found by {}", self.package_tool()));
            }
        }
        Ok(outcome)
    }

    /// Directory holding `librpm.so*`.
    pub fn lib_dir(&self, runner: &dyn CommandRunner) -> Result<PathBuf> {
        match self {
            Self::Fedora(backend) => {
                lib_dir_from_manifest(runner, backend.rpm_path(), self.runtime_package())
            }
            Self::Suse(backend) => {
                lib_dir_from_manifest(runner, backend.rpm_path(), self.runtime_package())
            }
            Self::Debian(backend) => backend.lib_dir(),
        }
    }

    pub fn include_dir(&self) -> PathBuf {
        PathBuf::from(DEFAULT_INCLUDE_DIR)
    }

    /// Package providing the rpm shared libraries.
    pub fn runtime_package(&self) -> &'static str {
        match self {
            Self::Fedora(_) => "rpm-libs",
            Self::Debian(_) | Self::Suse(_) => "rpm",
        }
    }

    pub fn devel_package(&self) -> Option<&'static str> {
        match self {
            Self::Fedora(_) | Self::Suse(_) => Some("rpm-devel"),
            Self::Debian(_) => None,
        }
    }

    /// Whether `librpmbuild`/`librpmsign` ship in a separate package for
    /// this rpm version.
    pub fn has_build_libs_split(&self, rpm_version: &Version) -> bool {
        matches!(self, Self::Fedora(_)) && rpm_version.at_least(&[4, 9, 0])
    }

    pub fn build_libs_package(&self) -> Option<&'static str> {
        match self {
            Self::Fedora(_) => Some("rpm-build-libs"),
            Self::Debian(_) | Self::Suse(_) => None,
        }
    }

    pub fn sign_libs_package(&self) -> Option<&'static str> {
        match self {
            Self::Fedora(_) => Some("rpm-sign-libs"),
            Self::Debian(_) | Self::Suse(_) => None,
        }
    }

    /// `(runtime, devel)` package names of popt.
    pub fn popt_packages(&self) -> (&'static str, &'static str) {
        match self {
            Self::Fedora(_) | Self::Suse(_) => ("popt", "popt-devel"),
            Self::Debian(_) => ("libpopt0", "libpopt-dev"),
        }
    }

    /// Prebuilt binding packages to try, most likely first.
    pub fn binding_package_names(
        &self,
        rpm_version: &Version,
        python_major: u64,
    ) -> Vec<&'static str> {
        if matches!(self, Self::Debian(_)) {
            return Vec::new();
        }
        if python_major >= 3 {
            if rpm_version.at_least(&[4, 14, 0]) {
                vec!["python3-rpm"]
            } else if rpm_version.at_least(&[4, 13, 0]) {
                vec!["python3-rpm", "rpm-python3"]
            } else if rpm_version.at_least(&[4, 11, 1]) {
                vec!["rpm-python3"]
            } else {
                Vec::new()
            }
        } else if rpm_version.at_least(&[4, 14, 0]) {
            vec!["python2-rpm"]
        } else if rpm_version.at_least(&[4, 13, 0]) {
            vec!["python2-rpm", "rpm-python"]
        } else {
            vec!["rpm-python"]
        }
    }
}

/// `rpm --query NAME --quiet`, any failure meaning "not installed".
pub(crate) fn rpm_query_installed(runner: &dyn CommandRunner, rpm_path: &Path, name: &str) -> bool {
    let mut command = tool_command(rpm_path);
    command.arg("--query").arg(name).arg("--quiet");
    runner
        .run(&mut command)
        .map(|output| output.success())
        .unwrap_or(false)
}

pub(crate) fn require_programs(runner: &dyn CommandRunner, programs: &[&str]) -> Result<()> {
    for program in programs {
        if !runner.has_program(program) {
            return Err(anyhow!("{program} command not found. Install {program}."));
        }
    }
    Ok(())
}

/// Unpacks an rpm inside `dest_dir` in two checked steps: `rpm2cpio` into
/// a payload file next to the package, then `cpio -idm` from it.
pub(crate) fn extract_rpm_payload(
    runner: &dyn CommandRunner,
    package_file: &Path,
    dest_dir: &Path,
) -> Result<()> {
    require_programs(runner, &["rpm2cpio", "cpio"])?;
    let mut payload_name = package_file
        .file_name()
        .ok_or_else(|| anyhow!("invalid package path {}", package_file.display()))?
        .to_os_string();
    payload_name.push(".cpio");
    let payload = dest_dir.join(payload_name);

    let mut convert = Command::new("sh");
    convert
        .arg("-c")
        .arg("rpm2cpio \"$1\" > \"$2\"")
        .arg("sh")
        .arg(package_file)
        .arg(&payload)
        .current_dir(dest_dir);
    run_checked(
        runner,
        &mut convert,
        &format!("failed to convert {} to cpio", package_file.display()),
    )?;
    let payload_size = fs::metadata(&payload).map(|meta| meta.len()).unwrap_or(0);
    if payload_size == 0 {
        remove_file_if_exists(&payload)?;
        return Err(anyhow!(
            "rpm2cpio produced no payload for {}",
            package_file.display()
        ));
    }

    let mut unpack = Command::new("sh");
    unpack
        .arg("-c")
        .arg("cpio -idm < \"$1\"")
        .arg("sh")
        .arg(&payload)
        .current_dir(dest_dir);
    let unpacked = run_checked(
        runner,
        &mut unpack,
        &format!("failed to extract {}", package_file.display()),
    );
    remove_file_if_exists(&payload)?;
    unpacked?;
    Ok(())
}

fn lib_dir_from_manifest(runner: &dyn CommandRunner, rpm_path: &Path, package: &str) -> Result<PathBuf> {
    let mut command = tool_command(rpm_path);
    command.arg("-ql").arg(package);
    let output = run_checked(
        runner,
        &mut command,
        &format!("failed to list files of package {package}"),
    )?;
    output
        .stdout
        .lines()
        .find(|line| line.contains("librpm.so"))
        .and_then(|line| Path::new(line.trim()).parent())
        .map(Path::to_path_buf)
        .with_context(|| format!("librpm.so not found in files of package {package}"))
}

/// Package file in `dest_dir` matching `pattern`; the last one by path
/// when several match.
pub(crate) fn downloaded_file(dest_dir: &Path, pattern: &str) -> Result<PathBuf> {
    crate::fs_utils::find_files(dest_dir, pattern, Some(1))?
        .pop()
        .ok_or_else(|| {
            anyhow!(
                "downloaded package file {pattern} not found in {}",
                dest_dir.display()
            )
        })
}
