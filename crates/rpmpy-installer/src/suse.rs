use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rpmpy_core::{command_failure, tool_command, CommandOutput, CommandRunner, VersionInfo};

use crate::fs_utils::find_files;
use crate::package_manager::rpm_query_installed;
use crate::types::DownloadOutcome;

/// zypper exit code for "capability not found".
pub const ZYPPER_EXIT_INF_CAP_NOT_FOUND: i32 = 104;

const PKG_CACHE_DIR_NAME: &str = ".zypper-pkg-cache";

/// zypper has no plain download; packages are fetched with a forced
/// download-only install into a private cache and the newest file is taken
/// from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuseBackend {
    rpm_path: PathBuf,
}

/// Parsed `name-version-release.arch.rpm` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmFileName {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl RpmFileName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".rpm")?;
        let (nvr, arch) = stem.rsplit_once('.')?;
        let (name_version, release) = nvr.rsplit_once('-')?;
        let (name, version) = name_version.rsplit_once('-')?;
        if name.is_empty() || version.is_empty() || release.is_empty() || arch.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
        })
    }

    pub fn sort_key(&self) -> (VersionInfo, VersionInfo) {
        (
            VersionInfo::parse(&self.version),
            VersionInfo::parse(&self.release),
        )
    }
}

impl SuseBackend {
    pub fn new(rpm_path: impl Into<PathBuf>) -> Self {
        Self {
            rpm_path: rpm_path.into(),
        }
    }

    pub fn rpm_path(&self) -> &Path {
        &self.rpm_path
    }

    pub(crate) fn is_installed(&self, runner: &dyn CommandRunner, name: &str) -> bool {
        rpm_query_installed(runner, &self.rpm_path, name)
    }

    pub(crate) fn download(
        &self,
        runner: &dyn CommandRunner,
        name: &str,
        dest_dir: &Path,
    ) -> Result<DownloadOutcome> {
        let cache_dir = dest_dir.join(PKG_CACHE_DIR_NAME);
        let mut command = tool_command("zypper");
        command
            .arg("--non-interactive")
            .arg("--pkg-cache-dir")
            .arg(&cache_dir)
            .arg("-v")
            .arg("install")
            .arg("-f")
            .arg("--download-only")
            .arg(name)
            .current_dir(dest_dir);

        let output = runner.run(&mut command)?;
        if is_not_found(name, &output) {
            return Ok(DownloadOutcome::NotFound);
        }
        if !output.success() {
            return Err(command_failure(
                &format!("failed to download package {name}"),
                &command,
                &output,
            ));
        }

        let newest = newest_package_file(&cache_dir, name)?.ok_or_else(|| {
            anyhow!(
                "Could not find downloaded package {name} in {}",
                cache_dir.display()
            )
        })?;
        let file_name = newest
            .file_name()
            .ok_or_else(|| anyhow!("invalid package path {}", newest.display()))?;
        let destination = dest_dir.join(file_name);
        fs::rename(&newest, &destination).with_context(|| {
            format!(
                "failed to move {} to {}",
                newest.display(),
                destination.display()
            )
        })?;
        Ok(DownloadOutcome::Downloaded(destination))
    }
}

pub fn is_not_found(name: &str, output: &CommandOutput) -> bool {
    output.code == Some(ZYPPER_EXIT_INF_CAP_NOT_FOUND)
        || output
            .combined()
            .contains(&format!("Package '{name}' not found"))
}

/// Newest `name-*.rpm` under `cache_dir` by version, then release.
pub fn newest_package_file(cache_dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    for path in find_files(cache_dir, &format!("{name}-*.rpm"), None)? {
        let Some(parsed) = path
            .file_name()
            .and_then(|file_name| file_name.to_str())
            .and_then(RpmFileName::parse)
        else {
            continue;
        };
        if parsed.name == name {
            candidates.push((parsed.sort_key(), path));
        }
    }
    Ok(candidates
        .into_iter()
        .max_by(|left, right| left.0.cmp(&right.0))
        .map(|(_, path)| path))
}
