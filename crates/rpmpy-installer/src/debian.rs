use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rpmpy_core::{command_failure, run_checked, tool_command, CommandOutput, CommandRunner};

use crate::fs_utils::find_files;
use crate::package_manager::downloaded_file;
use crate::types::DownloadOutcome;

const NOT_FOUND_MESSAGES: &[&str] = &[
    "Unable to locate package",
    "Can't select candidate version",
    "has no installation candidate",
];

/// apt-get and dpkg. There is no rpm devel package here, so libraries are
/// always staged by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebianBackend {
    lib_search_root: PathBuf,
}

impl Default for DebianBackend {
    fn default() -> Self {
        Self::new("/usr/lib")
    }
}

impl DebianBackend {
    pub fn new(lib_search_root: impl Into<PathBuf>) -> Self {
        Self {
            lib_search_root: lib_search_root.into(),
        }
    }

    pub(crate) fn is_installed(&self, runner: &dyn CommandRunner, name: &str) -> bool {
        let mut command = tool_command("dpkg-query");
        command.arg("-W").arg("-f=${Status}").arg(name);
        runner
            .run(&mut command)
            .map(|output| output.success() && output.stdout.contains("install ok installed"))
            .unwrap_or(false)
    }

    pub(crate) fn download(
        &self,
        runner: &dyn CommandRunner,
        name: &str,
        dest_dir: &Path,
    ) -> Result<DownloadOutcome> {
        let mut command = tool_command("apt-get");
        command.arg("download").arg(name).current_dir(dest_dir);
        let output = runner.run(&mut command)?;
        if is_not_found(&output) {
            return Ok(DownloadOutcome::NotFound);
        }
        if !output.success() {
            return Err(command_failure(
                &format!("failed to download package {name}"),
                &command,
                &output,
            ));
        }
        let package_file = downloaded_file(dest_dir, &format!("{name}_*.deb"))?;
        Ok(DownloadOutcome::Downloaded(package_file))
    }

    pub(crate) fn extract(
        &self,
        runner: &dyn CommandRunner,
        package_file: &Path,
        dest_dir: &Path,
    ) -> Result<()> {
        let mut command = tool_command("dpkg-deb");
        command.arg("-x").arg(package_file).arg(dest_dir);
        run_checked(
            runner,
            &mut command,
            &format!("failed to extract {}", package_file.display()),
        )?;
        Ok(())
    }

    /// Multiarch directory such as `/usr/lib/x86_64-linux-gnu` holding
    /// `librpm.so*`, or the search root itself.
    pub(crate) fn lib_dir(&self) -> Result<PathBuf> {
        find_files(&self.lib_search_root, "librpm.so*", Some(2))?
            .into_iter()
            .next()
            .and_then(|file| file.parent().map(Path::to_path_buf))
            .ok_or_else(|| {
                anyhow!(
                    "librpm.so not found under {}",
                    self.lib_search_root.display()
                )
            })
    }
}

pub fn is_not_found(output: &CommandOutput) -> bool {
    let combined = output.combined();
    NOT_FOUND_MESSAGES
        .iter()
        .any(|message| combined.contains(message))
}
