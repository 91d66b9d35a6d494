use std::path::{Path, PathBuf};

use rpmpy_core::{CommandRunner, Logger, Version};

use crate::package_manager::PackageManager;
use crate::python::Python;
use crate::rpm::Rpm;

/// Everything one installation run works with. Owned by a single
/// orchestrator.
pub struct InstallerContext<'a> {
    pub version: Version,
    pub rpm: &'a Rpm,
    pub python: &'a Python,
    pub package_manager: &'a PackageManager,
    pub runner: &'a dyn CommandRunner,
    pub logger: &'a Logger,
    pub work_dir: PathBuf,
}

impl InstallerContext<'_> {
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn is_installed(&self, name: &str) -> bool {
        let installed = self.package_manager.is_installed(self.runner, name);
        self.logger
            .debug(format!("Package {name} installed: {installed}"));
        installed
    }

    pub fn is_downloadable(&self) -> bool {
        self.package_manager.is_downloadable(self.runner)
    }
}
