use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rpmpy_core::{CommandRunner, DistributionFamily, DistributionProbe, Logger, SystemRunner, Version};
use rpmpy_installer::{
    DirGuard, InstallOrchestrator, InstallState, InstallerContext, PackageManager, Python, Rpm,
};
use rpmpy_source::{ArtifactLocator, NetworkTransport, SourceTransport, GIT_REPOSITORY};
use tempfile::TempDir;

use crate::config::Config;
use crate::render::{download_progress_hook, outcome_message};

const WORK_DIR_SUFFIX: &str = "-rpm-py-installer";
pub const POST_INSTALL_FAILURE: &str =
    "RPM Python binding module failed to install with unknown reason.";

/// What gets installed, where, and with which tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub family: DistributionFamily,
    pub rpm: Rpm,
    pub python: Python,
    pub package_manager: PackageManager,
    pub version: Version,
}

impl Host {
    pub fn probe(
        config: &Config,
        probe: &DistributionProbe,
        runner: &dyn CommandRunner,
        logger: &Logger,
    ) -> Result<Self> {
        let family = probe.classify_with(|tool| runner.has_program(tool))?;
        logger.debug(format!("Distribution family: {}", family.as_str()));

        let rpm = Rpm::probe(runner, &resolve_command(&config.rpm_command)?)?;
        logger.debug(format!(
            "rpm: {} version {}",
            rpm.path().display(),
            rpm.version()
        ));
        let python = Python::probe(runner, &resolve_command(&config.python_command)?)?;
        logger.debug(format!(
            "Python: {} version {}",
            python.path().display(),
            python.short_version()
        ));

        let package_manager =
            PackageManager::detect(family, &rpm, config.arch.as_deref(), runner)?;
        let version = config
            .version
            .clone()
            .unwrap_or_else(|| rpm.version().clone());
        Ok(Self {
            family,
            rpm,
            python,
            package_manager,
            version,
        })
    }
}

/// Bare names are looked up on PATH; anything containing a slash is used
/// as a path.
pub fn resolve_command(command: &str) -> Result<PathBuf> {
    if command.contains('/') {
        let path = PathBuf::from(command);
        if path.is_file() {
            return Ok(path);
        }
        return Err(anyhow!("{command} not found."));
    }
    which::which(command).map_err(|_| anyhow!("{command} command not found. Install {command}."))
}

pub struct Application {
    config: Config,
    logger: Logger,
    probe: DistributionProbe,
}

impl Application {
    pub fn new(config: Config, logger: Logger) -> Self {
        Self {
            config,
            logger,
            probe: DistributionProbe::default(),
        }
    }

    pub fn run(&self) -> Result<InstallState> {
        let runner = SystemRunner::new(self.logger.clone());
        let host = Host::probe(&self.config, &self.probe, &runner, &self.logger)?;
        let mut transport = NetworkTransport::new(&runner)?;
        if let Some(hook) = download_progress_hook(self.logger.style()) {
            transport = transport.with_progress(hook);
        }
        self.install(&host, &runner, &transport)
    }

    /// Runs one installation inside a fresh working directory, then checks
    /// that the binding is really importable from the target Python.
    pub fn install(
        &self,
        host: &Host,
        runner: &dyn CommandRunner,
        transport: &dyn SourceTransport,
    ) -> Result<InstallState> {
        self.logger.info(format!(
            "Installing RPM Python binding {} for {} (rpm {})",
            host.version,
            host.python.path().display(),
            host.rpm.version()
        ));

        let work_dir = tempfile::Builder::new()
            .suffix(WORK_DIR_SUFFIX)
            .tempdir()
            .context("failed to create working directory")?;
        self.logger
            .debug(format!("Working directory: {}", work_dir.path().display()));

        let result = self.run_in_work_dir(work_dir, |path| {
            let ctx = InstallerContext {
                version: host.version.clone(),
                rpm: &host.rpm,
                python: &host.python,
                package_manager: &host.package_manager,
                runner,
                logger: &self.logger,
                work_dir: path.to_path_buf(),
            };
            let mut orchestrator =
                InstallOrchestrator::new(ctx, transport, self.config.install_options());
            orchestrator.run()
        });

        let state = result?;
        if matches!(
            state,
            InstallState::Installed | InstallState::InstalledFromBinaryPackage
        ) && !host.python.is_binding_installed(runner, &self.logger)
        {
            return Err(anyhow!(POST_INSTALL_FAILURE));
        }
        self.logger.info(outcome_message(state));
        Ok(state)
    }

    /// Runs `body` with the process inside `work_dir`. The directory is
    /// removed or kept afterwards whatever the outcome, including a failure
    /// to enter it.
    pub(crate) fn run_in_work_dir<F>(&self, work_dir: TempDir, body: F) -> Result<InstallState>
    where
        F: FnOnce(&Path) -> Result<InstallState>,
    {
        let result = DirGuard::enter(work_dir.path()).and_then(|_guard| body(work_dir.path()));
        self.finish_work_dir(work_dir);
        result
    }

    fn finish_work_dir(&self, work_dir: TempDir) {
        if self.config.work_dir_removed {
            let path = work_dir.path().to_path_buf();
            match work_dir.close() {
                Ok(()) => self
                    .logger
                    .debug(format!("Removed working directory {}", path.display())),
                Err(err) => self.logger.warn(format!(
                    "Failed to remove working directory {}: {err}",
                    path.display()
                )),
            }
        } else {
            let path = work_dir.keep();
            self.logger
                .info(format!("Working directory kept: {}", path.display()));
        }
    }

    pub fn doctor(&self) -> Result<Vec<String>> {
        let runner = SystemRunner::new(self.logger.clone());
        let host = Host::probe(&self.config, &self.probe, &runner, &self.logger)?;
        let transport = NetworkTransport::new(&runner)?;
        Ok(doctor_lines(&host, &runner, &transport, &self.logger))
    }
}

/// Read-only report of the detected host and where sources would come from.
pub fn doctor_lines(
    host: &Host,
    runner: &dyn CommandRunner,
    transport: &dyn SourceTransport,
    logger: &Logger,
) -> Vec<String> {
    let lib_dir = match host.package_manager.lib_dir(runner) {
        Ok(dir) => dir.display().to_string(),
        Err(err) => format!("unknown ({err})"),
    };
    let system_label = |is_system: bool| if is_system { "system" } else { "custom" };

    let mut lines = vec![
        format!("distribution: {}", host.family.as_str()),
        format!("package tool: {}", host.package_manager.package_tool()),
        format!(
            "rpm: {} {} ({})",
            host.rpm.path().display(),
            host.rpm.version(),
            system_label(host.rpm.is_system())
        ),
        format!("rpm lib dir: {lib_dir}"),
        format!(
            "include dir: {}",
            host.package_manager.include_dir().display()
        ),
        format!(
            "python: {} {} ({})",
            host.python.path().display(),
            host.python.short_version(),
            system_label(host.python.is_system())
        ),
        format!("site-packages: {}", host.python.site_packages().display()),
        format!("binding version: {}", host.version),
        "archive candidates:".to_string(),
    ];
    let locator = ArtifactLocator::new(transport, logger);
    for candidate in locator.candidates(&host.version) {
        lines.push(format!("- {} {}", candidate.site, candidate.url));
    }
    lines.push(format!("git fallback: {GIT_REPOSITORY}"));
    lines
}
