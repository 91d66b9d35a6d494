use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Result};
use rpmpy_core::{run_checked, BuildDescriptor, TEMPLATE_FILE_NAME};
use rpmpy_source::{ArtifactLocator, SourceEndpoints, SourceTransport};

use crate::binary::install_from_binary_package;
use crate::context::InstallerContext;
use crate::host::verify_system_status;
use crate::staging::{stage_headers, stage_libraries, stage_popt};
use crate::types::{BinaryInstall, InstallOptions, InstallState, Verification};

pub const DEVEL_MISSING_MESSAGE: &str = "\nInstall failed without rpm-devel package by below reason.\n\
Can you install the RPM package, and run this installer again?\n";

/// Drives one installation from host verification to the installed
/// binding, recording every state it passes through.
pub struct InstallOrchestrator<'a> {
    ctx: InstallerContext<'a>,
    locator: ArtifactLocator<'a>,
    options: InstallOptions,
    trace: Vec<InstallState>,
}

impl<'a> InstallOrchestrator<'a> {
    pub fn new(
        ctx: InstallerContext<'a>,
        transport: &'a dyn SourceTransport,
        options: InstallOptions,
    ) -> Self {
        let locator =
            ArtifactLocator::new(transport, ctx.logger).with_git_branch(options.git_branch.clone());
        Self {
            ctx,
            locator,
            options,
            trace: vec![InstallState::Start],
        }
    }

    pub fn with_endpoints(mut self, endpoints: SourceEndpoints) -> Self {
        self.locator = self.locator.with_endpoints(endpoints);
        self
    }

    pub fn trace(&self) -> &[InstallState] {
        &self.trace
    }

    pub fn state(&self) -> InstallState {
        self.trace.last().copied().unwrap_or(InstallState::Start)
    }

    /// Runs to a terminal state. Errors leave the trace ending in
    /// [`InstallState::Failed`].
    pub fn run(&mut self) -> Result<InstallState> {
        self.trace = vec![InstallState::Start];
        match self.drive() {
            Ok(state) => Ok(state),
            Err(err) => {
                self.advance(InstallState::Failed);
                Err(err)
            }
        }
    }

    fn advance(&mut self, state: InstallState) {
        self.ctx.logger.debug(format!("State: {state}"));
        self.trace.push(state);
    }

    fn drive(&mut self) -> Result<InstallState> {
        match verify_system_status(&self.ctx, self.options.allow_system_python)? {
            Verification::Skip => {
                self.advance(InstallState::Skipped);
                return Ok(InstallState::Skipped);
            }
            Verification::Proceed => self.advance(InstallState::SystemVerified),
        }

        if self.options.prefer_binary_package {
            if let BinaryInstall::Installed(dir) = install_from_binary_package(&self.ctx)? {
                self.ctx
                    .logger
                    .info(format!("Installed binding package into {}", dir.display()));
                self.advance(InstallState::InstalledFromBinaryPackage);
                return Ok(InstallState::InstalledFromBinaryPackage);
            }
            self.ctx
                .logger
                .info("No binding package available, building from source.");
        }

        let source = self
            .locator
            .acquire(&self.ctx.version, self.ctx.work_dir())?;
        let binding_dir = source.binding_dir();
        if !binding_dir.join(TEMPLATE_FILE_NAME).is_file() {
            self.ctx.logger.info(format!(
                "{TEMPLATE_FILE_NAME} not found in {}, installing the binding package instead.",
                binding_dir.display()
            ));
            return match install_from_binary_package(&self.ctx)? {
                BinaryInstall::Installed(_) => {
                    self.advance(InstallState::InstalledFromBinaryPackage);
                    Ok(InstallState::InstalledFromBinaryPackage)
                }
                BinaryInstall::NotFound => Err(anyhow!(
                    "No RPM Python binding package found for rpm {}.",
                    self.ctx.rpm.version()
                )),
            };
        }

        let devel_installed = self
            .ctx
            .package_manager
            .devel_package()
            .is_some_and(|name| self.ctx.is_installed(name));
        match self.build_from_source(&source.top_dir, &binding_dir, devel_installed) {
            Ok(state) => Ok(state),
            Err(err) if !devel_installed => Err(err.context(DEVEL_MISSING_MESSAGE)),
            Err(err) => Err(err),
        }
    }

    fn build_from_source(
        &mut self,
        top_dir: &Path,
        binding_dir: &Path,
        devel_installed: bool,
    ) -> Result<InstallState> {
        let mut descriptor = BuildDescriptor::new(&self.ctx.version, self.options.optimized);
        if !devel_installed {
            let lib_dir = self.ctx.package_manager.lib_dir(self.ctx.runner)?;
            stage_libraries(&self.ctx, top_dir, binding_dir, &lib_dir)?;
            stage_headers(top_dir)?;
            stage_popt(&self.ctx, top_dir, binding_dir, &lib_dir)?;
            descriptor
                .add_patches_without_pkg_config(&lib_dir, &self.ctx.package_manager.include_dir());
        }
        self.advance(InstallState::DependenciesStaged);

        descriptor.render(binding_dir, self.ctx.logger)?;
        self.advance(InstallState::DescriptorPatched);

        self.run_setup_py(binding_dir, "build")?;
        self.advance(InstallState::Built);

        self.run_setup_py(binding_dir, "install")?;
        self.advance(InstallState::Installed);
        Ok(InstallState::Installed)
    }

    fn run_setup_py(&self, binding_dir: &Path, step: &str) -> Result<()> {
        let verbosity = if self.options.verbose { "-v" } else { "-q" };
        let mut command = Command::new(self.ctx.python.path());
        command
            .arg("setup.py")
            .arg(verbosity)
            .arg(step)
            .current_dir(binding_dir);
        run_checked(
            self.ctx.runner,
            &mut command,
            &format!("failed to {step} the RPM Python binding"),
        )?;
        Ok(())
    }
}
