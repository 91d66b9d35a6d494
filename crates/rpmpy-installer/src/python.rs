use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use rpmpy_core::{run_checked, CommandRunner, Logger, VersionInfo};
use serde::Deserialize;

const SYSTEM_PYTHON_PREFIX: &str = "/usr/bin/python";
const BINDING_DISTRIBUTIONS: &[&str] = &["rpm", "rpm-python"];

const PROBE_SCRIPT: &str = "\
import sys
try:
    from sysconfig import get_path
    lib = get_path('purelib')
except ImportError:
    from distutils.sysconfig import get_python_lib
    lib = get_python_lib()
print('%d.%d.%d' % tuple(sys.version_info[:3]))
print(lib)
";

#[derive(Debug, Deserialize)]
struct PipPackage {
    name: String,
    #[serde(default)]
    version: String,
}

/// Target Python interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Python {
    path: PathBuf,
    version: VersionInfo,
    site_packages: PathBuf,
}

impl Python {
    pub fn new(path: impl Into<PathBuf>, version: VersionInfo, site_packages: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version,
            site_packages: site_packages.into(),
        }
    }

    /// Asks the interpreter for its version and site-packages directory.
    pub fn probe(runner: &dyn CommandRunner, path: &Path) -> Result<Self> {
        let mut command = Command::new(path);
        command.arg("-c").arg(PROBE_SCRIPT);
        let output = run_checked(runner, &mut command, "failed to inspect Python interpreter")?;
        let mut lines = output.stdout.lines().map(str::trim);
        let version = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| anyhow!("Python interpreter {} printed no version", path.display()))?;
        let site_packages = lines.next().filter(|line| !line.is_empty()).ok_or_else(|| {
            anyhow!(
                "Python interpreter {} printed no site-packages directory",
                path.display()
            )
        })?;
        Ok(Self::new(path, VersionInfo::parse(version), site_packages))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn major(&self) -> u64 {
        self.version.number(0).unwrap_or(0)
    }

    /// `X.Y`, as used in `pythonX.Y` directory names.
    pub fn short_version(&self) -> String {
        format!(
            "{}.{}",
            self.major(),
            self.version.number(1).unwrap_or(0)
        )
    }

    pub fn site_packages(&self) -> &Path {
        &self.site_packages
    }

    /// Where the binding module lives once installed.
    pub fn binding_dir(&self) -> PathBuf {
        self.site_packages.join("rpm")
    }

    pub fn is_system(&self) -> bool {
        self.path.to_string_lossy().starts_with(SYSTEM_PYTHON_PREFIX)
    }

    /// pip listing first; the module directory when pip is unavailable or
    /// does not know the binding.
    pub fn is_binding_installed(&self, runner: &dyn CommandRunner, logger: &Logger) -> bool {
        match self.is_binding_installed_on_pip(runner, logger) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => logger.debug(format!("pip check failed: {err:#}")),
        }
        self.binding_dir().join("__init__.py").is_file()
    }

    pub fn is_binding_installed_on_pip(
        &self,
        runner: &dyn CommandRunner,
        logger: &Logger,
    ) -> Result<bool> {
        let mut command = self.pip_command();
        command.arg("--version");
        let output = run_checked(runner, &mut command, "failed to query pip version")?;
        let pip_version = output
            .stdout
            .split_whitespace()
            .nth(1)
            .map(VersionInfo::parse)
            .ok_or_else(|| anyhow!("unexpected pip --version output: '{}'", output.stdout.trim()))?;
        logger.debug(format!("Pip version: {pip_version}"));

        // --format appeared in pip 9.
        if pip_version.at_least(&[9]) {
            let mut command = self.pip_command();
            command.arg("list").arg("--format").arg("json");
            let output = run_checked(runner, &mut command, "failed to list pip packages")?;
            let packages: Vec<PipPackage> = serde_json::from_str(output.stdout.trim())
                .context("failed to parse pip list JSON output")?;
            for package in packages {
                if BINDING_DISTRIBUTIONS.contains(&package.name.as_str()) {
                    logger.debug(format!(
                        "Package installed: {}, {}",
                        package.name, package.version
                    ));
                    return Ok(true);
                }
            }
            Ok(false)
        } else {
            let mut command = self.pip_command();
            command.arg("list");
            let output = run_checked(runner, &mut command, "failed to list pip packages")?;
            let pattern = Regex::new(r"^rpm(-python)? ").context("invalid pip list pattern")?;
            Ok(output.stdout.lines().any(|line| pattern.is_match(line)))
        }
    }

    /// `python -m pip` where pip ships with the interpreter (2.7.9+, 3.4+),
    /// a bare `pip` otherwise.
    fn pip_command(&self) -> Command {
        let bundles_pip = (self.version.at_least(&[2, 7, 9]) && self.major() == 2)
            || self.version.at_least(&[3, 4]);
        if bundles_pip {
            let mut command = Command::new(&self.path);
            command.arg("-m").arg("pip");
            command
        } else {
            Command::new("pip")
        }
    }
}
