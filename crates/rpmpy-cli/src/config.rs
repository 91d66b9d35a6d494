use anyhow::{anyhow, Context, Result};
use rpmpy_core::Version;
use rpmpy_installer::InstallOptions;

pub const ENV_VERBOSE: &str = "RPM_PY_VERBOSE";
pub const ENV_VERSION: &str = "RPM_PY_VERSION";
pub const ENV_GIT_BRANCH: &str = "RPM_PY_GIT_BRANCH";
pub const ENV_OPTIMIZED: &str = "RPM_PY_OPTM";
pub const ENV_SYSTEM_PYTHON: &str = "RPM_PY_SYS";
pub const ENV_INSTALL_BINARY: &str = "RPM_PY_INSTALL_BIN";
pub const ENV_WORK_DIR_REMOVED: &str = "RPM_PY_WORK_DIR_REMOVED";
pub const ENV_RPM_BIN: &str = "RPM_PY_RPM_BIN";
pub const ENV_PYTHON: &str = "RPM_PY_PYTHON";
pub const ENV_ARCH: &str = "RPM_PY_ARCH";

const DEFAULT_RPM_COMMAND: &str = "rpm";
const DEFAULT_PYTHON_COMMAND: &str = "python3";

/// Settings of one run, read from `RPM_PY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub verbose: bool,
    /// Defaults to the version of the detected rpm when unset.
    pub version: Option<Version>,
    pub git_branch: Option<String>,
    pub optimized: bool,
    pub allow_system_python: bool,
    pub prefer_binary_package: bool,
    pub work_dir_removed: bool,
    pub rpm_command: String,
    pub python_command: String,
    pub arch: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            version: None,
            git_branch: None,
            optimized: true,
            allow_system_python: false,
            prefer_binary_package: false,
            work_dir_removed: true,
            rpm_command: DEFAULT_RPM_COMMAND.to_string(),
            python_command: DEFAULT_PYTHON_COMMAND.to_string(),
            arch: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let version = match non_empty(lookup(ENV_VERSION)) {
            Some(raw) => Some(
                Version::parse(&raw)
                    .with_context(|| format!("invalid {ENV_VERSION}: '{raw}'"))?,
            ),
            None => None,
        };

        Ok(Self {
            verbose: parse_bool(ENV_VERBOSE, lookup(ENV_VERBOSE), defaults.verbose)?,
            version,
            git_branch: non_empty(lookup(ENV_GIT_BRANCH)),
            optimized: parse_bool(ENV_OPTIMIZED, lookup(ENV_OPTIMIZED), defaults.optimized)?,
            allow_system_python: parse_bool(
                ENV_SYSTEM_PYTHON,
                lookup(ENV_SYSTEM_PYTHON),
                defaults.allow_system_python,
            )?,
            prefer_binary_package: parse_bool(
                ENV_INSTALL_BINARY,
                lookup(ENV_INSTALL_BINARY),
                defaults.prefer_binary_package,
            )?,
            work_dir_removed: parse_bool(
                ENV_WORK_DIR_REMOVED,
                lookup(ENV_WORK_DIR_REMOVED),
                defaults.work_dir_removed,
            )?,
            rpm_command: non_empty(lookup(ENV_RPM_BIN)).unwrap_or(defaults.rpm_command),
            python_command: non_empty(lookup(ENV_PYTHON)).unwrap_or(defaults.python_command),
            arch: non_empty(lookup(ENV_ARCH)),
        })
    }

    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            git_branch: self.git_branch.clone(),
            optimized: self.optimized,
            verbose: self.verbose,
            allow_system_python: self.allow_system_python,
            prefer_binary_package: self.prefer_binary_package,
        }
    }
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = non_empty(value) else {
        return Ok(default);
    };
    match value.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(anyhow!(
            "invalid {name}: '{other}' (expected 'true' or 'false')"
        )),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
