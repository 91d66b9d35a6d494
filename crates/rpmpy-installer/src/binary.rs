use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::context::InstallerContext;
use crate::fs_utils::{copy_dir_recursive, glob_dirs};
use crate::types::{BinaryInstall, DownloadOutcome};

const BINARY_PACKAGE_DIR_NAME: &str = "binary-package";

/// Installs the binding from the distribution's prebuilt package by
/// copying its `site-packages/rpm` directory into the target Python.
pub fn install_from_binary_package(ctx: &InstallerContext<'_>) -> Result<BinaryInstall> {
    let names = ctx
        .package_manager
        .binding_package_names(ctx.rpm.version(), ctx.python.major());
    if names.is_empty() {
        ctx.logger.debug(format!(
            "No binding package known for rpm {} and Python {}",
            ctx.rpm.version(),
            ctx.python.short_version()
        ));
        return Ok(BinaryInstall::NotFound);
    }

    let extract_dir = ctx.work_dir().join(BINARY_PACKAGE_DIR_NAME);
    fs::create_dir_all(&extract_dir)
        .with_context(|| format!("failed to create {}", extract_dir.display()))?;

    for name in names {
        match ctx
            .package_manager
            .download_and_extract(ctx.runner, ctx.logger, name, &extract_dir)?
        {
            DownloadOutcome::NotFound => {
                ctx.logger
                    .info(format!("Binding package {name} not found."));
            }
            DownloadOutcome::Downloaded(_) => {
                let source = find_binding_dir(&extract_dir, &ctx.python.short_version())?;
                let destination = ctx.python.binding_dir();
                if destination.is_dir() {
                    ctx.logger.debug(format!(
                        "Remove existed rpm directory {}",
                        destination.display()
                    ));
                    fs::remove_dir_all(&destination)
                        .with_context(|| format!("failed to remove {}", destination.display()))?;
                }
                ctx.logger.debug(format!(
                    "Copy directory from '{}' to '{}'",
                    source.display(),
                    destination.display()
                ));
                copy_dir_recursive(&source, &destination)?;
                return Ok(BinaryInstall::Installed(destination));
            }
        }
    }
    Ok(BinaryInstall::NotFound)
}

/// `usr/*/*/site-packages/rpm` in an extracted package, preferring the
/// directory of the given `pythonX.Y`.
pub fn find_binding_dir(extract_dir: &Path, python_short_version: &str) -> Result<PathBuf> {
    let candidates = glob_dirs(extract_dir, "usr/*/*/site-packages/rpm")?;
    let marker = format!("python{python_short_version}");
    candidates
        .iter()
        .find(|dir| {
            dir.components()
                .any(|component| component.as_os_str() == marker.as_str())
        })
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| anyhow!("site-packages/rpm directory not found."))
}
