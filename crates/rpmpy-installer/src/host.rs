use anyhow::{anyhow, Result};

use crate::context::InstallerContext;
use crate::types::Verification;

/// Decides whether the run proceeds, is a no-op, or cannot start.
pub fn verify_system_status(
    ctx: &InstallerContext<'_>,
    allow_system_python: bool,
) -> Result<Verification> {
    if !cfg!(target_os = "linux") {
        return Err(anyhow!("Supported platform is Linux only."));
    }

    if ctx.python.is_system() {
        if ctx.python.is_binding_installed(ctx.runner, ctx.logger) {
            ctx.logger
                .info("RPM Python binding already installed on system Python. Nothing to do.");
            return Ok(Verification::Skip);
        }
        if !allow_system_python {
            return Err(anyhow!(
                "\nRPM Python binding on system Python should be installed manually.\n\
                 Install the proper RPM package of python{{,2,3}}-rpm,\n\
                 or set a environment variable RPM_PY_SYS=true\n"
            ));
        }
        ctx.logger
            .warn("Installing onto the system Python as RPM_PY_SYS=true.");
    }

    if ctx.rpm.version().at_least(&[4, 16]) && ctx.python.major() == 2 {
        return Err(anyhow!("RPM version >= 4.16 does not support Python 2."));
    }

    if ctx.rpm.is_system() {
        verify_rpm_package_status(ctx)?;
    }
    Ok(Verification::Proceed)
}

fn verify_rpm_package_status(ctx: &InstallerContext<'_>) -> Result<()> {
    let runtime_package = ctx.package_manager.runtime_package();
    if !ctx.is_installed(runtime_package) {
        return Err(anyhow!(
            "\nRequired RPM not installed: [{runtime_package}].\nInstall the RPM package.\n"
        ));
    }

    if !ctx.package_manager.has_build_libs_split(ctx.rpm.version()) {
        return Ok(());
    }
    let Some(build_libs) = ctx.package_manager.build_libs_package() else {
        return Ok(());
    };
    if !ctx.is_installed(build_libs) && !ctx.is_downloadable() {
        return Err(anyhow!(
            "\nRPM: {build_libs} or\n\
             RPM download tool ({}) required.\n\
             Install any of those.\n",
            download_tool_hint(ctx)
        ));
    }
    Ok(())
}

pub(crate) fn download_tool_hint(ctx: &InstallerContext<'_>) -> String {
    match ctx.package_manager {
        crate::PackageManager::Fedora(backend) => format!(
            "{} ({})",
            backend.tool().download_plugin(),
            backend.tool().as_str()
        ),
        other => other.package_tool().to_string(),
    }
}
