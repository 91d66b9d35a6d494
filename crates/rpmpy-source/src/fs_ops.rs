use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rpmpy_core::{run_checked, tool_command, ArchiveType, CommandRunner};

pub(crate) fn extract_tar(
    runner: &dyn CommandRunner,
    archive_path: &Path,
    archive_type: ArchiveType,
    destination: &Path,
) -> Result<()> {
    fs::create_dir_all(destination)
        .with_context(|| format!("failed to create extract dir: {}", destination.display()))?;
    let mut command = tool_command("tar");
    command
        .arg(archive_type.tar_flag())
        .arg("-xf")
        .arg(archive_path)
        .arg("-C")
        .arg(destination);
    run_checked(
        runner,
        &mut command,
        &format!("failed to extract {} archive", archive_type.as_str()),
    )?;
    Ok(())
}
