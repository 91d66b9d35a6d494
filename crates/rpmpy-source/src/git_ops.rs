use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Result};
use regex::Regex;
use rpmpy_core::{command_failure, tool_command, CommandRunner};

pub(crate) fn base_git_command() -> Command {
    let mut command = tool_command("git");
    command
        .arg("-c")
        .arg("core.autocrlf=false")
        .arg("-c")
        .arg("advice.detachedHead=false");
    command
}

/// Whether `branch` exists on the remote, from `git ls-remote --heads`.
pub(crate) fn remote_branch_exists(
    runner: &dyn CommandRunner,
    repository: &str,
    branch: &str,
) -> Result<bool> {
    let mut command = base_git_command();
    command
        .arg("ls-remote")
        .arg("--heads")
        .arg(repository)
        .arg(branch);
    let output = runner.run(&mut command)?;
    if !output.success() {
        return Err(command_failure(
            &format!("failed listing remote branches of {repository}"),
            &command,
            &output,
        ));
    }
    Ok(ls_remote_lists_branch(&output.stdout, branch))
}

pub(crate) fn ls_remote_lists_branch(stdout: &str, branch: &str) -> bool {
    let reference = format!("refs/heads/{branch}");
    stdout.lines().any(|line| {
        line.split_whitespace()
            .nth(1)
            .is_some_and(|name| name == reference)
    })
}

/// Shallow clone of a single branch into `destination`.
///
/// Old git clients report a missing branch as a warning while still exiting
/// with status 0, so that warning is treated as a failure too.
pub(crate) fn run_git_clone(
    runner: &dyn CommandRunner,
    repository: &str,
    branch: &str,
    destination: &Path,
) -> Result<()> {
    let mut command = base_git_command();
    command
        .arg("clone")
        .arg("-b")
        .arg(branch)
        .arg("--depth=1")
        .arg("--")
        .arg(repository)
        .arg(destination);
    let output = runner.run(&mut command)?;
    if !output.success() {
        return Err(command_failure(
            &format!("git clone of branch {branch} failed"),
            &command,
            &output,
        ));
    }
    if reports_missing_remote_branch(&output.combined()) {
        return Err(anyhow!(
            "fatal: Remote branch {branch} not found in upstream origin."
        ));
    }
    Ok(())
}

pub(crate) fn reports_missing_remote_branch(output: &str) -> bool {
    Regex::new(r"(?m)^warning: Remote branch \S+ not found")
        .map(|pattern| pattern.is_match(output))
        .unwrap_or(false)
}
