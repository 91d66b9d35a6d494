use std::path::{Path, PathBuf};

use anyhow::Result;
use reqwest::blocking::Client;
use rpmpy_core::{ArchiveType, CommandRunner};

use crate::fs_ops::extract_tar;
use crate::git_ops::{remote_branch_exists, run_git_clone};
use crate::http::{build_client, download_archive, ProgressHook};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(PathBuf),
    NotFound,
}

/// Remote operations needed to acquire rpm sources.
pub trait SourceTransport {
    /// Downloads `url` to `destination`. A missing remote file is
    /// [`FetchOutcome::NotFound`], never an error.
    fn fetch(&self, url: &str, destination: &Path) -> Result<FetchOutcome>;

    fn extract(&self, archive: &Path, archive_type: ArchiveType, destination: &Path)
        -> Result<()>;

    fn remote_branch_exists(&self, repository: &str, branch: &str) -> Result<bool>;

    fn clone_branch(&self, repository: &str, branch: &str, destination: &Path) -> Result<()>;
}

/// HTTP(S) downloads through reqwest; extraction and git through external
/// commands.
pub struct NetworkTransport<'a> {
    client: Client,
    runner: &'a dyn CommandRunner,
    progress: Option<ProgressHook>,
}

impl<'a> NetworkTransport<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            runner,
            progress: None,
        })
    }

    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }
}

impl SourceTransport for NetworkTransport<'_> {
    fn fetch(&self, url: &str, destination: &Path) -> Result<FetchOutcome> {
        download_archive(&self.client, url, destination, self.progress.as_ref())
    }

    fn extract(
        &self,
        archive: &Path,
        archive_type: ArchiveType,
        destination: &Path,
    ) -> Result<()> {
        extract_tar(self.runner, archive, archive_type, destination)
    }

    fn remote_branch_exists(&self, repository: &str, branch: &str) -> Result<bool> {
        remote_branch_exists(self.runner, repository, branch)
    }

    fn clone_branch(&self, repository: &str, branch: &str, destination: &Path) -> Result<()> {
        run_git_clone(self.runner, repository, branch, destination)
    }
}
