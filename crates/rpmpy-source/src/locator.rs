use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rpmpy_core::{remote_file_name, ArchiveType, Logger, Version};

use crate::transport::{FetchOutcome, SourceTransport};

pub const GITHUB_ARCHIVE_BASE: &str = "https://github.com/rpm-software-management/rpm/archive";
pub const RPM_ORG_RELEASES_BASE: &str = "http://ftp.rpm.org/releases";
pub const GIT_REPOSITORY: &str = "https://github.com/rpm-software-management/rpm.git";
pub const GIT_TRUNK_BRANCH: &str = "master";
pub const GIT_CLONE_DIR_NAME: &str = "rpm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSite {
    GitHub,
    RpmOrg,
}

impl SourceSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::RpmOrg => "rpm.org",
        }
    }
}

impl fmt::Display for SourceSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One archive location to try, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCandidate {
    pub site: SourceSite,
    pub url: String,
    pub top_dir_name: String,
}

/// Base locations of the upstream rpm sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoints {
    pub github_archive_base: String,
    pub rpm_org_releases_base: String,
    pub git_repository: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            github_archive_base: GITHUB_ARCHIVE_BASE.to_string(),
            rpm_org_releases_base: RPM_ORG_RELEASES_BASE.to_string(),
            git_repository: GIT_REPOSITORY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    Archive(ArchiveCandidate),
    Git { branch: String },
}

/// Extracted source tree inside the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSource {
    pub top_dir: PathBuf,
    pub origin: SourceOrigin,
}

impl AcquiredSource {
    /// Directory holding the Python binding sources.
    pub fn binding_dir(&self) -> PathBuf {
        self.top_dir.join("python")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLookup {
    Found(AcquiredSource),
    NotFound,
}

/// GitHub tag names for `version`, most likely first.
///
/// Releases are tagged `rpm-X.Y.Z-release`; pre-releases usually carry no
/// suffix.
pub fn candidate_tag_names(version: &Version) -> Vec<String> {
    let plain = format!("rpm-{}", version.as_str());
    let release = format!("{plain}-release");
    if version.is_release() {
        vec![release, plain]
    } else {
        vec![plain, release]
    }
}

/// Locates, downloads and extracts the rpm source tree for one version.
pub struct ArtifactLocator<'a> {
    transport: &'a dyn SourceTransport,
    logger: &'a Logger,
    endpoints: SourceEndpoints,
    git_branch: Option<String>,
}

impl<'a> ArtifactLocator<'a> {
    pub fn new(transport: &'a dyn SourceTransport, logger: &'a Logger) -> Self {
        Self {
            transport,
            logger,
            endpoints: SourceEndpoints::default(),
            git_branch: None,
        }
    }

    pub fn with_endpoints(mut self, endpoints: SourceEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Clone this branch directly instead of trying archives.
    pub fn with_git_branch(mut self, branch: Option<String>) -> Self {
        self.git_branch = branch;
        self
    }

    pub fn candidates(&self, version: &Version) -> Vec<ArchiveCandidate> {
        let github_base = self.endpoints.github_archive_base.trim_end_matches('/');
        let mut candidates = candidate_tag_names(version)
            .into_iter()
            .map(|tag| ArchiveCandidate {
                site: SourceSite::GitHub,
                url: format!("{github_base}/{tag}.tar.gz"),
                top_dir_name: format!("rpm-{tag}"),
            })
            .collect::<Vec<_>>();

        if version.is_release() {
            if let Some(stable_branch) = version.stable_branch() {
                let rpm_org_base = self.endpoints.rpm_org_releases_base.trim_end_matches('/');
                candidates.push(ArchiveCandidate {
                    site: SourceSite::RpmOrg,
                    url: format!(
                        "{rpm_org_base}/rpm-{stable_branch}/rpm-{}.tar.bz2",
                        version.as_str()
                    ),
                    top_dir_name: format!("rpm-{}", version.as_str()),
                });
            }
        }
        candidates
    }

    /// Tries every archive candidate in order, stopping at the first hit.
    ///
    /// Only a not-found outcome moves on to the next candidate; any other
    /// failure aborts.
    pub fn try_archives(&self, version: &Version, work_dir: &Path) -> Result<SourceLookup> {
        for candidate in self.candidates(version) {
            let archive_type = ArchiveType::infer_from_url(&candidate.url)
                .ok_or_else(|| anyhow!("unsupported archive URL: {}", candidate.url))?;
            let file_name = remote_file_name(&candidate.url)
                .ok_or_else(|| anyhow!("archive URL has no file name: {}", candidate.url))?;

            self.logger
                .debug(format!("Downloading {} from {}", candidate.url, candidate.site));
            let archive = match self
                .transport
                .fetch(&candidate.url, &work_dir.join(file_name))?
            {
                FetchOutcome::Fetched(path) => path,
                FetchOutcome::NotFound => {
                    self.logger
                        .info(format!("Archive not found: {}", candidate.url));
                    continue;
                }
            };

            self.transport
                .extract(&archive, archive_type, work_dir)
                .with_context(|| format!("failed to extract {}", archive.display()))?;
            let top_dir = work_dir.join(&candidate.top_dir_name);
            if !top_dir.is_dir() {
                return Err(anyhow!(
                    "archive {} did not contain directory {}",
                    archive.display(),
                    candidate.top_dir_name
                ));
            }
            self.logger.debug(format!("Extracted {}", top_dir.display()));
            return Ok(SourceLookup::Found(AcquiredSource {
                top_dir,
                origin: SourceOrigin::Archive(candidate),
            }));
        }
        Ok(SourceLookup::NotFound)
    }

    /// Explicit branch if configured, else the stable branch when the
    /// remote has it, else trunk.
    pub fn predict_git_branch(&self, version: &Version) -> Result<String> {
        if let Some(branch) = &self.git_branch {
            return Ok(branch.clone());
        }
        let Some(stable_branch) = version.stable_branch() else {
            return Ok(GIT_TRUNK_BRANCH.to_string());
        };
        let stable_branch = format!("rpm-{stable_branch}");
        if self
            .transport
            .remote_branch_exists(&self.endpoints.git_repository, &stable_branch)?
        {
            Ok(stable_branch)
        } else {
            self.logger.debug(format!(
                "Branch {stable_branch} not found upstream, using {GIT_TRUNK_BRANCH}"
            ));
            Ok(GIT_TRUNK_BRANCH.to_string())
        }
    }

    pub fn clone_from_git(&self, version: &Version, work_dir: &Path) -> Result<AcquiredSource> {
        let branch = self.predict_git_branch(version)?;
        let top_dir = work_dir.join(GIT_CLONE_DIR_NAME);
        self.logger.info(format!(
            "Cloning {} branch {branch}",
            self.endpoints.git_repository
        ));
        self.transport
            .clone_branch(&self.endpoints.git_repository, &branch, &top_dir)?;
        Ok(AcquiredSource {
            top_dir,
            origin: SourceOrigin::Git { branch },
        })
    }

    /// Archives first, then a shallow git clone once every archive was
    /// reported missing.
    pub fn acquire(&self, version: &Version, work_dir: &Path) -> Result<AcquiredSource> {
        if self.git_branch.is_none() {
            if let SourceLookup::Found(source) = self.try_archives(version, work_dir)? {
                return Ok(source);
            }
            self.logger.info(format!(
                "No source archive found for rpm {version}, falling back to git"
            ));
        }
        self.clone_from_git(version, work_dir).with_context(|| {
            format!("failed to acquire rpm {version} sources from any location")
        })
    }
}
