mod fs_ops;
mod git_ops;
mod http;
mod locator;
mod transport;

pub use http::{DownloadProgress, ProgressHook};
pub use locator::{
    candidate_tag_names, AcquiredSource, ArchiveCandidate, ArtifactLocator, SourceEndpoints,
    SourceLookup, SourceOrigin, SourceSite, GITHUB_ARCHIVE_BASE, GIT_CLONE_DIR_NAME,
    GIT_REPOSITORY, GIT_TRUNK_BRANCH, RPM_ORG_RELEASES_BASE,
};
pub use transport::{FetchOutcome, NetworkTransport, SourceTransport};
