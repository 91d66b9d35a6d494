mod binary;
mod context;
mod debian;
mod fedora;
mod fs_utils;
mod host;
mod orchestrator;
mod package_manager;
mod python;
mod rpm;
mod staging;
mod suse;
mod types;

pub use binary::{find_binding_dir, install_from_binary_package};
pub use context::InstallerContext;
pub use debian::DebianBackend;
pub use fedora::{FedoraBackend, FedoraTool};
pub use fs_utils::{
    copy_dir_recursive, find_files, force_symlink, glob_dirs, remove_file_if_exists, DirGuard,
};
pub use host::verify_system_status;
pub use orchestrator::{InstallOrchestrator, DEVEL_MISSING_MESSAGE};
pub use package_manager::{PackageManager, DEFAULT_INCLUDE_DIR};
pub use python::Python;
pub use rpm::Rpm;
pub use staging::{needs_popt, stage_headers, stage_libraries, stage_popt, LibrarySpec};
pub use suse::{newest_package_file, RpmFileName, SuseBackend, ZYPPER_EXIT_INF_CAP_NOT_FOUND};
pub use types::{BinaryInstall, DownloadOutcome, InstallOptions, InstallState, Verification};

#[cfg(test)]
mod tests;
