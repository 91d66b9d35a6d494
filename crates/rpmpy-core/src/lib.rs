mod archive;
mod command;
mod descriptor;
mod distro;
mod log;
mod patch;
mod version;

pub use archive::{remote_file_name, ArchiveType};
#[cfg(feature = "test-support")]
pub use command::testing;
pub use command::{
    command_failure, describe_command, run_checked, tool_command, CommandOutput, CommandRunner,
    SystemRunner,
};
pub use descriptor::{BuildDescriptor, RenderedDescriptor, OUTPUT_FILE_NAME, TEMPLATE_FILE_NAME};
pub use distro::{
    DistributionFamily, DistributionProbe, OsRelease, DEBIAN_PACKAGE_TOOL, OS_RELEASE_FILE,
    REDHAT_RELEASE_FILE,
};
pub use log::{current_output_style, render_log_line, CapturedLog, Level, Logger, OutputStyle};
pub use patch::{apply_patches, Patch, PatchReport, PatchResult};
pub use version::{Version, VersionInfo, VersionToken};
