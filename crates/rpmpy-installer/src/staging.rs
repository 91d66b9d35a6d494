use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use crate::context::InstallerContext;
use crate::fs_utils::{find_files, force_symlink};
use crate::types::DownloadOutcome;

const HEADER_DIRS: &[&str] = &["rpmio", "lib", "build", "sign"];
const POPT_FALLBACK_LIB_DIR: &str = "/lib64";

/// A shared library the binding links against, and where the build
/// expects to find it relative to the source top directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySpec {
    pub name: &'static str,
    pub link_dir: &'static str,
    pub required: bool,
    pub source_dir: PathBuf,
}

impl LibrarySpec {
    fn new(name: &'static str, link_dir: &'static str, required: bool, source_dir: &Path) -> Self {
        Self {
            name,
            link_dir,
            required,
            source_dir: source_dir.to_path_buf(),
        }
    }

    pub fn file_pattern(&self) -> String {
        format!("lib{}.so*", self.name)
    }

    pub fn link_path(&self, top_dir: &Path) -> PathBuf {
        top_dir
            .join(self.link_dir)
            .join(format!("lib{}.so", self.name))
    }
}

/// Path of an absolute system directory once a package was extracted
/// below `root`.
fn extracted_path(root: &Path, system_dir: &Path) -> PathBuf {
    root.join(system_dir.strip_prefix("/").unwrap_or(system_dir))
}

/// Links `lib<name>.so` for every rpm library into the source tree,
/// downloading the split build libraries when they are not installed.
/// Returns the created links in order.
pub fn stage_libraries(
    ctx: &InstallerContext<'_>,
    top_dir: &Path,
    binding_dir: &Path,
    lib_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut build_lib_dir = lib_dir.to_path_buf();

    if let Some(build_libs) = ctx
        .package_manager
        .build_libs_package()
        .filter(|_| ctx.package_manager.has_build_libs_split(ctx.rpm.version()))
    {
        if ctx.is_downloadable() {
            if !ctx.is_installed(build_libs) {
                download_required(ctx, build_libs, binding_dir)?;
                if let Some(sign_libs) = ctx.package_manager.sign_libs_package() {
                    // Split out of rpm-build-libs on newer releases only.
                    if let Err(err) = ctx.package_manager.download_and_extract(
                        ctx.runner,
                        ctx.logger,
                        sign_libs,
                        binding_dir,
                    ) {
                        ctx.logger
                            .debug(format!("Skipped {sign_libs}: {err:#}"));
                    }
                }
                build_lib_dir = extracted_path(binding_dir, lib_dir);
            }
        } else if !ctx.is_installed(build_libs) {
            return Err(anyhow!(
                "\nRequired RPM not installed: [{build_libs}],\n\
                 when a RPM download plugin not installed.\n"
            ));
        }
    }

    let libraries = [
        LibrarySpec::new("rpmio", "rpmio/.libs", true, lib_dir),
        LibrarySpec::new("rpm", "lib/.libs", true, lib_dir),
        LibrarySpec::new("rpmbuild", "build/.libs", true, &build_lib_dir),
        LibrarySpec::new("rpmsign", "sign/.libs", false, &build_lib_dir),
    ];

    let mut links = Vec::new();
    for library in &libraries {
        let Some(target) = first_library_file(&library.source_dir, &library.file_pattern())? else {
            if library.required {
                return Err(anyhow!(
                    "so file pattern {} not found at {}",
                    library.file_pattern(),
                    library.source_dir.display()
                ));
            }
            ctx.logger.debug(format!(
                "Skip creating symbolic link of not existed so file '{}'",
                library.name
            ));
            continue;
        };
        let link = library.link_path(top_dir);
        force_symlink(&target, &link)?;
        ctx.logger
            .debug(format!("Linked {} -> {}", link.display(), target.display()));
        links.push(link);
    }
    Ok(links)
}

fn first_library_file(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    Ok(find_files(dir, pattern, Some(1))?.into_iter().next())
}

fn download_required(ctx: &InstallerContext<'_>, name: &str, dest_dir: &Path) -> Result<()> {
    match ctx
        .package_manager
        .download_and_extract(ctx.runner, ctx.logger, name, dest_dir)?
    {
        DownloadOutcome::Downloaded(_) => Ok(()),
        DownloadOutcome::NotFound => Err(anyhow!(
            "Required package {name} not found by {}.",
            ctx.package_manager.package_tool()
        )),
    }
}

/// Copies the headers of the source tree to `include/rpm/`, keeping their
/// layout below each source directory.
pub fn stage_headers(top_dir: &Path) -> Result<Vec<PathBuf>> {
    let include_dir = top_dir.join("include").join("rpm");
    let mut copied = Vec::new();
    for header_dir in HEADER_DIRS {
        let source_root = top_dir.join(header_dir);
        if !source_root.is_dir() {
            continue;
        }
        for header in find_files(&source_root, "*.h", None)? {
            let relative = header
                .strip_prefix(&source_root)
                .with_context(|| format!("unexpected header path {}", header.display()))?;
            let destination = include_dir.join(relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::copy(&header, &destination).with_context(|| {
                format!(
                    "failed copying header {} to {}",
                    header.display(),
                    destination.display()
                )
            })?;
            copied.push(destination);
        }
    }
    Ok(copied)
}

/// Whether `include/rpm/rpmlib.h` pulls in popt.h.
pub fn needs_popt(top_dir: &Path) -> Result<bool> {
    let header = top_dir.join("include").join("rpm").join("rpmlib.h");
    let content = fs::read_to_string(&header)
        .with_context(|| format!("failed to read {}", header.display()))?;
    let pattern = Regex::new(r"(?m)^#include .*popt\.h.*$").context("invalid include pattern")?;
    Ok(pattern.is_match(&content))
}

/// Makes popt's library and header available to the build when its devel
/// package is missing.
pub fn stage_popt(
    ctx: &InstallerContext<'_>,
    top_dir: &Path,
    binding_dir: &Path,
    lib_dir: &Path,
) -> Result<()> {
    if !needs_popt(top_dir)? {
        return Ok(());
    }
    let (popt, popt_devel) = ctx.package_manager.popt_packages();
    if ctx.is_installed(popt_devel) {
        return Ok(());
    }
    if !ctx.is_downloadable() {
        return Err(anyhow!(
            "\nInstall a {} download plugin or\ninstall the {} package [{popt_devel}].\n",
            ctx.package_manager.package_tool(),
            ctx.package_manager.package_tool()
        ));
    }
    if !ctx.is_installed(popt) {
        return Err(anyhow!("Required RPM not installed: [{popt}],\n"));
    }

    download_required(ctx, popt_devel, binding_dir)?;

    let search_dirs = [lib_dir.to_path_buf(), PathBuf::from(POPT_FALLBACK_LIB_DIR)];
    let mut popt_library = None;
    for dir in &search_dirs {
        if let Some(found) = first_library_file(dir, "libpopt.so*")? {
            popt_library = Some(found);
            break;
        }
    }
    let popt_library = popt_library.ok_or_else(|| {
        anyhow!(
            "so file pattern libpopt.so* not found at {}",
            search_dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    force_symlink(&popt_library, &top_dir.join("lib/.libs/libpopt.so"))?;

    let header = extracted_path(binding_dir, &ctx.package_manager.include_dir()).join("popt.h");
    let include_dir = top_dir.join("include");
    fs::create_dir_all(&include_dir)
        .with_context(|| format!("failed to create {}", include_dir.display()))?;
    fs::copy(&header, include_dir.join("popt.h"))
        .with_context(|| format!("failed copying {}", header.display()))?;
    Ok(())
}
