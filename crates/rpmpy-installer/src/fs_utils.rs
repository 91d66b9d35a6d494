use std::env;
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glob::Pattern;
use walkdir::WalkDir;

/// Changes the process working directory and restores the previous one
/// when dropped, on every exit path.
#[derive(Debug)]
pub struct DirGuard {
    previous: PathBuf,
}

impl DirGuard {
    pub fn enter(dir: &Path) -> Result<Self> {
        let previous = env::current_dir().context("failed to read current directory")?;
        env::set_current_dir(dir)
            .with_context(|| format!("failed to enter directory {}", dir.display()))?;
        Ok(Self { previous })
    }

    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.previous);
    }
}

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Regular files under `root` whose name matches the shell `pattern`,
/// sorted by path. Symlinks are skipped.
pub fn find_files(root: &Path, pattern: &str, max_depth: Option<usize>) -> Result<Vec<PathBuf>> {
    let matcher =
        Pattern::new(pattern).with_context(|| format!("invalid file pattern: {pattern}"))?;
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(root).min_depth(1).follow_links(false);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("failed walking {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.matches(&entry.file_name().to_string_lossy()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// Directories matching a glob relative to `base`, sorted.
pub fn glob_dirs(base: &Path, relative_pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = base.join(relative_pattern);
    let pattern = pattern
        .to_str()
        .ok_or_else(|| anyhow!("non UTF-8 glob pattern: {}", pattern.display()))?;
    let mut found = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("invalid glob: {pattern}"))? {
        let path = entry.context("failed reading glob match")?;
        if path.is_dir() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// `ln -sf target link`.
pub fn force_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    remove_file_if_exists(link)
        .with_context(|| format!("failed to replace {}", link.display()))?;
    symlink(target, link).with_context(|| {
        format!(
            "failed to link {} -> {}",
            link.display(),
            target.display()
        )
    })
}

pub fn copy_dir_recursive(source_root: &Path, destination_root: &Path) -> Result<()> {
    if !source_root.is_dir() {
        return Err(anyhow!(
            "source location is not a directory: {}",
            source_root.display()
        ));
    }

    for entry in WalkDir::new(source_root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed walking {}", source_root.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source_root)
            .with_context(|| format!("unexpected path {}", entry.path().display()))?;
        let to_path = destination_root.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&to_path)
                .with_context(|| format!("failed creating directory {}", to_path.display()))?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| format!("failed reading link {}", entry.path().display()))?;
            force_symlink(&target, &to_path)?;
        } else {
            fs::copy(entry.path(), &to_path).with_context(|| {
                format!(
                    "failed copying file from {} to {}",
                    entry.path().display(),
                    to_path.display()
                )
            })?;
        }
    }
    Ok(())
}
