use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::log::Logger;
use crate::patch::{apply_patches, Patch, PatchReport};
use crate::version::Version;

pub const TEMPLATE_FILE_NAME: &str = "setup.py.in";
pub const OUTPUT_FILE_NAME: &str = "setup.py";

const PACKAGE_NAME: &str = "rpm";
const PACKAGE_BUGREPORT: &str = "rpm-maint@lists.rpm.org";

const SETUPTOOLS_IMPORT: &str = "
import sys
if sys.version_info >= (3, 0):
    try:
        from setuptools import setup, Extension
    except ImportError:
        from distutils.core import setup, Extension
else:
    from distutils.core import setup, Extension
";

const POPEN_PKG_CONFIG: &str = "
    p = subprocess.Popen(cmd.split(), stdout=subprocess.PIPE)
    pcout, _ = p.communicate()
    pcout = pcout.decode()
";

/// The binding's templated `setup.py.in`: placeholder values plus the
/// ordered patch list applied when rendering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDescriptor {
    replacements: Vec<(String, String)>,
    patches: Vec<Patch>,
}

/// Rendered document together with its patch bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDescriptor {
    pub content: String,
    pub report: PatchReport,
    pub unresolved_placeholders: Vec<String>,
}

impl BuildDescriptor {
    pub fn new(version: &Version, optimized: bool) -> Self {
        let replacements = vec![
            ("@PACKAGE_NAME@".to_string(), PACKAGE_NAME.to_string()),
            ("@VERSION@".to_string(), version.as_str().to_string()),
            (
                "@PACKAGE_BUGREPORT@".to_string(),
                PACKAGE_BUGREPORT.to_string(),
            ),
        ];
        let patches = if optimized {
            optimized_patches()
        } else {
            Vec::new()
        };
        Self {
            replacements,
            patches,
        }
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Replaces the pkg-config lookups with already resolved directories,
    /// for builds where the devel package (and its rpm.pc) is absent.
    pub fn add_patches_without_pkg_config(&mut self, lib_dir: &Path, include_dir: &Path) {
        self.patches.push(Patch::optional(
            r"pkgconfig\('--libs-only-L'\)",
            format!("['{}']", lib_dir.display()),
        ));
        // --libs-only-l on newer sources, --libs on older ones.
        self.patches.push(Patch::required(
            r"pkgconfig\('--libs(-only-l)?'\)",
            "['rpm', 'rpmio']",
        ));
        self.patches.push(Patch::required(
            r"pkgconfig\('--cflags'\)",
            format!("['{}']", include_dir.display()),
        ));
    }

    pub fn apply(&self, template: &str) -> Result<RenderedDescriptor> {
        let mut content = template.to_string();
        for (token, value) in &self.replacements {
            content = content.replace(token, value);
        }

        let (content, report) = apply_patches(&content, &self.patches)?;
        let unresolved_placeholders = find_placeholders(&content);
        Ok(RenderedDescriptor {
            content,
            report,
            unresolved_placeholders,
        })
    }

    /// Renders `setup.py.in` in `dir` to `setup.py`. Required patches that
    /// did not match only produce warnings.
    pub fn render(&self, dir: &Path, logger: &Logger) -> Result<PatchReport> {
        let template_path = dir.join(TEMPLATE_FILE_NAME);
        let output_path = dir.join(OUTPUT_FILE_NAME);
        let template = fs::read_to_string(&template_path).with_context(|| {
            format!(
                "failed to read build descriptor template: {}",
                template_path.display()
            )
        })?;

        let rendered = self.apply(&template)?;
        for result in rendered.report.missing_required() {
            logger.warn(format!("Patch not applied {}", result.pattern));
        }
        if !rendered.unresolved_placeholders.is_empty() {
            logger.warn(format!(
                "Unresolved placeholders in {}: {}",
                output_path.display(),
                rendered.unresolved_placeholders.join(", ")
            ));
        }

        fs::write(&output_path, rendered.content.as_bytes()).with_context(|| {
            format!(
                "failed to write build descriptor: {}",
                output_path.display()
            )
        })?;
        logger.debug(format!("Wrote {}", output_path.display()));
        Ok(rendered.report)
    }
}

fn optimized_patches() -> Vec<Patch> {
    vec![
        // setuptools avoids the distutils deprecation warning on uninstall.
        Patch::required(
            r"\nfrom distutils.core import setup, Extension *?\n",
            SETUPTOOLS_IMPORT,
        ),
        // subprocess.check_output is missing on Python 2.6.
        Patch::required(
            r"\n    pcout = subprocess\.check_output\(cmd.split\(\)\)\.decode\(\) *?\n",
            POPEN_PKG_CONFIG,
        ),
    ]
}

fn find_placeholders(content: &str) -> Vec<String> {
    let Ok(regex) = Regex::new(r"@[A-Za-z_][A-Za-z0-9_]*@") else {
        return Vec::new();
    };
    let mut found = regex
        .find_iter(content)
        .map(|token| token.as_str().to_string())
        .collect::<Vec<_>>();
    found.sort();
    found.dedup();
    found
}
