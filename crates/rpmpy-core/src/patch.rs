use anyhow::{Context, Result};
use regex::{NoExpand, RegexBuilder};

/// Declarative regex substitution applied to a whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub pattern: String,
    pub replacement: String,
    pub required: bool,
}

impl Patch {
    pub fn required(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            required: true,
        }
    }

    pub fn optional(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub pattern: String,
    pub required: bool,
    pub substitutions: usize,
}

impl PatchResult {
    pub fn applied(&self) -> bool {
        self.substitutions > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub results: Vec<PatchResult>,
}

impl PatchReport {
    /// Required patches whose pattern matched nothing.
    pub fn missing_required(&self) -> Vec<&PatchResult> {
        self.results
            .iter()
            .filter(|result| result.required && !result.applied())
            .collect()
    }

    pub fn all_required_applied(&self) -> bool {
        self.missing_required().is_empty()
    }
}

/// Applies `patches` in order, each in multi-line mode against the full
/// text. Replacement text is literal: `$` carries no group meaning.
pub fn apply_patches(content: &str, patches: &[Patch]) -> Result<(String, PatchReport)> {
    let mut document = content.to_string();
    let mut report = PatchReport::default();

    for patch in patches {
        let regex = RegexBuilder::new(&patch.pattern)
            .multi_line(true)
            .build()
            .with_context(|| format!("invalid patch pattern: {}", patch.pattern))?;
        let substitutions = regex.find_iter(&document).count();
        if substitutions > 0 {
            document = regex
                .replace_all(&document, NoExpand(&patch.replacement))
                .into_owned();
        }
        report.results.push(PatchResult {
            pattern: patch.pattern.clone(),
            required: patch.required,
            substitutions,
        });
    }

    Ok((document, report))
}
