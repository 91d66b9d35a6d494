use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// One alphanumeric run of a version string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionToken {
    Number(u64),
    Text(String),
}

impl VersionToken {
    fn parse(token: &str) -> Self {
        if token.chars().all(|ch| ch.is_ascii_digit()) {
            if let Ok(value) = token.parse::<u64>() {
                return Self::Number(value);
            }
        }
        Self::Text(token.to_string())
    }
}

impl Ord for VersionToken {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => left.cmp(right),
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for VersionToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Comparable token sequence of a version string.
///
/// Ordering is lexicographic over the tokens; when one sequence is a prefix
/// of the other the longer one is greater, so `4.9.0-beta1` sorts after
/// `4.9.0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionInfo(Vec<VersionToken>);

impl VersionInfo {
    pub fn parse(input: &str) -> Self {
        Self(
            input
                .split(|ch: char| !ch.is_ascii_alphanumeric())
                .filter(|token| !token.is_empty())
                .map(VersionToken::parse)
                .collect(),
        )
    }

    pub fn from_numbers(numbers: &[u64]) -> Self {
        Self(numbers.iter().copied().map(VersionToken::Number).collect())
    }

    pub fn tokens(&self) -> &[VersionToken] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric token at `index`, if that token is a number.
    pub fn number(&self, index: usize) -> Option<u64> {
        match self.0.get(index) {
            Some(VersionToken::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn at_least(&self, numbers: &[u64]) -> bool {
        *self >= Self::from_numbers(numbers)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({rendered})")
    }
}

/// Target version of the binding, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    raw: String,
    info: VersionInfo,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("version must not be empty"));
        }
        let info = VersionInfo::parse(raw);
        if info.is_empty() {
            return Err(anyhow!("version '{raw}' has no alphanumeric component"));
        }
        Ok(Self {
            raw: raw.to_string(),
            info,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn info(&self) -> &VersionInfo {
        &self.info
    }

    /// `N.N.N[.N]` strings are releases; anything with a suffix such as
    /// `-rc1` is not.
    pub fn is_release(&self) -> bool {
        self.raw.chars().all(|ch| ch.is_ascii_digit() || ch == '.')
    }

    /// `<major>.<minor>.x`, or `None` when the version has a single token.
    pub fn stable_branch(&self) -> Option<String> {
        match self.info.tokens() {
            [major, minor, ..] => Some(format!("{major}.{minor}.x")),
            _ => None,
        }
    }

    pub fn at_least(&self, numbers: &[u64]) -> bool {
        self.info.at_least(numbers)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}
