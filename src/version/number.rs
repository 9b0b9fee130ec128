//! Version numbers with arbitrary arity and arbitrary-precision components
//!
//! Numeric components are kept as normalized decimal strings (no leading zeros),
//! so `1.99999999999999999999999` parses and compares correctly without any
//! fixed-width integer. Trailing zero components are insignificant:
//! `1.0` and `1.0.0` are equal and hash identically.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::version::error::VersionParseError;

/// A parsed package version
///
/// Ordering is component-wise numeric with zero padding. A version carrying a
/// pre-release label orders before the same numeric version without one.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<String>,
    pre_release: Vec<String>,
    build: Option<String>,
}

impl Version {
    /// Parse a version like `1.2.3`, `1.0.0-rc.1` or `2.0+build.5`
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (text, build) = match text.split_once('+') {
            Some((head, build)) => {
                if build.is_empty() || !build.split('.').all(is_label_token) {
                    return Err(VersionParseError::InvalidVersion(input.to_string()));
                }
                (head, Some(build.to_string()))
            }
            None => (text, None),
        };

        let (numeric, pre_release) = match text.split_once('-') {
            Some((numeric, label)) => {
                if label.is_empty() || !label.split('.').all(is_label_token) {
                    return Err(VersionParseError::InvalidVersion(input.to_string()));
                }
                (numeric, label.split('.').map(str::to_string).collect())
            }
            None => (text, Vec::new()),
        };

        let components = numeric
            .split('.')
            .map(normalize_component)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| VersionParseError::InvalidVersion(input.to_string()))?;

        Ok(Self {
            components,
            pre_release,
            build,
        })
    }

    /// Numeric components as normalized decimal strings
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Dot-separated tokens of the pre-release label (empty when stable)
    pub fn pre_release(&self) -> &[String] {
        &self.pre_release
    }

    pub fn build_metadata(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    /// Numeric component at `index`, treating missing components as zero
    pub(crate) fn component(&self, index: usize) -> &str {
        self.components.get(index).map(String::as_str).unwrap_or("0")
    }

    /// Components without insignificant trailing zeros
    fn significant_components(&self) -> &[String] {
        let end = self
            .components
            .iter()
            .rposition(|c| c != "0")
            .map_or(0, |i| i + 1);
        &self.components[..end]
    }
}

/// Validate a numeric component and strip leading zeros
fn normalize_component(component: &str) -> Option<String> {
    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = component.trim_start_matches('0');
    Some(if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    })
}

fn is_label_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Compare two normalized decimal strings numerically
pub(crate) fn compare_numeric(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_label_token(a: &str, b: &str) -> Ordering {
    let a_numeric = a.bytes().all(|b| b.is_ascii_digit());
    let b_numeric = b.bytes().all(|b| b.is_ascii_digit());
    match (a_numeric, b_numeric) {
        (true, true) => compare_numeric(
            a.trim_start_matches('0'),
            b.trim_start_matches('0'),
        ),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase())),
    }
}

fn compare_pre_release(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            for (x, y) in a.iter().zip(b) {
                let ord = compare_label_token(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| compare_numeric(self.component(i), other.component(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
            .then_with(|| compare_pre_release(&self.pre_release, &other.pre_release))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_components().hash(state);
        for token in &self.pre_release {
            if token.bytes().all(|b| b.is_ascii_digit()) {
                let trimmed = token.trim_start_matches('0');
                (if trimmed.is_empty() { "0" } else { trimmed }).hash(state);
            } else {
                token.to_ascii_lowercase().hash(state);
            }
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("."))?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}
