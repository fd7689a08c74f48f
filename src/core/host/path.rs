#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slash-separated, absolute path inside a host's root.
///
/// Normalization strips empty and `.` segments, folds `..` into its parent and
/// converts backslashes, so two spellings of the same location compare equal.
/// A path that climbs above the root is rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedPath(pub(super) String);

impl NormalizedPath {
    pub fn root() -> Self {
        NormalizedPath("/".to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(AppError::new(
                            ErrorCategory::ResolutionError,
                            format!("path '{}' escapes the host root", raw),
                        )
                        .with_code("PATH-INVALID-001"));
                    }
                }
                other => segments.push(other),
            }
        }
        Ok(NormalizedPath(format!("/{}", segments.join("/"))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Resolve `relative` against this path. Absolute inputs are still
    /// treated as relative to `self`.
    pub fn join(&self, relative: &str) -> Result<Self, AppError> {
        NormalizedPath::parse(&format!("{}/{}", self.0, relative))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(NormalizedPath::root()),
            Some(index) => Some(NormalizedPath(self.0[..index].to_string())),
            None => None,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Returns the remainder below `base` (without a leading slash), or `None`
    /// when `self` is not `base` or one of its descendants.
    pub fn strip_prefix(&self, base: &NormalizedPath) -> Option<&str> {
        if base.is_root() {
            return Some(self.0.trim_start_matches('/'));
        }
        let rest = self.0.strip_prefix(base.as_str())?;
        if rest.is_empty() {
            Some("")
        } else {
            rest.strip_prefix('/')
        }
    }

    pub fn is_descendant_of(&self, base: &NormalizedPath) -> bool {
        self != base && self.strip_prefix(base).is_some()
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NormalizedPath {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NormalizedPath::parse(value)
    }
}

impl TryFrom<String> for NormalizedPath {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        NormalizedPath::parse(&value)
    }
}

impl From<NormalizedPath> for String {
    fn from(path: NormalizedPath) -> Self {
        path.0
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
