use crate::core::host::NormalizedPath;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Compute a lowercase hex SHA-256 digest of the provided bytes.
pub fn compute_sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Host-visible effect of one staged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Create,
    Update,
    Delete,
    Rename,
}

/// One line of a diff or dry-run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub kind: ReportKind,
    pub path: NormalizedPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NormalizedPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ReportEntry {
    pub(crate) fn write(kind: ReportKind, path: NormalizedPath, content: &[u8]) -> Self {
        Self {
            kind,
            path,
            to: None,
            size: Some(content.len()),
            sha256: Some(compute_sha256_hex(content)),
        }
    }

    pub(crate) fn delete(path: NormalizedPath) -> Self {
        Self {
            kind: ReportKind::Delete,
            path,
            to: None,
            size: None,
            sha256: None,
        }
    }

    pub(crate) fn rename(from: NormalizedPath, to: NormalizedPath) -> Self {
        Self {
            kind: ReportKind::Rename,
            path: from,
            to: Some(to),
            size: None,
            sha256: None,
        }
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReportKind::Create => write!(
                f,
                "CREATE {} ({} bytes)",
                self.path,
                self.size.unwrap_or_default()
            ),
            ReportKind::Update => write!(
                f,
                "UPDATE {} ({} bytes)",
                self.path,
                self.size.unwrap_or_default()
            ),
            ReportKind::Delete => write!(f, "DELETE {}", self.path),
            ReportKind::Rename => match &self.to {
                Some(to) => write!(f, "RENAME {} => {}", self.path, to),
                None => write!(f, "RENAME {}", self.path),
            },
        }
    }
}

/// Pending changes of a staging tree plus the paths that would block a
/// non-forced commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DryRunReport {
    pub entries: Vec<ReportEntry>,
    pub conflicts: Vec<NormalizedPath>,
}

impl DryRunReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.conflicts.is_empty()
    }

    /// Render one line per entry, followed by one `ERROR!` line per conflict.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self.entries.iter().map(|e| e.to_string()).collect();
        for conflict in &self.conflicts {
            lines.push(format!("ERROR! {} already exists.", conflict));
        }
        lines.join("\n")
    }
}
