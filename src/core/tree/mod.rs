#![allow(clippy::result_large_err)] // Staging APIs return AppError so conflicts carry their full path list.

//! In-memory overlay of file actions produced by one transformation run.
//!
//! A [`StagingTree`] records intent only. Reads fall through to the base host
//! for paths the tree has not touched; nothing reaches a host until
//! [`StagingTree::commit`].

pub mod action;
pub mod report;

pub use action::Action;
pub use report::{compute_sha256_hex, DryRunReport, ReportEntry, ReportKind};

use crate::core::error::AppError;
use crate::core::host::{Host, HostError, NormalizedPath};
use crate::core::types::{ActionKind, ErrorCategory};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

/// How [`StagingTree::merge`] treats a path both trees already decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    #[default]
    Error,
    Overwrite,
}

/// Counts of host mutations performed by a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub applied: usize,
    pub skipped: usize,
}

pub struct StagingTree {
    base: Arc<dyn Host>,
    // Keyed by the path each action decides; insertion order is commit order
    // within a phase.
    actions: IndexMap<NormalizedPath, Action>,
    // Current content per touched path; `None` marks a staged removal.
    overlay: BTreeMap<NormalizedPath, Option<Vec<u8>>>,
    committed: bool,
}

impl fmt::Debug for StagingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingTree")
            .field("actions", &self.actions.values().collect::<Vec<_>>())
            .field("committed", &self.committed)
            .finish()
    }
}

fn staging_error(code: &str, message: String, path: &NormalizedPath) -> AppError {
    AppError::new(ErrorCategory::StagingError, message)
        .with_code(code)
        .with_paths([path])
}

async fn read_optional(
    host: &dyn Host,
    path: &NormalizedPath,
) -> Result<Option<Vec<u8>>, AppError> {
    match host.read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(HostError::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl StagingTree {
    pub fn new(base: Arc<dyn Host>) -> Self {
        Self {
            base,
            actions: IndexMap::new(),
            overlay: BTreeMap::new(),
            committed: false,
        }
    }

    /// Host the tree reads through. Trees built by the engine get a
    /// read-only view, so writes here fail with `PermissionDenied`.
    pub fn base(&self) -> &Arc<dyn Host> {
        &self.base
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn ensure_mutable(&self) -> Result<(), AppError> {
        if self.committed {
            return Err(AppError::new(
                ErrorCategory::StagingError,
                "staging tree is already committed",
            )
            .with_code("TREE-COMMITTED-001"));
        }
        Ok(())
    }

    // True when `path` or a directory above it carries a staged removal that
    // `path` itself has not been re-staged over.
    fn removed(&self, path: &NormalizedPath) -> bool {
        if let Some(value) = self.overlay.get(path) {
            return value.is_none();
        }
        let mut current = path.parent();
        while let Some(dir) = current {
            if matches!(self.overlay.get(&dir), Some(None)) {
                return true;
            }
            current = dir.parent();
        }
        false
    }

    fn staged_below(&self, path: &NormalizedPath) -> bool {
        self.overlay
            .iter()
            .any(|(key, value)| value.is_some() && key.is_descendant_of(path))
    }

    /// Content of `path` as the transformation currently sees it.
    pub async fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>, AppError> {
        if let Some(Some(content)) = self.overlay.get(path) {
            return Ok(content.clone());
        }
        if self.removed(path) {
            return Err(HostError::NotFound(path.clone()).into());
        }
        Ok(self.base.read(path).await?)
    }

    pub async fn read_to_string(&self, path: &NormalizedPath) -> Result<String, AppError> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("{} is not valid UTF-8: {}", path, err),
            )
            .with_code("TREE-UTF8-001")
        })
    }

    pub async fn exists(&self, path: &NormalizedPath) -> Result<bool, AppError> {
        if let Some(Some(_)) = self.overlay.get(path) {
            return Ok(true);
        }
        if self.staged_below(path) {
            return Ok(true);
        }
        if self.removed(path) {
            return Ok(false);
        }
        Ok(self.base.exists(path).await?)
    }

    pub async fn is_directory(&self, path: &NormalizedPath) -> Result<bool, AppError> {
        if let Some(Some(_)) = self.overlay.get(path) {
            return Ok(false);
        }
        if self.staged_below(path) {
            return Ok(true);
        }
        if self.removed(path) {
            return Ok(false);
        }
        Ok(self.base.is_directory(path).await?)
    }

    /// Direct children of `dir` with staged creations and removals applied.
    pub async fn list(&self, dir: &NormalizedPath) -> Result<Vec<NormalizedPath>, AppError> {
        let mut children: BTreeSet<NormalizedPath> = if self.removed(dir) {
            BTreeSet::new()
        } else {
            self.base.list(dir).await?.into_iter().collect()
        };
        children.retain(|child| !matches!(self.overlay.get(child), Some(None)));
        for (key, value) in &self.overlay {
            if value.is_none() || !key.is_descendant_of(dir) {
                continue;
            }
            if let Some(first) = key.strip_prefix(dir).and_then(|rest| rest.split('/').next()) {
                children.insert(dir.join(first)?);
            }
        }
        Ok(children.into_iter().collect())
    }

    /// Stage a new file. Fails when the tree already holds content for `path`;
    /// an existing host file is only detected at commit.
    pub fn create(
        &mut self,
        path: NormalizedPath,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), AppError> {
        self.ensure_mutable()?;
        if let Some(Some(_)) = self.overlay.get(&path) {
            return Err(staging_error(
                "TREE-EXISTS-001",
                format!("{} already exists in the staging tree", path),
                &path,
            ));
        }
        let content = content.into();
        let replaces_delete = matches!(self.actions.get(&path), Some(Action::Delete { .. }));
        self.actions.shift_remove(&path);
        let action = if replaces_delete {
            Action::Overwrite {
                path: path.clone(),
                content: content.clone(),
            }
        } else {
            Action::Create {
                path: path.clone(),
                content: content.clone(),
            }
        };
        tracing::debug!(path = %path, kind = %action.kind(), bytes = content.len(), "staged file");
        self.actions.insert(path.clone(), action);
        self.overlay.insert(path, Some(content));
        Ok(())
    }

    /// Replace the content at `path`, creating it when absent.
    pub fn overwrite(
        &mut self,
        path: NormalizedPath,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), AppError> {
        self.ensure_mutable()?;
        let content = content.into();
        let prior = self.actions.get(&path).map(Action::kind);
        match prior {
            Some(ActionKind::Create) | Some(ActionKind::Overwrite) => {
                if let Some(Action::Create { content: staged, .. })
                | Some(Action::Overwrite { content: staged, .. }) = self.actions.get_mut(&path)
                {
                    *staged = content.clone();
                }
            }
            Some(ActionKind::Delete) => {
                self.actions.shift_remove(&path);
                self.actions.insert(
                    path.clone(),
                    Action::Overwrite {
                        path: path.clone(),
                        content: content.clone(),
                    },
                );
            }
            Some(ActionKind::Rename) => {
                // A renamed file that gets new content is a delete of the
                // source plus a fresh file at the target.
                if let Some(Action::Rename { from, .. }) = self.actions.shift_remove(&path) {
                    self.stage_delete(from);
                }
                self.actions.insert(
                    path.clone(),
                    Action::Create {
                        path: path.clone(),
                        content: content.clone(),
                    },
                );
            }
            None => {
                self.actions.insert(
                    path.clone(),
                    Action::Overwrite {
                        path: path.clone(),
                        content: content.clone(),
                    },
                );
            }
        }
        tracing::debug!(path = %path, bytes = content.len(), "staged overwrite");
        self.overlay.insert(path, Some(content));
        Ok(())
    }

    /// Stage removal of `path`. Deleting a file this tree created cancels the
    /// creation entirely. A directory expands into one delete per file below
    /// it, and the directory itself reads as gone afterwards.
    pub async fn delete(&mut self, path: &NormalizedPath) -> Result<(), AppError> {
        self.ensure_mutable()?;
        if self.is_directory(path).await? {
            return self.delete_directory(path).await;
        }
        self.delete_file(path).await?;
        tracing::debug!(path = %path, "staged delete");
        Ok(())
    }

    async fn delete_directory(&mut self, dir: &NormalizedPath) -> Result<(), AppError> {
        let mut files = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            for child in self.list(&current).await? {
                if self.is_directory(&child).await? {
                    pending.push(child);
                } else {
                    files.push(child);
                }
            }
        }
        for file in &files {
            self.delete_file(file).await?;
        }
        // No action of its own: the per-file deletes carry the commit.
        self.overlay.insert(dir.clone(), None);
        tracing::debug!(path = %dir, files = files.len(), "staged directory delete");
        Ok(())
    }

    async fn delete_file(&mut self, path: &NormalizedPath) -> Result<(), AppError> {
        match self.actions.get(path).map(Action::kind) {
            Some(ActionKind::Create) => {
                self.actions.shift_remove(path);
                self.overlay.remove(path);
            }
            Some(ActionKind::Overwrite) => {
                self.stage_delete(path.clone());
            }
            Some(ActionKind::Delete) => {
                return Err(staging_error(
                    "TREE-NOTFOUND-001",
                    format!("{} is already deleted", path),
                    path,
                ));
            }
            Some(ActionKind::Rename) => {
                if let Some(Action::Rename { from, .. }) = self.actions.shift_remove(path) {
                    self.stage_delete(from);
                }
                self.overlay.remove(path);
            }
            None => {
                if !self.exists(path).await? {
                    return Err(staging_error(
                        "TREE-NOTFOUND-001",
                        format!("cannot delete {}: path does not exist", path),
                        path,
                    ));
                }
                self.stage_delete(path.clone());
            }
        }
        Ok(())
    }

    pub async fn rename(
        &mut self,
        from: &NormalizedPath,
        to: &NormalizedPath,
    ) -> Result<(), AppError> {
        self.ensure_mutable()?;
        if from == to {
            return Ok(());
        }
        if self.is_directory(from).await? {
            return Err(staging_error(
                "TREE-DIR-001",
                format!("cannot rename {}: directory renames are not supported", from),
                from,
            ));
        }
        let content = match self.read(from).await {
            Ok(content) => content,
            Err(err) if err.is(ErrorCategory::NotFound) => {
                return Err(staging_error(
                    "TREE-NOTFOUND-001",
                    format!("cannot rename {}: path does not exist", from),
                    from,
                ));
            }
            Err(err) => return Err(err),
        };
        if self.exists(to).await? {
            return Err(staging_error(
                "TREE-EXISTS-001",
                format!("cannot rename {} to {}: target exists", from, to),
                to,
            ));
        }
        let to_was_deleted = matches!(self.actions.get(to), Some(Action::Delete { .. }));

        match self.actions.shift_remove(from) {
            Some(Action::Create { .. }) => {
                self.overlay.remove(from);
                self.stage_write(to.clone(), content.clone(), to_was_deleted);
            }
            Some(Action::Rename { from: origin, .. }) if &origin == to => {
                // Moved back to where it started.
                self.overlay.remove(from);
                self.overlay.remove(to);
                tracing::debug!(from = %from, to = %to, "rename cancelled out");
                return Ok(());
            }
            Some(Action::Rename { from: origin, .. }) => {
                self.overlay.remove(from);
                if to_was_deleted {
                    self.stage_delete(origin);
                    self.stage_write(to.clone(), content.clone(), true);
                } else {
                    self.actions.insert(
                        to.clone(),
                        Action::Rename {
                            from: origin,
                            to: to.clone(),
                        },
                    );
                }
            }
            Some(Action::Overwrite { .. }) => {
                self.stage_delete(from.clone());
                self.stage_write(to.clone(), content.clone(), to_was_deleted);
            }
            Some(action @ Action::Delete { .. }) => {
                // `read` cannot succeed on a deleted path; put it back and bail.
                self.actions.insert(from.clone(), action);
                return Err(AppError::new(
                    ErrorCategory::InternalError,
                    format!("staging tree overlay out of sync at {}", from),
                )
                .with_code("TREE-STATE-001"));
            }
            None => {
                if to_was_deleted {
                    self.stage_delete(from.clone());
                    self.stage_write(to.clone(), content.clone(), true);
                } else {
                    self.actions.insert(
                        to.clone(),
                        Action::Rename {
                            from: from.clone(),
                            to: to.clone(),
                        },
                    );
                    self.overlay.insert(from.clone(), None);
                }
            }
        }
        tracing::debug!(from = %from, to = %to, "staged rename");
        self.overlay.insert(to.clone(), Some(content));
        Ok(())
    }

    fn stage_delete(&mut self, path: NormalizedPath) {
        self.actions.shift_remove(&path);
        self.actions
            .insert(path.clone(), Action::Delete { path: path.clone() });
        self.overlay.insert(path, None);
    }

    fn stage_write(&mut self, path: NormalizedPath, content: Vec<u8>, replaces_delete: bool) {
        self.actions.shift_remove(&path);
        let action = if replaces_delete {
            Action::Overwrite {
                path: path.clone(),
                content: content.clone(),
            }
        } else {
            Action::Create {
                path: path.clone(),
                content: content.clone(),
            }
        };
        self.actions.insert(path.clone(), action);
        self.overlay.insert(path, Some(content));
    }

    /// Drop every staged intent for `path`. Returns whether anything changed.
    pub fn revert(&mut self, path: &NormalizedPath) -> Result<bool, AppError> {
        self.ensure_mutable()?;
        let mut reverted = false;
        if let Some(action) = self.actions.shift_remove(path) {
            if let Action::Rename { from, .. } = &action {
                self.overlay.remove(from);
            }
            self.overlay.remove(path);
            reverted = true;
        }
        let renamed_away = self.actions.iter().find_map(|(key, action)| match action {
            Action::Rename { from, .. } if from == path => Some(key.clone()),
            _ => None,
        });
        if let Some(key) = renamed_away {
            self.actions.shift_remove(&key);
            self.overlay.remove(&key);
            self.overlay.remove(path);
            reverted = true;
        }
        if reverted {
            // A reverted file brings its directories back into view.
            let mut current = path.parent();
            while let Some(dir) = current {
                if !self.actions.contains_key(&dir)
                    && matches!(self.overlay.get(&dir), Some(None))
                {
                    self.overlay.remove(&dir);
                }
                current = dir.parent();
            }
        }
        Ok(reverted)
    }

    /// Append `other`'s actions after this tree's own.
    pub fn merge(&mut self, other: StagingTree, strategy: MergeStrategy) -> Result<(), AppError> {
        self.ensure_mutable()?;
        let touched = |action: &Action| -> Vec<NormalizedPath> {
            match action {
                Action::Rename { from, to } => vec![from.clone(), to.clone()],
                other => vec![other.target().clone()],
            }
        };
        if strategy == MergeStrategy::Error {
            let overlapping: Vec<NormalizedPath> = other
                .actions
                .values()
                .flat_map(touched)
                .filter(|path| self.overlay.contains_key(path))
                .collect();
            if !overlapping.is_empty() {
                return Err(AppError::new(
                    ErrorCategory::StagingError,
                    "cannot merge staging trees that touch the same paths",
                )
                .with_code("TREE-MERGE-001")
                .with_paths(overlapping));
            }
        }
        let StagingTree {
            actions, overlay, ..
        } = other;
        for (key, action) in actions {
            for path in touched(&action) {
                match overlay.get(&path) {
                    Some(value) => {
                        self.overlay.insert(path.clone(), value.clone());
                    }
                    None => {
                        self.overlay.remove(&path);
                    }
                }
                if path != key {
                    self.actions.shift_remove(&path);
                }
            }
            self.actions.shift_remove(&key);
            self.actions.insert(key, action);
        }
        // Directory removals carry no action of their own.
        for (path, value) in overlay {
            if value.is_none() && !self.overlay.contains_key(&path) {
                self.overlay.insert(path, None);
            }
        }
        Ok(())
    }

    /// Paths whose host state blocks a non-forced commit: creations over an
    /// existing path, overwrites of differing content, and renames onto an
    /// occupied target or from a vanished source.
    pub async fn conflicts(&self, host: &dyn Host) -> Result<Vec<NormalizedPath>, AppError> {
        let vacated: HashSet<&NormalizedPath> = self
            .actions
            .values()
            .filter_map(|action| match action {
                Action::Delete { path } => Some(path),
                Action::Rename { from, .. } => Some(from),
                _ => None,
            })
            .collect();

        let mut conflicts = Vec::new();
        for action in self.actions.values() {
            match action {
                Action::Create { path, .. } => {
                    if !vacated.contains(path) && host.exists(path).await? {
                        conflicts.push(path.clone());
                    }
                }
                Action::Overwrite { path, content } => {
                    if vacated.contains(path) {
                        continue;
                    }
                    if let Some(existing) = read_optional(host, path).await? {
                        if existing != *content {
                            conflicts.push(path.clone());
                        }
                    }
                }
                Action::Delete { .. } => {}
                Action::Rename { from, to } => {
                    let existing_to = read_optional(host, to).await?;
                    if !host.exists(from).await? {
                        let desired = self.overlay.get(to).and_then(|value| value.as_deref());
                        if existing_to.as_deref() != desired {
                            conflicts.push(from.clone());
                        }
                    } else if !vacated.contains(to) && existing_to.is_some() {
                        conflicts.push(to.clone());
                    }
                }
            }
        }
        Ok(conflicts)
    }

    /// Host-visible changes a commit would make right now. Pure: the host is
    /// only read. Empty once the tree's state matches the host.
    pub async fn diff(&self, host: &dyn Host) -> Result<Vec<ReportEntry>, AppError> {
        let mut entries = Vec::new();
        for action in self.actions.values() {
            match action {
                Action::Create { path, .. } | Action::Overwrite { path, .. } => {
                    let Some(Some(desired)) = self.overlay.get(path) else {
                        continue;
                    };
                    match read_optional(host, path).await? {
                        None => entries.push(ReportEntry::write(
                            ReportKind::Create,
                            path.clone(),
                            desired,
                        )),
                        Some(existing) if existing != *desired => entries.push(
                            ReportEntry::write(ReportKind::Update, path.clone(), desired),
                        ),
                        Some(_) => {}
                    }
                }
                Action::Delete { path } => {
                    if host.exists(path).await? {
                        entries.push(ReportEntry::delete(path.clone()));
                    }
                }
                Action::Rename { from, to } => {
                    let Some(Some(desired)) = self.overlay.get(to) else {
                        continue;
                    };
                    let existing_to = read_optional(host, to).await?;
                    let to_pending = existing_to.as_deref() != Some(desired.as_slice());
                    let from_pending =
                        matches!(self.overlay.get(from), Some(None)) && host.exists(from).await?;
                    match (from_pending, to_pending) {
                        (true, true) => {
                            entries.push(ReportEntry::rename(from.clone(), to.clone()))
                        }
                        (false, true) => {
                            let kind = if existing_to.is_some() {
                                ReportKind::Update
                            } else {
                                ReportKind::Create
                            };
                            entries.push(ReportEntry::write(kind, to.clone(), desired));
                        }
                        (true, false) => entries.push(ReportEntry::delete(from.clone())),
                        (false, false) => {}
                    }
                }
            }
        }
        Ok(entries)
    }

    pub async fn report(&self, host: &dyn Host) -> Result<DryRunReport, AppError> {
        Ok(DryRunReport {
            entries: self.diff(host).await?,
            conflicts: self.conflicts(host).await?,
        })
    }

    /// Apply every staged action to `host`: deletes, then renames, then
    /// writes, each group in staging order. Without `force`, all conflicts
    /// are collected first and the host is left untouched if any exist.
    pub async fn commit(
        &mut self,
        host: &dyn Host,
        force: bool,
    ) -> Result<CommitOutcome, AppError> {
        self.ensure_mutable()?;
        if !force {
            let conflicts = self.conflicts(host).await?;
            if !conflicts.is_empty() {
                tracing::warn!(count = conflicts.len(), "commit blocked by host conflicts");
                return Err(AppError::new(
                    ErrorCategory::ConflictError,
                    format!(
                        "{} path(s) conflict with existing host content; use force to overwrite",
                        conflicts.len()
                    ),
                )
                .with_code("TREE-CONFLICT-001")
                .with_paths(conflicts));
            }
        }

        let mut ordered: Vec<&Action> = self.actions.values().collect();
        ordered.sort_by_key(|action| action.commit_phase());

        let mut outcome = CommitOutcome::default();
        for action in ordered {
            let applied = match action {
                Action::Delete { path } => {
                    if host.exists(path).await? {
                        host.delete(path).await?;
                        true
                    } else {
                        false
                    }
                }
                Action::Rename { from, to } => {
                    if host.exists(from).await? {
                        host.rename(from, to).await?;
                        true
                    } else if let Some(Some(content)) = self.overlay.get(to) {
                        write_if_changed(host, to, content).await?
                    } else {
                        false
                    }
                }
                Action::Create { path, content } | Action::Overwrite { path, content } => {
                    write_if_changed(host, path, content).await?
                }
            };
            if applied {
                outcome.applied += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        self.committed = true;
        tracing::info!(
            applied = outcome.applied,
            skipped = outcome.skipped,
            force,
            "staging tree committed"
        );
        Ok(outcome)
    }
}

async fn write_if_changed(
    host: &dyn Host,
    path: &NormalizedPath,
    content: &[u8],
) -> Result<bool, AppError> {
    if read_optional(host, path).await?.as_deref() == Some(content) {
        return Ok(false);
    }
    host.write(path, content).await?;
    Ok(true)
}
