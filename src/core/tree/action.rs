use crate::core::host::NormalizedPath;
use crate::core::types::ActionKind;

/// A single staged file action.
///
/// Each action is keyed in its tree by [`Action::target`]: the path whose
/// final state it decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create {
        path: NormalizedPath,
        content: Vec<u8>,
    },
    Overwrite {
        path: NormalizedPath,
        content: Vec<u8>,
    },
    Delete {
        path: NormalizedPath,
    },
    Rename {
        from: NormalizedPath,
        to: NormalizedPath,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create { .. } => ActionKind::Create,
            Action::Overwrite { .. } => ActionKind::Overwrite,
            Action::Delete { .. } => ActionKind::Delete,
            Action::Rename { .. } => ActionKind::Rename,
        }
    }

    pub fn target(&self) -> &NormalizedPath {
        match self {
            Action::Create { path, .. }
            | Action::Overwrite { path, .. }
            | Action::Delete { path } => path,
            Action::Rename { to, .. } => to,
        }
    }

    pub fn content(&self) -> Option<&[u8]> {
        match self {
            Action::Create { content, .. } | Action::Overwrite { content, .. } => {
                Some(content.as_slice())
            }
            Action::Delete { .. } | Action::Rename { .. } => None,
        }
    }

    /// Deletes and renames run before writes at commit time.
    pub(crate) fn commit_phase(&self) -> u8 {
        match self {
            Action::Delete { .. } => 0,
            Action::Rename { .. } => 1,
            Action::Create { .. } | Action::Overwrite { .. } => 2,
        }
    }
}
