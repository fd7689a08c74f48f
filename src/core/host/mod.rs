//! Uniform filesystem access for the staging and commit layers.
//!
//! Every path handed to a [`Host`] is a [`NormalizedPath`] relative to the
//! host's own root. Only the workflow commit path and task executors hold a
//! host for writing; the engine reads through the staging tree.

pub mod local;
pub mod memory;
pub mod path;
pub mod read_only;
pub mod scoped;

pub use local::LocalHost;
pub use memory::MemoryHost;
pub use path::NormalizedPath;
pub use read_only::ReadOnlyHost;
pub use scoped::ScopedHost;

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;

/// Failures surfaced by a host medium.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("path not found: {0}")]
    NotFound(NormalizedPath),
    #[error("permission denied: {0}")]
    PermissionDenied(NormalizedPath),
    #[error("path already exists: {0}")]
    AlreadyExists(NormalizedPath),
    #[error("i/o failure at {path}: {source}")]
    Io {
        path: NormalizedPath,
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    pub fn from_io(path: &NormalizedPath, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HostError::NotFound(path.clone()),
            std::io::ErrorKind::PermissionDenied => HostError::PermissionDenied(path.clone()),
            std::io::ErrorKind::AlreadyExists => HostError::AlreadyExists(path.clone()),
            _ => HostError::Io {
                path: path.clone(),
                source: err,
            },
        }
    }

    pub fn path(&self) -> &NormalizedPath {
        match self {
            HostError::NotFound(path)
            | HostError::PermissionDenied(path)
            | HostError::AlreadyExists(path) => path,
            HostError::Io { path, .. } => path,
        }
    }
}

impl From<HostError> for AppError {
    fn from(err: HostError) -> Self {
        let (category, code) = match &err {
            HostError::NotFound(_) => (ErrorCategory::NotFound, "HOST-NOTFOUND-001"),
            HostError::PermissionDenied(_) => {
                (ErrorCategory::PermissionDenied, "HOST-PERM-001")
            }
            HostError::AlreadyExists(_) => (ErrorCategory::IoError, "HOST-EXISTS-001"),
            HostError::Io { .. } => (ErrorCategory::IoError, "HOST-IO-001"),
        };
        let path = err.path().clone();
        AppError::with_source(category, err.to_string(), Box::new(err))
            .with_code(code)
            .with_paths([path])
    }
}

/// Filesystem abstraction shared by in-memory and on-disk media.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    async fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>, HostError>;

    async fn write(&self, path: &NormalizedPath, content: &[u8]) -> Result<(), HostError>;

    async fn exists(&self, path: &NormalizedPath) -> Result<bool, HostError>;

    async fn is_directory(&self, path: &NormalizedPath) -> Result<bool, HostError>;

    /// Direct children of `path`, sorted. Missing directories list as empty.
    async fn list(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>, HostError>;

    async fn delete(&self, path: &NormalizedPath) -> Result<(), HostError>;

    async fn rename(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<(), HostError> {
        let content = self.read(from).await?;
        self.write(to, &content).await?;
        self.delete(from).await
    }
}
