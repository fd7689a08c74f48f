use super::{Host, HostError, NormalizedPath};
use async_trait::async_trait;
use std::sync::Arc;

/// Read access to another host. Every mutation is `PermissionDenied`.
pub struct ReadOnlyHost {
    inner: Arc<dyn Host>,
}

impl ReadOnlyHost {
    pub fn new(inner: Arc<dyn Host>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Host for ReadOnlyHost {
    async fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>, HostError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &NormalizedPath, _content: &[u8]) -> Result<(), HostError> {
        tracing::warn!(path = %path, "write rejected by read-only host");
        Err(HostError::PermissionDenied(path.clone()))
    }

    async fn exists(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        self.inner.exists(path).await
    }

    async fn is_directory(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        self.inner.is_directory(path).await
    }

    async fn list(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>, HostError> {
        self.inner.list(path).await
    }

    async fn delete(&self, path: &NormalizedPath) -> Result<(), HostError> {
        tracing::warn!(path = %path, "delete rejected by read-only host");
        Err(HostError::PermissionDenied(path.clone()))
    }

    async fn rename(&self, from: &NormalizedPath, _to: &NormalizedPath) -> Result<(), HostError> {
        tracing::warn!(path = %from, "rename rejected by read-only host");
        Err(HostError::PermissionDenied(from.clone()))
    }
}
