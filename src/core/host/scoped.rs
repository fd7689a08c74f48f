use super::{Host, HostError, NormalizedPath};
use async_trait::async_trait;
use std::sync::Arc;

/// Re-roots another host under `scope`: `/a.txt` here is `<scope>/a.txt` there.
pub struct ScopedHost {
    inner: Arc<dyn Host>,
    scope: NormalizedPath,
}

impl ScopedHost {
    pub fn new(inner: Arc<dyn Host>, scope: NormalizedPath) -> Self {
        Self { inner, scope }
    }

    pub fn scope(&self) -> &NormalizedPath {
        &self.scope
    }

    fn outer(&self, path: &NormalizedPath) -> NormalizedPath {
        if self.scope.is_root() {
            return path.clone();
        }
        if path.is_root() {
            return self.scope.clone();
        }
        NormalizedPath(format!("{}{}", self.scope.as_str(), path.as_str()))
    }

    fn inner_path(&self, outer: &NormalizedPath) -> NormalizedPath {
        match outer.strip_prefix(&self.scope) {
            Some(rest) => NormalizedPath(format!("/{}", rest)),
            None => outer.clone(),
        }
    }

    fn rescope(&self, err: HostError) -> HostError {
        match err {
            HostError::NotFound(path) => HostError::NotFound(self.inner_path(&path)),
            HostError::PermissionDenied(path) => {
                HostError::PermissionDenied(self.inner_path(&path))
            }
            HostError::AlreadyExists(path) => HostError::AlreadyExists(self.inner_path(&path)),
            HostError::Io { path, source } => HostError::Io {
                path: self.inner_path(&path),
                source,
            },
        }
    }
}

#[async_trait]
impl Host for ScopedHost {
    async fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>, HostError> {
        self.inner
            .read(&self.outer(path))
            .await
            .map_err(|err| self.rescope(err))
    }

    async fn write(&self, path: &NormalizedPath, content: &[u8]) -> Result<(), HostError> {
        self.inner
            .write(&self.outer(path), content)
            .await
            .map_err(|err| self.rescope(err))
    }

    async fn exists(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        self.inner
            .exists(&self.outer(path))
            .await
            .map_err(|err| self.rescope(err))
    }

    async fn is_directory(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        self.inner
            .is_directory(&self.outer(path))
            .await
            .map_err(|err| self.rescope(err))
    }

    async fn list(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>, HostError> {
        let listed = self
            .inner
            .list(&self.outer(path))
            .await
            .map_err(|err| self.rescope(err))?;
        Ok(listed.iter().map(|child| self.inner_path(child)).collect())
    }

    async fn delete(&self, path: &NormalizedPath) -> Result<(), HostError> {
        self.inner
            .delete(&self.outer(path))
            .await
            .map_err(|err| self.rescope(err))
    }

    async fn rename(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<(), HostError> {
        self.inner
            .rename(&self.outer(from), &self.outer(to))
            .await
            .map_err(|err| self.rescope(err))
    }
}
