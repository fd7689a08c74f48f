use super::{Host, HostError, NormalizedPath};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Host backed by a directory on the local filesystem.
pub struct LocalHost {
    root: PathBuf,
}

impl LocalHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &NormalizedPath) -> PathBuf {
        let mut resolved = self.root.clone();
        for segment in path.segments() {
            resolved.push(segment);
        }
        resolved
    }

    async fn ensure_parent(&self, path: &NormalizedPath) -> Result<(), HostError> {
        if let Some(parent) = self.resolve(path).parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| HostError::from_io(path, err))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Host for LocalHost {
    async fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>, HostError> {
        fs::read(self.resolve(path))
            .await
            .map_err(|err| HostError::from_io(path, err))
    }

    async fn write(&self, path: &NormalizedPath, content: &[u8]) -> Result<(), HostError> {
        self.ensure_parent(path).await?;
        fs::write(self.resolve(path), content)
            .await
            .map_err(|err| HostError::from_io(path, err))
    }

    async fn exists(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        fs::try_exists(self.resolve(path))
            .await
            .map_err(|err| HostError::from_io(path, err))
    }

    async fn is_directory(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        match fs::metadata(self.resolve(path)).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(HostError::from_io(path, err)),
        }
    }

    async fn list(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>, HostError> {
        let mut entries = match fs::read_dir(self.resolve(path)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(HostError::from_io(path, err)),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| HostError::from_io(path, err))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        let mut listed = Vec::with_capacity(names.len());
        for name in names {
            listed.push(NormalizedPath(format!(
                "{}/{}",
                path.as_str().trim_end_matches('/'),
                name
            )));
        }
        Ok(listed)
    }

    async fn delete(&self, path: &NormalizedPath) -> Result<(), HostError> {
        let target = self.resolve(path);
        let metadata = fs::metadata(&target)
            .await
            .map_err(|err| HostError::from_io(path, err))?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&target).await
        } else {
            fs::remove_file(&target).await
        };
        result.map_err(|err| HostError::from_io(path, err))
    }

    async fn rename(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<(), HostError> {
        self.ensure_parent(to).await?;
        fs::rename(self.resolve(from), self.resolve(to))
            .await
            .map_err(|err| HostError::from_io(from, err))
    }
}
