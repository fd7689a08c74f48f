use super::{Host, HostError, NormalizedPath};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

/// In-memory host keyed by file path. Directories are implied by the files
/// stored beneath them.
#[derive(Default)]
pub struct MemoryHost {
    files: RwLock<BTreeMap<NormalizedPath, Vec<u8>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (NormalizedPath, C)>,
        C: Into<Vec<u8>>,
    {
        let files = files
            .into_iter()
            .map(|(path, content)| (path, content.into()))
            .collect();
        Self {
            files: RwLock::new(files),
        }
    }

    /// Copy of every stored file, ordered by path.
    pub async fn snapshot(&self) -> BTreeMap<NormalizedPath, Vec<u8>> {
        self.files.read().await.clone()
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>, HostError> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| HostError::NotFound(path.clone()))
    }

    async fn write(&self, path: &NormalizedPath, content: &[u8]) -> Result<(), HostError> {
        self.files
            .write()
            .await
            .insert(path.clone(), content.to_vec());
        Ok(())
    }

    async fn exists(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        let files = self.files.read().await;
        Ok(files.contains_key(path) || files.keys().any(|file| file.is_descendant_of(path)))
    }

    async fn is_directory(&self, path: &NormalizedPath) -> Result<bool, HostError> {
        let files = self.files.read().await;
        Ok(!files.contains_key(path) && files.keys().any(|file| file.is_descendant_of(path)))
    }

    async fn list(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>, HostError> {
        let files = self.files.read().await;
        let mut children = BTreeSet::new();
        for file in files.keys() {
            if !file.is_descendant_of(path) {
                continue;
            }
            if let Some(first) = file
                .strip_prefix(path)
                .and_then(|rest| rest.split('/').next())
            {
                children.insert(first.to_string());
            }
        }
        let mut listed = Vec::with_capacity(children.len());
        for child in children {
            listed.push(NormalizedPath(format!(
                "{}/{}",
                path.as_str().trim_end_matches('/'),
                child
            )));
        }
        Ok(listed)
    }

    async fn delete(&self, path: &NormalizedPath) -> Result<(), HostError> {
        let mut files = self.files.write().await;
        if files.remove(path).is_some() {
            return Ok(());
        }
        let before = files.len();
        files.retain(|file, _| !file.is_descendant_of(path));
        if files.len() == before {
            return Err(HostError::NotFound(path.clone()));
        }
        Ok(())
    }

    async fn rename(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<(), HostError> {
        let mut files = self.files.write().await;
        let content = files
            .remove(from)
            .ok_or_else(|| HostError::NotFound(from.clone()))?;
        files.insert(to.clone(), content);
        Ok(())
    }
}
