#![allow(clippy::result_large_err)] // Resolution APIs return AppError directly for structured diagnostics without boxing.

//! Resolves collection and transformation names into runnable descriptions,
//! validates options, and owns the task executor registry for one workflow.

pub mod collection;
pub mod schema;

pub use collection::{
    CollectionDescription, CollectionManifest, CollectionSource, TransformationDescription,
    TransformationManifest,
};
pub use schema::{OptionsSchema, PropertySchema, SchemaType, ValidatedOptions};

use crate::core::engine::Transformation;
use crate::core::error::AppError;
use crate::core::tasks::{TaskExecutor, TaskExecutorRegistry};
use crate::core::types::ErrorCategory;
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

const MANIFEST_FILES: [&str; 3] = ["collection.json", "collection.yaml", "collection.yml"];

fn validate_collection_name(name: &str) -> Result<(), AppError> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^(@[a-z0-9~][a-z0-9._~-]*/)?[a-z0-9~][a-z0-9._~-]*$").ok());
    match pattern {
        Some(pattern) if pattern.is_match(name) => Ok(()),
        _ => Err(AppError::new(
            ErrorCategory::ResolutionError,
            format!("'{}' is not a valid collection name", name),
        )
        .with_code("RES-NAME-001")),
    }
}

pub struct EngineHost {
    registered: DashMap<String, CollectionManifest>,
    factories: DashMap<String, Arc<dyn Transformation>>,
    resolved: DashMap<String, Arc<CollectionDescription>>,
    resolve_paths: Vec<PathBuf>,
    allow_private: bool,
    executors: TaskExecutorRegistry,
}

impl Default for EngineHost {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl EngineHost {
    pub fn new(resolve_paths: Vec<PathBuf>) -> Self {
        Self {
            registered: DashMap::new(),
            factories: DashMap::new(),
            resolved: DashMap::new(),
            resolve_paths,
            allow_private: false,
            executors: TaskExecutorRegistry::default(),
        }
    }

    pub fn with_allow_private(mut self, allow_private: bool) -> Self {
        self.allow_private = allow_private;
        self
    }

    pub fn resolve_paths(&self) -> &[PathBuf] {
        &self.resolve_paths
    }

    pub fn allow_private(&self) -> bool {
        self.allow_private
    }

    /// Make a collection resolvable without a manifest on disk. Registered
    /// collections shadow same-named manifests on the resolve paths.
    pub fn register_collection(&self, manifest: CollectionManifest) -> Result<(), AppError> {
        validate_collection_name(&manifest.name)?;
        tracing::debug!(collection = %manifest.name, "registered collection");
        self.registered.insert(manifest.name.clone(), manifest);
        // Any cached description may extend the new collection.
        self.resolved.clear();
        Ok(())
    }

    pub fn register_factory<T: Transformation>(&self, key: impl Into<String>, factory: T) {
        self.register_factory_arc(key, Arc::new(factory));
    }

    pub fn register_factory_arc(&self, key: impl Into<String>, factory: Arc<dyn Transformation>) {
        self.factories.insert(key.into(), factory);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<CollectionDescription>, AppError> {
        let mut chain = Vec::new();
        self.resolve_chain(name, &mut chain)
    }

    fn resolve_chain(
        &self,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<Arc<CollectionDescription>, AppError> {
        if let Some(cached) = self.resolved.get(name) {
            return Ok(cached.value().clone());
        }
        validate_collection_name(name)?;
        if chain.iter().any(|seen| seen == name) {
            let mut err = AppError::new(
                ErrorCategory::ResolutionError,
                format!("collection '{}' extends itself", name),
            )
            .with_code("RES-EXTENDS-001");
            err.add_context("chain", &format!("{} -> {}", chain.join(" -> "), name));
            return Err(err);
        }

        let (manifest, source) = self.load_manifest(name)?;
        chain.push(name.to_string());
        let mut parents = Vec::with_capacity(manifest.extends.len());
        for parent in &manifest.extends {
            parents.push(self.resolve_chain(parent, chain)?);
        }
        chain.pop();

        let description = Arc::new(CollectionDescription {
            name: name.to_string(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            source,
            parents,
            manifest,
        });
        tracing::debug!(collection = %name, source = ?description.source, "resolved collection");
        self.resolved.insert(name.to_string(), description.clone());
        Ok(description)
    }

    fn load_manifest(
        &self,
        name: &str,
    ) -> Result<(CollectionManifest, CollectionSource), AppError> {
        if let Some(manifest) = self.registered.get(name) {
            return Ok((manifest.value().clone(), CollectionSource::Registered));
        }
        for root in &self.resolve_paths {
            for file in MANIFEST_FILES {
                let candidate = root.join(name).join(file);
                if !candidate.is_file() {
                    continue;
                }
                let mut manifest = read_manifest(&candidate)?;
                if manifest.name.is_empty() {
                    manifest.name = name.to_string();
                }
                return Ok((manifest, CollectionSource::File(candidate)));
            }
        }
        let mut err = AppError::new(
            ErrorCategory::ResolutionError,
            format!("unknown collection '{}'", name),
        )
        .with_code("RES-COLLECTION-001");
        if !self.resolve_paths.is_empty() {
            let searched: Vec<String> = self
                .resolve_paths
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            err.add_context("resolve_paths", &searched.join(", "));
        }
        Err(err)
    }

    pub fn create_transformation(
        &self,
        collection: &Arc<CollectionDescription>,
        name: &str,
    ) -> Result<Arc<TransformationDescription>, AppError> {
        let (owner, key, manifest) = collection.find(name).ok_or_else(|| {
            AppError::new(
                ErrorCategory::ResolutionError,
                format!(
                    "collection '{}' has no transformation named '{}'",
                    collection.name, name
                ),
            )
            .with_code("RES-TRANSFORM-001")
        })?;
        if manifest.private && !self.allow_private {
            return Err(AppError::new(
                ErrorCategory::ResolutionError,
                format!("transformation '{}:{}' is private", owner.name, key),
            )
            .with_code("RES-PRIVATE-001"));
        }

        let factory_key = manifest
            .factory
            .clone()
            .unwrap_or_else(|| format!("{}:{}", owner.name, key));
        let factory = self
            .factories
            .get(&factory_key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ResolutionError,
                    format!(
                        "no factory registered as '{}' for transformation '{}:{}'",
                        factory_key, owner.name, key
                    ),
                )
                .with_code("RES-FACTORY-001")
            })?;

        Ok(Arc::new(TransformationDescription {
            collection: collection.clone(),
            defined_in: owner.name.clone(),
            name: key.to_string(),
            description: manifest.description.clone(),
            schema: manifest.schema.clone(),
            hidden: manifest.hidden,
            private: manifest.private,
            factory,
        }))
    }

    pub fn create_options_object(
        &self,
        description: &TransformationDescription,
        raw: Value,
    ) -> Result<ValidatedOptions, AppError> {
        description.schema.validate(raw).map_err(|mut err| {
            err.add_context("transformation", &description.label());
            err
        })
    }

    pub fn list_transformations(&self, collection: &str) -> Result<Vec<String>, AppError> {
        Ok(self.resolve(collection)?.visible_transformations())
    }

    /// Registered collections plus every manifest directory found on the
    /// resolve paths, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .registered
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for root in &self.resolve_paths {
            discover_collections(root, &mut names);
        }
        names.into_iter().collect()
    }

    /// Replaces any executor already registered for the same kind.
    pub fn register_task_executor(&self, executor: Arc<dyn TaskExecutor>) {
        self.executors.register(executor);
    }

    pub fn task_executors(&self) -> &TaskExecutorRegistry {
        &self.executors
    }
}

fn read_manifest(path: &Path) -> Result<CollectionManifest, AppError> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        AppError::from(err).with_context(format!("reading {}", path.display()))
    })?;
    let parsed = if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
        serde_json::from_str(&text).map_err(|err| err.to_string())
    } else {
        serde_yaml::from_str(&text).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| {
        AppError::new(
            ErrorCategory::SerializationError,
            format!("invalid collection manifest {}: {}", path.display(), message),
        )
        .with_code("RES-MANIFEST-001")
    })
}

fn has_manifest(dir: &Path) -> bool {
    MANIFEST_FILES.iter().any(|file| dir.join(file).is_file())
}

fn discover_collections(root: &Path, names: &mut BTreeSet<String>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('@') {
            let Ok(scoped) = std::fs::read_dir(&path) else {
                continue;
            };
            for inner in scoped.flatten() {
                if has_manifest(&inner.path()) {
                    names.insert(format!("{}/{}", name, inner.file_name().to_string_lossy()));
                }
            }
        } else if has_manifest(&path) {
            names.insert(name);
        }
    }
}
