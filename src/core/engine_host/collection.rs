use super::schema::OptionsSchema;
use crate::core::engine::Transformation;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// On-disk or programmatic description of a collection.
///
/// Read from `collection.json` / `collection.yaml`. `name` may be omitted in a
/// file; the directory name is used instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub extends: Vec<String>,
    #[serde(default)]
    pub transformations: IndexMap<String, TransformationManifest>,
}

impl CollectionManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_transformation(
        mut self,
        name: impl Into<String>,
        manifest: TransformationManifest,
    ) -> Self {
        self.transformations.insert(name.into(), manifest);
        self
    }

    pub fn extending(mut self, parent: impl Into<String>) -> Self {
        self.extends.push(parent.into());
        self
    }

    /// Entry named `name` directly or through an alias.
    pub(crate) fn lookup(&self, name: &str) -> Option<(&str, &TransformationManifest)> {
        if let Some((key, manifest)) = self.transformations.get_key_value(name) {
            return Some((key.as_str(), manifest));
        }
        self.transformations
            .iter()
            .find(|(_, manifest)| manifest.aliases.iter().any(|alias| alias == name))
            .map(|(key, manifest)| (key.as_str(), manifest))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(single) => vec![single],
        OneOrMany::Many(many) => many,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationManifest {
    #[serde(default)]
    pub description: String,
    /// Registered factory implementing this transformation. Defaults to
    /// `<collection>:<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    #[serde(default)]
    pub schema: OptionsSchema,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub private: bool,
}

impl TransformationManifest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_factory(mut self, factory: impl Into<String>) -> Self {
        self.factory = Some(factory.into());
        self
    }

    pub fn with_schema(mut self, schema: OptionsSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionSource {
    Registered,
    File(PathBuf),
}

/// A resolved collection with its `extends` chain already loaded.
#[derive(Debug)]
pub struct CollectionDescription {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub source: CollectionSource,
    pub parents: Vec<Arc<CollectionDescription>>,
    pub(crate) manifest: CollectionManifest,
}

impl CollectionDescription {
    pub fn manifest(&self) -> &CollectionManifest {
        &self.manifest
    }

    /// Depth-first search through this collection and then its parents.
    pub(crate) fn find(
        &self,
        name: &str,
    ) -> Option<(&CollectionDescription, &str, &TransformationManifest)> {
        if let Some((key, manifest)) = self.manifest.lookup(name) {
            return Some((self, key, manifest));
        }
        self.parents.iter().find_map(|parent| parent.find(name))
    }

    /// Public transformation names, own entries first, deduplicated.
    pub fn visible_transformations(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_visible(&mut names);
        names
    }

    fn collect_visible(&self, names: &mut Vec<String>) {
        for (name, manifest) in &self.manifest.transformations {
            if manifest.hidden || manifest.private || names.contains(name) {
                continue;
            }
            names.push(name.clone());
        }
        for parent in &self.parents {
            parent.collect_visible(names);
        }
    }
}

/// A transformation ready to run: where it was found, its schema, and the
/// factory that implements it.
pub struct TransformationDescription {
    pub collection: Arc<CollectionDescription>,
    /// Collection that actually defines the entry; differs from `collection`
    /// when inherited through `extends`.
    pub defined_in: String,
    pub name: String,
    pub description: String,
    pub schema: OptionsSchema,
    pub hidden: bool,
    pub private: bool,
    pub(crate) factory: Arc<dyn Transformation>,
}

impl TransformationDescription {
    pub fn label(&self) -> String {
        format!("{}:{}", self.collection.name, self.name)
    }

    pub fn factory(&self) -> &Arc<dyn Transformation> {
        &self.factory
    }
}

impl fmt::Debug for TransformationDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationDescription")
            .field("collection", &self.collection.name)
            .field("defined_in", &self.defined_in)
            .field("name", &self.name)
            .field("hidden", &self.hidden)
            .field("private", &self.private)
            .finish()
    }
}
