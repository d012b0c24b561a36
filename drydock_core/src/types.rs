//! The data model: charts, releases and resources, plus their stable IDs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A chart bundle under `_helm/<name>`, identified by its directory fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub name: String,
    pub path: PathBuf,
    pub checksum: String,
}

/// A named deployment of a chart with a specific values file, scoped to one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub name: String,
    pub chart: Chart,
    pub values_file: PathBuf,
    pub checksum: String,
}

pub fn release_id(namespace: &str, name: &str) -> String {
    format!("{namespace}::Helm::{name}")
}

/// The handful of fields the core reads out of an otherwise-opaque manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub kind: String,
    #[serde(default, rename = "apiVersion")]
    pub api_version: String,
}

/// A single manifest document, with its raw canonical-JSON bytes kept
/// opaque alongside the handful of fields the core actually inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub namespace: String,
    pub object: ObjectRef,
    pub raw: Vec<u8>,
    pub checksum: String,
    pub path: PathBuf,
}

/// `metadata.namespace` wins over the owning directory's namespace.
pub fn resource_id(owning_namespace: &str, object: &ObjectRef) -> String {
    let ns = if object.metadata.namespace.is_empty() {
        owning_namespace
    } else {
        object.metadata.namespace.as_str()
    };
    format!("{ns}::{}/{}/{}", object.api_version, object.kind, object.metadata.name)
}

/// Everything a planner/loader pass over one namespace produces.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub resources: Vec<Resource>,
    pub resources_ext: Vec<Resource>,
    pub releases: Vec<Release>,
}
