//! Suffix classification and manifest loading.
//!
//! A file's class is decided purely by suffix, longest/most-specific first:
//! helm-values files are skipped by the resource loader (they're consumed by
//! the release collector instead), YAML/JSON/Jsonnet files are parsed into
//! raw manifests, everything else is ignored.

use std::path::Path;

use serde::Deserialize as _;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::jsonnet;

const SUFFIX_HELM_YAML: &str = ".helm.yaml";
const SUFFIX_HELM_YML: &str = ".helm.yml";
const SUFFIX_HELM_JSONNET: &str = ".helm.jsonnet";
const SUFFIX_YAML: &str = ".yaml";
const SUFFIX_YML: &str = ".yml";
const SUFFIX_JSON: &str = ".json";
const SUFFIX_JSONNET: &str = ".jsonnet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    HelmValuesYaml,
    HelmValuesJsonnet,
    Yaml,
    Json,
    Jsonnet,
    Other,
}

/// Classify a file purely by suffix. Longer, more specific suffixes
/// (`.helm.yaml`) are checked before their shorter generic counterparts
/// (`.yaml`) so a helm-values file is never mistaken for a plain manifest.
pub fn classify(name: &str) -> FileClass {
    if name.ends_with(SUFFIX_HELM_YAML) || name.ends_with(SUFFIX_HELM_YML) {
        FileClass::HelmValuesYaml
    } else if name.ends_with(SUFFIX_HELM_JSONNET) {
        FileClass::HelmValuesJsonnet
    } else if name.ends_with(SUFFIX_YAML) || name.ends_with(SUFFIX_YML) {
        FileClass::Yaml
    } else if name.ends_with(SUFFIX_JSON) {
        FileClass::Json
    } else if name.ends_with(SUFFIX_JSONNET) {
        FileClass::Jsonnet
    } else {
        FileClass::Other
    }
}

pub fn is_helm_values(name: &str) -> bool {
    matches!(classify(name), FileClass::HelmValuesYaml | FileClass::HelmValuesJsonnet)
}

/// Read one file and return its raw manifests, already list-expanded and
/// re-encoded to canonical JSON. Helm-values files and anything unrecognized
/// yield an empty vec.
pub fn collect_resource_file(path: impl AsRef<Path>, namespace: &str) -> Result<Vec<Value>> {
    let path = path.as_ref();
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let mut raws = match classify(&name) {
        FileClass::HelmValuesYaml | FileClass::HelmValuesJsonnet => return Ok(Vec::new()),
        FileClass::Yaml => collect_yaml_file(path)?,
        FileClass::Json => collect_json_file(path)?,
        FileClass::Jsonnet => collect_jsonnet_file(path, namespace)?,
        FileClass::Other => return Ok(Vec::new()),
    };

    expand_lists(&mut raws)?;
    Ok(raws)
}

fn collect_yaml_file(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let mut out = Vec::new();
    for doc in serde_yaml::Deserializer::from_slice(&raw) {
        let doc = serde_yaml::Value::deserialize(doc)?;
        if matches!(doc, serde_yaml::Value::Null) {
            continue;
        }
        if !matches!(doc, serde_yaml::Value::Mapping(_)) {
            return Err(Error::InvalidContent(yaml_sample(&doc)));
        }
        let value: Value = serde_json::to_value(&doc)?;
        out.push(value);
    }
    Ok(out)
}

/// A short, human-readable stand-in for a non-mapping YAML document, for the
/// same truncated-sample error convention `collect_json_content` uses.
fn yaml_sample(doc: &serde_yaml::Value) -> String {
    let text = match doc {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Sequence(_) => "<sequence>".to_string(),
        _ => "<scalar>".to_string(),
    };
    if text.chars().count() > 10 {
        let head: String = text.chars().take(7).collect();
        format!("{head}...")
    } else {
        text
    }
}

fn collect_json_file(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    collect_json_content(&raw)
}

fn collect_jsonnet_file(path: &Path, namespace: &str) -> Result<Vec<Value>> {
    let raw = jsonnet::evaluate_file(path, namespace)?;
    collect_json_content(raw.as_bytes())
}

fn collect_json_content(raw: &[u8]) -> Result<Vec<Value>> {
    let trimmed = trim_ascii_whitespace(raw);
    if trimmed.len() < 2 {
        return Ok(Vec::new());
    }
    match trimmed[0] {
        b'[' => {
            let docs: Vec<Value> = serde_json::from_slice(trimmed)?;
            Ok(docs)
        }
        b'{' => {
            let doc: Value = serde_json::from_slice(trimmed)?;
            Ok(vec![doc])
        }
        _ => {
            let text = String::from_utf8_lossy(trimmed);
            let sample = if text.chars().count() > 10 {
                let head: String = text.chars().take(7).collect();
                format!("{head}...")
            } else {
                text.into_owned()
            };
            Err(Error::InvalidContent(sample))
        }
    }
}

fn trim_ascii_whitespace(buf: &[u8]) -> &[u8] {
    let start = buf.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(buf.len());
    let end = buf.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    &buf[start..end]
}

/// Flatten `{apiVersion:"v1", kind:"List", items:[...]}` wrappers in place,
/// recursively — a `List` may itself contain `List` items.
pub fn expand_lists(raws: &mut Vec<Value>) -> Result<()> {
    let mut i = 0;
    while i < raws.len() {
        if let Some(items) = list_items(&raws[i]) {
            let items = items.to_vec();
            raws.splice(i..i + 1, items);
            continue; // re-examine the replacement region starting at i
        }
        canonicalize(&mut raws[i])?;
        i += 1;
    }
    Ok(())
}

fn list_items(v: &Value) -> Option<&[Value]> {
    let obj = v.as_object()?;
    let api_version = obj.get("apiVersion")?.as_str()?;
    let kind = obj.get("kind")?.as_str()?;
    if api_version != "v1" || kind != "List" {
        return None;
    }
    obj.get("items")?.as_array().map(|v| v.as_slice())
}

/// Re-encode through `serde_json::Value` to strip any residual formatting
/// differences. `serde_json::Map` is a `BTreeMap` by default (the
/// `preserve_order` feature is off), which pins key ordering so the
/// resulting bytes are deterministic run to run.
fn canonicalize(v: &mut Value) -> Result<()> {
    let bytes = serde_json::to_vec(v)?;
    *v = serde_json::from_slice(&bytes)?;
    Ok(())
}

/// Canonical JSON bytes for a manifest, used as the fingerprint input.
pub fn canonical_bytes(v: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(v)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_prefers_longer_suffix() {
        assert_eq!(classify("foo.helm.yaml"), FileClass::HelmValuesYaml);
        assert_eq!(classify("foo.helm.yml"), FileClass::HelmValuesYaml);
        assert_eq!(classify("foo.helm.jsonnet"), FileClass::HelmValuesJsonnet);
        assert_eq!(classify("foo.yaml"), FileClass::Yaml);
        assert_eq!(classify("foo.json"), FileClass::Json);
        assert_eq!(classify("foo.jsonnet"), FileClass::Jsonnet);
        assert_eq!(classify("foo.txt"), FileClass::Other);
    }

    #[test]
    fn json_content_dispatches_by_first_byte() {
        assert_eq!(collect_json_content(b"{\"a\":1}").unwrap(), vec![json!({"a": 1})]);
        assert_eq!(
            collect_json_content(b"[{\"a\":1},{\"b\":2}]").unwrap(),
            vec![json!({"a":1}), json!({"b":2})]
        );
        assert!(collect_json_content(b"not json").is_err());
    }

    #[test]
    fn list_flattening_is_recursive() {
        let mut raws = vec![json!({
            "apiVersion": "v1",
            "kind": "List",
            "items": [{
                "apiVersion": "v1",
                "kind": "List",
                "items": [{"kind": "ConfigMap", "metadata": {"name": "c"}}]
            }]
        })];
        expand_lists(&mut raws).unwrap();
        assert_eq!(raws, vec![json!({"kind": "ConfigMap", "metadata": {"name": "c"}})]);
    }

    #[test]
    fn yaml_multidoc_yields_one_manifest_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.yaml");
        std::fs::write(&path, "kind: A\n---\nkind: B\n").unwrap();
        let raws = collect_resource_file(&path, "default").unwrap();
        assert_eq!(raws.len(), 2);
    }

    #[test]
    fn yaml_document_that_is_not_a_mapping_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.yaml");
        std::fs::write(&path, "- a\n- b\n").unwrap();
        assert!(collect_resource_file(&path, "default").is_err());
    }

    #[test]
    fn helm_values_files_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my-release.my-chart.helm.yaml");
        std::fs::write(&path, "image:\n  tag: v1\n").unwrap();
        let raws = collect_resource_file(&path, "default").unwrap();
        assert!(raws.is_empty());
    }

    #[test]
    fn list_wrapper_in_a_file_expands_to_one_resource() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.yaml");
        std::fs::write(
            &path,
            "kind: List\napiVersion: v1\nitems:\n- kind: ConfigMap\n  metadata:\n    name: c\n",
        )
        .unwrap();
        let raws = collect_resource_file(&path, "default").unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0]["kind"], "ConfigMap");
    }
}
