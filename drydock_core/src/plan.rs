//! For one namespace, produces the set of resources, cross-namespace
//! resources and releases with stable IDs and fingerprints.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::fingerprint;
use crate::manifest;
use crate::types::{self, Chart, LoadResult, ObjectRef, Release, Resource};

pub struct LoadOptions<'a> {
    pub charts: &'a BTreeMap<String, Chart>,
}

/// Walk `<root>/<namespace>` (following links, skipping `.`/`_`-prefixed
/// entries at any depth) and assemble resources, cross-namespace resources
/// and helm releases.
pub fn load(root: impl AsRef<Path>, namespace: &str, opts: LoadOptions<'_>) -> Result<LoadResult> {
    let root = root.as_ref();
    let ns_dir = root.join(namespace);
    let mut result = LoadResult::default();

    let walker = WalkDir::new(&ns_dir).follow_links(true).into_iter().filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        !name.starts_with('.') && !name.starts_with('_')
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            Error::io(e.path().unwrap_or(&ns_dir).to_path_buf(), std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let raws = manifest::collect_resource_file(entry.path(), namespace)?;
        for raw in raws {
            let object: ObjectRef = serde_json::from_value(raw.clone())?;
            let canonical = manifest::canonical_bytes(&raw)?;
            let checksum = fingerprint::of_bytes(&canonical);
            let id = types::resource_id(namespace, &object);

            let resource = Resource {
                id,
                namespace: namespace.to_string(),
                object: object.clone(),
                raw: canonical,
                checksum,
                path: entry.path().to_path_buf(),
            };

            if object.metadata.namespace.is_empty() {
                result.resources.push(resource);
            } else {
                result.resources_ext.push(resource);
            }
        }
    }

    result.releases = collect_releases(root, namespace, opts.charts)?;

    Ok(result)
}

/// Non-recursive scan of `<root>/<namespace>` for `<release>.<chart>.helm.<ext>`
/// files.
fn collect_releases(root: &Path, namespace: &str, charts: &BTreeMap<String, Chart>) -> Result<Vec<Release>> {
    let dir = root.join(namespace);
    let mut releases = Vec::new();

    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(releases),
        Err(e) => return Err(Error::io(&dir, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| Error::io(&dir, e))?;
        if entry.file_type().map_err(|e| Error::io(&dir, e))?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !manifest::is_helm_values(&name) {
            continue;
        }

        let splits: Vec<&str> = name.splitn(3, '.').collect();
        if splits.len() != 3 {
            continue;
        }
        let (release_name, chart_name) = (splits[0], splits[1]);

        let chart = charts
            .get(chart_name)
            .ok_or_else(|| Error::MissingChart(chart_name.to_string()))?
            .clone();

        let values_file = dir.join(&name);
        let values_checksum = fingerprint::of_file(&values_file)?;
        let checksum = fingerprint::of_bytes(format!("{}{}", chart.checksum, values_checksum).as_bytes());

        releases.push(Release {
            id: types::release_id(namespace, release_name),
            name: release_name.to_string(),
            chart,
            values_file,
            checksum,
        });
    }

    Ok(releases)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chart(root: &Path, name: &str) -> Chart {
        let dir = root.join("_helm").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Chart.yaml"), "name: x\n").unwrap();
        std::fs::write(dir.join("values.yaml"), "a: 1\n").unwrap();
        Chart { name: name.to_string(), path: dir.clone(), checksum: fingerprint::of_dir(&dir).unwrap() }
    }

    #[test]
    fn loader_routes_by_namespace_presence() {
        let root = tempfile::tempdir().unwrap();
        let ns_dir = root.path().join("default");
        std::fs::create_dir_all(&ns_dir).unwrap();
        std::fs::write(
            ns_dir.join("x.yaml"),
            "kind: ConfigMap\napiVersion: v1\nmetadata:\n  name: c\n",
        )
        .unwrap();
        std::fs::write(
            ns_dir.join("y.yaml"),
            "kind: ConfigMap\napiVersion: v1\nmetadata:\n  name: d\n  namespace: other\n",
        )
        .unwrap();

        let charts = BTreeMap::new();
        let result = load(root.path(), "default", LoadOptions { charts: &charts }).unwrap();
        assert_eq!(result.resources.len(), 1);
        assert_eq!(result.resources_ext.len(), 1);
        assert_eq!(result.resources[0].id, "default::/ConfigMap/c");
        assert_eq!(result.resources_ext[0].id, "other::/ConfigMap/d");
    }

    #[test]
    fn release_file_resolves_chart_and_checksum() {
        let root = tempfile::tempdir().unwrap();
        let chart = make_chart(root.path(), "api");
        let ns_dir = root.path().join("default");
        std::fs::create_dir_all(&ns_dir).unwrap();
        std::fs::write(ns_dir.join("web.api.helm.yaml"), "replicas: 2\n").unwrap();

        let mut charts = BTreeMap::new();
        charts.insert("api".to_string(), chart);

        let result = load(root.path(), "default", LoadOptions { charts: &charts }).unwrap();
        assert_eq!(result.releases.len(), 1);
        assert_eq!(result.releases[0].id, "default::Helm::web");
        assert_eq!(result.releases[0].name, "web");
    }

    #[test]
    fn release_with_unknown_chart_is_a_hard_error() {
        let root = tempfile::tempdir().unwrap();
        let ns_dir = root.path().join("default");
        std::fs::create_dir_all(&ns_dir).unwrap();
        std::fs::write(ns_dir.join("web.missing.helm.yaml"), "replicas: 2\n").unwrap();

        let charts = BTreeMap::new();
        let err = load(root.path(), "default", LoadOptions { charts: &charts }).unwrap_err();
        assert!(matches!(err, Error::MissingChart(c) if c == "missing"));
    }
}
