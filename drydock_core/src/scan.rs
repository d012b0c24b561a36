//! Enumerates the repository root: chart bundles under `_helm`, and the
//! namespace directories alongside them.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::fingerprint;
use crate::types::Chart;

const SUBDIR_HELM: &str = "_helm";

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub charts: BTreeMap<String, Chart>,
    pub namespaces: Vec<String>,
}

pub fn scan(root: impl AsRef<Path>) -> Result<ScanResult> {
    let root = root.as_ref();
    Ok(ScanResult {
        charts: scan_charts(&root.join(SUBDIR_HELM))?,
        namespaces: read_dir_names(root)?,
    })
}

fn scan_charts(dir: &Path) -> Result<BTreeMap<String, Chart>> {
    let mut charts = BTreeMap::new();

    let names = match read_dir_names(dir) {
        Ok(n) => n,
        Err(Error::Io0(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(charts),
        Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            return Ok(charts)
        }
        Err(e) => return Err(e),
    };

    for name in names {
        let path = dir.join(&name);
        require_file(&path.join("Chart.yaml"))?;
        require_file(&path.join("values.yaml"))?;
        let checksum = fingerprint::of_dir(&path)?;
        charts.insert(name.clone(), Chart { name, path, checksum });
    }

    Ok(charts)
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::io(path, std::io::Error::new(std::io::ErrorKind::NotFound, "required file missing")))
    }
}

/// Direct child directories whose names don't start with `.` or `_`.
/// Order is whatever the filesystem returns it in — callers must not depend
/// on it.
fn read_dir_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        if !entry.file_type().map_err(|e| Error::io(dir, e))?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chart(root: &Path, name: &str) {
        let dir = root.join("_helm").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Chart.yaml"), "name: x\n").unwrap();
        std::fs::write(dir.join("values.yaml"), "a: 1\n").unwrap();
    }

    #[test]
    fn missing_helm_dir_yields_empty_chart_table() {
        let root = tempfile::tempdir().unwrap();
        let result = scan(root.path()).unwrap();
        assert!(result.charts.is_empty());
    }

    #[test]
    fn scan_collects_charts_and_namespaces() {
        let root = tempfile::tempdir().unwrap();
        make_chart(root.path(), "api");
        std::fs::create_dir_all(root.path().join("default")).unwrap();
        std::fs::create_dir_all(root.path().join(".git")).unwrap();
        std::fs::create_dir_all(root.path().join("_helm").join(".hidden")).unwrap();

        let result = scan(root.path()).unwrap();
        assert!(result.charts.contains_key("api"));
        assert_eq!(result.namespaces, vec!["default".to_string()]);
    }

    #[test]
    fn chart_missing_values_yaml_is_a_hard_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("_helm").join("broken");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Chart.yaml"), "name: x\n").unwrap();
        assert!(scan(root.path()).is_err());
    }
}
