//! The synchronizer: for one namespace, loads resources/releases and
//! applies whatever the [`Kv`] says has changed, in order: in-namespace
//! resources, then cross-namespace resources, then helm releases.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::jsonnet;
use crate::kv::Kv;
use crate::logio::LogWriter;
use crate::manifest::FileClass;
use crate::plan::{self, LoadOptions};
use crate::tmp;
use crate::types::{Chart, Release, Resource};

pub struct SyncOptions<'a> {
    pub root: &'a Path,
    pub namespace: &'a str,
    pub charts: &'a BTreeMap<String, Chart>,
    pub kubeconfig: &'a str,
    pub dry_run: bool,
}

/// Loads `opts.namespace`, then applies in-namespace resources,
/// cross-namespace resources and releases, in that order.
pub async fn sync_namespace(db: Arc<Kv>, opts: SyncOptions<'_>) -> Result<()> {
    let title = format!("[{}]", opts.namespace);
    tracing::info!("{title} scanning");

    let result = plan::load(opts.root, opts.namespace, LoadOptions { charts: opts.charts })?;

    sync_resources(
        &db,
        SyncResourcesOptions {
            resources: &result.resources,
            title: &title,
            namespace: opts.namespace,
            kubeconfig: opts.kubeconfig,
            dry_run: opts.dry_run,
        },
    )
    .await?;

    sync_resources(
        &db,
        SyncResourcesOptions {
            resources: &result.resources_ext,
            title: &title,
            namespace: "",
            kubeconfig: opts.kubeconfig,
            dry_run: opts.dry_run,
        },
    )
    .await?;

    for release in &result.releases {
        let release_title = format!("{title} [Helm:{}]", release.name);
        sync_release(
            &db,
            SyncReleaseOptions {
                release,
                title: &release_title,
                namespace: opts.namespace,
                kubeconfig: opts.kubeconfig,
                dry_run: opts.dry_run,
            },
        )
        .await?;
    }

    Ok(())
}

struct SyncResourcesOptions<'a> {
    resources: &'a [Resource],
    title: &'a str,
    /// Empty means "don't pass -n" (used for the cross-namespace batch,
    /// where each object already carries its own namespace).
    namespace: &'a str,
    kubeconfig: &'a str,
    dry_run: bool,
}

async fn sync_resources(db: &Kv, opts: SyncResourcesOptions<'_>) -> Result<()> {
    let mut changed = Vec::new();
    for res in opts.resources {
        if db.get(&res.id).await.as_deref() == Some(res.checksum.as_str()) {
            continue;
        }
        changed.push(res);
    }

    if changed.is_empty() {
        return Ok(());
    }

    let payload = build_list_payload(changed.iter().map(|r| r.raw.as_slice()))?;

    let mut args: Vec<String> = Vec::new();
    if !opts.kubeconfig.is_empty() {
        args.push("--kubeconfig".to_string());
        args.push(opts.kubeconfig.to_string());
    }
    args.push("apply".to_string());
    args.push("-f".to_string());
    args.push("-".to_string());
    if !opts.namespace.is_empty() {
        args.push("-n".to_string());
        args.push(opts.namespace.to_string());
    }
    if opts.dry_run {
        args.push("--dry-run=server".to_string());
    }

    run_piped("kubectl", &args, Some(&payload), opts.title).await?;

    if !opts.dry_run {
        for res in &changed {
            db.put(res.id.clone(), res.checksum.clone()).await;
        }
    }

    if opts.dry_run {
        tracing::info!("{} resources synced (dry run)", opts.title);
    } else {
        tracing::info!("{} resources synced", opts.title);
    }

    Ok(())
}

struct SyncReleaseOptions<'a> {
    release: &'a Release,
    title: &'a str,
    namespace: &'a str,
    kubeconfig: &'a str,
    dry_run: bool,
}

async fn sync_release(db: &Kv, opts: SyncReleaseOptions<'_>) -> Result<()> {
    if db.get(&opts.release.id).await.as_deref() == Some(opts.release.checksum.as_str()) {
        return Ok(());
    }

    let values_file = resolve_values_file(&opts.release.values_file, opts.namespace)?;

    let mut args: Vec<String> = Vec::new();
    if !opts.kubeconfig.is_empty() {
        args.push("--kubeconfig".to_string());
        args.push(opts.kubeconfig.to_string());
    }
    args.push("upgrade".to_string());
    args.push("--install".to_string());
    args.push("--namespace".to_string());
    args.push(opts.namespace.to_string());
    args.push(opts.release.name.clone());
    args.push(opts.release.chart.path.to_string_lossy().into_owned());
    args.push("-f".to_string());
    args.push(values_file.to_string_lossy().into_owned());
    if opts.dry_run {
        args.push("--dry-run".to_string());
    }

    run_piped("helm", &args, None, opts.title).await?;

    if !opts.dry_run {
        db.put(opts.release.id.clone(), opts.release.checksum.clone()).await;
    }

    if opts.dry_run {
        tracing::info!("{} release synced (dry run)", opts.title);
    } else {
        tracing::info!("{} release synced", opts.title);
    }

    Ok(())
}

/// Wraps a batch of canonical-JSON manifests in a Kubernetes `v1/List` and
/// serializes it, matching the shape `kubectl apply -f -` expects on stdin.
fn build_list_payload<'a>(raws: impl Iterator<Item = &'a [u8]>) -> Result<Vec<u8>> {
    let items: Vec<Value> = raws.map(serde_json::from_slice).collect::<std::result::Result<_, _>>()?;
    let list = serde_json::json!({ "apiVersion": "v1", "kind": "List", "items": items });
    Ok(serde_json::to_vec(&list)?)
}

/// Jsonnet values files get rendered to a temp file first; plain yaml/json
/// values files are used as-is.
fn resolve_values_file(path: &Path, namespace: &str) -> Result<std::path::PathBuf> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if matches!(crate::manifest::classify(name), FileClass::HelmValuesJsonnet) {
        let rendered = jsonnet::evaluate_file(path, namespace)?;
        let out = tmp::write_file(rendered.as_bytes(), ".yaml").map_err(|e| Error::io(path, e))?;
        Ok(out)
    } else {
        Ok(path.to_path_buf())
    }
}

async fn run_piped(program: &str, args: &[String], stdin: Option<&[u8]>, title: &str) -> Result<()> {
    use std::process::Stdio;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    let mut child = cmd.spawn().map_err(|e| Error::io(program, e))?;

    let mut stdin_pipe = child.stdin.take();

    let mut stdout_writer = LogWriter::new(title.to_string());
    let mut stderr_writer = LogWriter::new(title.to_string());

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Write stdin concurrently with draining stdout/stderr: a payload larger
    // than the pipe buffer would otherwise deadlock against a child that's
    // blocked writing output before it has read all of its input.
    let stdin_task = async {
        if let (Some(buf), Some(mut sin)) = (stdin, stdin_pipe.take()) {
            let _ = sin.write_all(buf).await;
        }
    };

    let stdout_task = async {
        if let Some(out) = stdout.as_mut() {
            let mut buf = [0u8; 4096];
            loop {
                let n = out.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                use std::io::Write;
                let _ = stdout_writer.write_all(&buf[..n]);
            }
        }
    };
    let stderr_task = async {
        if let Some(err) = stderr.as_mut() {
            let mut buf = [0u8; 4096];
            loop {
                let n = err.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                use std::io::Write;
                let _ = stderr_writer.write_all(&buf[..n]);
            }
        }
    };
    tokio::join!(stdin_task, stdout_task, stderr_task);

    let status = child.wait().await.map_err(|e| Error::io(program, e))?;
    if !status.success() {
        return Err(Error::ExternalCommandFailed(format!("{program} {}", args.join(" "))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_values_file_passes_through_non_jsonnet() {
        let path = std::path::PathBuf::from("web.api.helm.yaml");
        let resolved = resolve_values_file(&path, "default").unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn build_list_payload_wraps_items_in_a_v1_list() {
        let a = serde_json::to_vec(&serde_json::json!({"kind": "ConfigMap", "metadata": {"name": "a"}})).unwrap();
        let b = serde_json::to_vec(&serde_json::json!({"kind": "ConfigMap", "metadata": {"name": "b"}})).unwrap();
        let payload = build_list_payload([a.as_slice(), b.as_slice()].into_iter()).unwrap();
        let parsed: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed["apiVersion"], "v1");
        assert_eq!(parsed["kind"], "List");
        assert_eq!(parsed["items"].as_array().unwrap().len(), 2);
    }
}
