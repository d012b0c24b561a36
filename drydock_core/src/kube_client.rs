//! Resolves which kubeconfig (or in-cluster credentials) to build the
//! cluster client from, and builds it.
//!
//! Precedence: explicit CLI flag, then `KUBECONFIG`, then base64-encoded
//! `KUBECONFIG_BASE64` (materialized to a temp file), then in-cluster
//! service-account credentials, then `~/.kube/config`. Tilde expansion
//! applies to any non-empty path result.

use std::path::PathBuf;

use base64::Engine;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;

use crate::error::Result;

#[derive(Debug, Default)]
pub struct ClientSource {
    pub in_cluster: bool,
    pub kubeconfig_path: Option<PathBuf>,
    pub temporary_dir: Option<tempfile_dir::TempDirHandle>,
}

impl ClientSource {
    pub async fn build(&self) -> Result<Client> {
        if self.in_cluster {
            return Ok(Client::try_default().await?);
        }
        let path = self.kubeconfig_path.clone().unwrap_or_default();
        let kubeconfig = Kubeconfig::read_from(&path).map_err(|e| crate::error::Error::Other(e.to_string()))?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| crate::error::Error::Other(e.to_string()))?;
        Ok(Client::try_from(config)?)
    }
}

/// Resolve credentials per the precedence chain above. `opt_kubeconfig` is
/// the value of an explicit `--kubeconfig` flag, empty if unset.
pub fn resolve(opt_kubeconfig: &str) -> Result<ClientSource> {
    let mut source = ClientSource::default();

    if !opt_kubeconfig.is_empty() {
        source.kubeconfig_path = Some(expand_tilde(opt_kubeconfig)?);
        return Ok(source);
    }

    if let Ok(env_kubeconfig) = std::env::var("KUBECONFIG") {
        let env_kubeconfig = env_kubeconfig.trim();
        if !env_kubeconfig.is_empty() {
            source.kubeconfig_path = Some(expand_tilde(env_kubeconfig)?);
            return Ok(source);
        }
    }

    if let Ok(env_b64) = std::env::var("KUBECONFIG_BASE64") {
        let env_b64 = env_b64.trim();
        if !env_b64.is_empty() {
            let buf = base64::engine::general_purpose::STANDARD.decode(env_b64)?;
            let dir = tempfile::Builder::new().prefix("drydock-kubeconfig-").tempdir().map_err(|e| crate::error::Error::io("<tmp>", e))?;
            let path = dir.path().join("kubeconfig");
            std::fs::write(&path, &buf).map_err(|e| crate::error::Error::io(&path, e))?;
            source.kubeconfig_path = Some(path);
            source.temporary_dir = Some(tempfile_dir::TempDirHandle(dir));
            return Ok(source);
        }
    }

    if in_cluster_env_present() {
        source.in_cluster = true;
        return Ok(source);
    }

    let home = dirs::home_dir().ok_or_else(|| crate::error::Error::Other("cannot resolve home directory".to_string()))?;
    source.kubeconfig_path = Some(home.join(".kube").join("config"));
    Ok(source)
}

fn in_cluster_env_present() -> bool {
    std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
        && std::path::Path::new("/var/run/secrets/kubernetes.io/serviceaccount/token").exists()
}

fn expand_tilde(path: &str) -> Result<PathBuf> {
    let prefix = format!("~{}", std::path::MAIN_SEPARATOR);
    if let Some(rest) = path.strip_prefix(&prefix) {
        let home = dirs::home_dir().ok_or_else(|| crate::error::Error::Other("cannot resolve home directory".to_string()))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

/// A small wrapper so `ClientSource` can derive `Debug`/`Default` while
/// holding a `tempfile::TempDir` (which cleans itself up on drop, matching
/// the design's "clean up the temporary directory on any exit path").
pub mod tempfile_dir {
    #[derive(Debug)]
    pub struct TempDirHandle(pub tempfile::TempDir);

    impl Default for TempDirHandle {
        fn default() -> Self {
            TempDirHandle(tempfile::tempdir().expect("create temp dir"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_joins_home() {
        let home = dirs::home_dir().unwrap();
        let expanded = expand_tilde(&format!("~{}foo{}bar", std::path::MAIN_SEPARATOR, std::path::MAIN_SEPARATOR)).unwrap();
        assert_eq!(expanded, home.join("foo").join("bar"));
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths_alone() {
        assert_eq!(expand_tilde("/etc/kube/config").unwrap(), PathBuf::from("/etc/kube/config"));
    }
}
