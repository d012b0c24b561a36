//! CLI plumbing: argument parsing, logging setup and the top-level run loop
//! that ties scan -> (per-namespace) sync together.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use drydock_core::error::{Error, Result};
use drydock_core::{blob, kube_client, kv::Kv, para, scan, sync};

const DB_NAME: &str = "drydockdb";
const DB_NAMESPACE: &str = "default";
const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Parser)]
#[command(name = "drydock", about = "Declarative apply/helm driver over a scanned manifest tree")]
pub struct Cli {
    /// Render and validate against the server without persisting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Path to a kubeconfig file. Falls back to KUBECONFIG / KUBECONFIG_BASE64 / in-cluster / ~/.kube/config.
    #[arg(long, default_value = "")]
    pub kubeconfig: String,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Root of the scanned manifest tree.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("drydock={level}")));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    // bridges log-facade records from kube/hyper et al. into the same subscriber
    let _ = tracing_log::LogTracer::init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let source = kube_client::resolve(&cli.kubeconfig)?;
    if source.in_cluster {
        tracing::info!("using in-cluster credentials");
    } else {
        tracing::info!("using kubeconfig: {}", source.kubeconfig_path.as_deref().map(|p| p.display().to_string()).unwrap_or_default());
    }
    let kubeconfig_path = if source.in_cluster { String::new() } else { source.kubeconfig_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default() };

    let client = source.build().await?;

    let db = Arc::new(Kv::open(client, blob::Options::new(DB_NAME, DB_NAMESPACE)).await?);

    let scan_result = scan::scan(&cli.root)?;

    let run_result = sync_all(db.clone(), &cli.root, &kubeconfig_path, cli.dry_run, &scan_result).await;

    let save_result = db.save().await;

    drydock_core::tmp::clear_all();

    run_result?;
    save_result
}

async fn sync_all(db: Arc<Kv>, root: &std::path::Path, kubeconfig: &str, dry_run: bool, scan_result: &scan::ScanResult) -> Result<()> {
    let root = root.to_path_buf();
    let kubeconfig = kubeconfig.to_string();
    let charts = scan_result.charts.clone();

    para::run(scan_result.namespaces.clone(), DEFAULT_CONCURRENCY, move |namespace| {
        let db = db.clone();
        let root = root.clone();
        let kubeconfig = kubeconfig.clone();
        let charts = charts.clone();
        async move {
            sync::sync_namespace(
                db,
                sync::SyncOptions { root: &root, namespace: &namespace, charts: &charts, kubeconfig: &kubeconfig, dry_run },
            )
            .await
        }
    })
    .await
    .map_err(|e| Error::Other(e.to_string()))
}
