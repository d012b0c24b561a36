use clap::Parser;
use drydock_cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    drydock_cli::init_tracing(cli.verbose);

    if let Err(e) = drydock_cli::run(cli).await {
        tracing::error!("exited with error: {e}");
        std::process::exit(1);
    }
}
