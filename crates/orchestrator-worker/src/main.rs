use anyhow::Result;
use clap::Parser;
use orchestrator_worker::cli::{self, Args};
use orchestrator_worker::Services;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = cli::load_config(&args)?;
    info!(
        llm = %config.llm.url,
        store = ?config.store_path,
        repo_root = ?config.repo_root,
        "Orchestrator worker starting"
    );

    let services = Services::build(&config).await?;
    let output = cli::execute(args.command, &config, &services).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
