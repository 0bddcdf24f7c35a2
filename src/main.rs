use clap::Parser;
use tracing_subscriber::EnvFilter;

use job_dispatcher::config::DispatcherConfig;
use job_dispatcher::shutdown::install_shutdown_handler;
use job_dispatcher::transport;

#[derive(Parser, Debug)]
#[command(name = "job-dispatcher")]
#[command(version)]
#[command(about = "Routes jobs to worker servers to minimize expected wait time")]
struct Args {
    /// Port of the worker farm endpoint on localhost
    #[arg(short = 'p', long, visible_alias = "server-port", alias = "server_port")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DispatcherConfig::from_env(args.port)?;
    tracing::info!(
        endpoint = %config.endpoint(),
        drain = %config.scheduler.drain_strategy,
        capacity = %config.scheduler.capacity_strategy,
        status_interval = ?config.status_interval,
        "Starting job dispatcher"
    );

    let shutdown = install_shutdown_handler()?;
    transport::run(config, shutdown).await?;

    tracing::info!("Job dispatcher stopped");
    Ok(())
}
