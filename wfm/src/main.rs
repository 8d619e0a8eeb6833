mod grpc;
mod http;
mod server;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use wfm_core::{
    bootstrap::{config::log_config, init_database_cluster, load_config},
    logging,
};

use server::WfmServer;

#[derive(Parser, Debug)]
#[command(name = "wfm")]
#[command(about = "Workforce management backend", long_about = None)]
struct Args {
    /// Configuration file (YAML or TOML)
    #[arg(long, short, env = "WFM_CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("WFM server starting...");
    log_config(&config);

    // 3. Initialize the database cluster
    let cluster = init_database_cluster(&config.database).await?;

    // 4. Serve until a shutdown signal arrives
    WfmServer::new(config, cluster).start().await
}
