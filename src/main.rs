use clap::Parser;
use std::sync::Arc;
use tracing::error;

use usage_relay::{config::Config, infra::http_client::ReqwestHttp, logging, orchestrator};

#[derive(Parser)]
#[command(name = "usage-relay")]
#[command(about = "Fetch and forward power usage data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Number of days to backfill (0 = only yesterday)
    #[arg(long, default_value_t = 0)]
    backfill_days: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    logging::init_logging();

    let config = Config::from_env();
    let http = Arc::new(ReqwestHttp::new());

    // Failures are logged, not propagated; scheduled runs always exit 0.
    if let Err(e) = orchestrator::run(&config, cli.backfill_days, http).await {
        error!("Error occurred: {}", e);
    }

    Ok(())
}
