//! donor-harvest binary: loads `.env` and config, sets up tracing, runs one command.

use clap::Parser;
use donor_harvest::cli::{self, Cli};
use donor_harvest::config::AppConfig;
use donor_harvest::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; a missing file is fine.
    let _ = dotenvy::dotenv();

    let args = Cli::parse();
    init_tracing(args.verbose, args.json_logs);

    let cfg = AppConfig::load(args.config.as_deref())?;
    cli::run(args, cfg).await
}
