use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nxget::runner::{self, RunOutcome};
use nxget::{Cli, SyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A .env file may carry NXGET_USERNAME / NXGET_PASSWORD
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = match SyncConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            std::process::exit(e.exit_code());
        }
    };

    match runner::run(&config).await {
        Ok(RunOutcome::Listed { manifest, total }) => {
            info!("✅ Listed {} files into {}", total, manifest.display());
        }
        Ok(RunOutcome::Synced(report)) => {
            info!(
                "✅ Done: {} downloaded, {} already up to date, {} outside the date window",
                report.fetched, report.up_to_date, report.outside_window
            );
        }
        Err(e) => {
            error!("❌ {}", e);
            std::process::exit(e.exit_code());
        }
    }

    Ok(())
}
