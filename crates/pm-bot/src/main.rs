//! Trade Loop entry point.

use clap::Parser;
use tracing::info;

use pm_bot::{AppResult, Application, PmConfig};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PM_CONFIG env var).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("no crypto provider installed yet");

    let args = Args::parse();
    pm_telemetry::init_logging();

    info!("starting bot v{}", env!("CARGO_PKG_VERSION"));

    let config_path = PmConfig::resolve_path(args.config);
    info!(config_path = %config_path, "loading configuration");

    let config = PmConfig::from_file(&config_path)?;
    info!(live = config.runtime.live, "configuration loaded");

    let app = Application::new(config)?;
    app.run().await
}
