use clap::Parser;
use rekap::{app, settings::Settings};
use tracing_subscriber::EnvFilter;

/// Main entry point for the dashboard web server
///
/// Reads settings from flags or `REKAP_*` variables, loads (or creates) the
/// config and credentials documents, and serves the UI until killed.
/// A malformed document aborts startup.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rekap=info,tower_http=info")),
        )
        .init();

    let settings = Settings::parse();
    app::run(settings).await
}
