use clap::Parser;
use routemock::MockServerBuilder;
use std::{error::Error, path::PathBuf};
use tracing_subscriber::EnvFilter;

/// Holds command line parameters provided by the user.
#[derive(Parser, Debug)]
#[command(name = "routemock", version, about = "HTTP mock server with runtime managed routes")]
struct ExecutionParameters {
    #[arg(short, long, env = "ROUTEMOCK_PORT", default_value = "5050")]
    pub port: u16,
    #[arg(short, long, env = "ROUTEMOCK_EXPOSE")]
    pub expose: bool,
    #[arg(short, long, env = "ROUTEMOCK_MOCK_FILES_DIR")]
    pub mock_files_dir: Option<PathBuf>,
    #[arg(long, env = "ROUTEMOCK_DISABLE_ACCESS_LOG")]
    pub disable_access_log: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("routemock=info")),
        )
        .init();

    let params = ExecutionParameters::parse();

    tracing::info!(
        "Starting {} server V{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("{:#?}", params);

    let server = MockServerBuilder::new()
        .port(params.port)
        .expose(params.expose)
        .print_access_log(!params.disable_access_log)
        .static_mock_dir_option(params.mock_files_dir)
        .build()?;

    server
        .start_with_signals(None, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
