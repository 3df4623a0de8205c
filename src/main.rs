use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use credit_gateway::Config;
use credit_gateway::api::{ApiServer, ApiState};

/// Credit Gateway - Prepaid credits in front of a paid weather API
#[derive(Parser)]
#[command(name = "credit-gateway", version, about)]
struct Cli {
    /// Port to listen on (overrides config and environment)
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind (overrides config and environment)
    #[arg(long)]
    host: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, env = "CREDIT_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,credit_gateway=info",
        1 => "info,credit_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        offers = config.offers.len(),
        placeholder_weather = config.weather.api_key.is_none(),
        "starting credit gateway"
    );
    tracing::debug!(?config, "loaded configuration");

    let server_config = config.server.clone();
    let state = ApiState::from_config(config)?;
    ApiServer::new(state, &server_config).run().await?;

    tracing::info!("credit gateway stopped");
    Ok(())
}
