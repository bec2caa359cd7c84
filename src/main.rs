use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use mirror_proxy::config::load_config;
use mirror_proxy::observability::{logging, metrics};
use mirror_proxy::{HttpServer, Shutdown};

/// Transparent mirroring reverse proxy.
///
/// Mirror settings come from TARGET_DOMAIN, TARGET_ENDPOINT,
/// SECONDARY_DOMAINS and PORT; a TOML file may supply the rest.
#[derive(Parser, Debug)]
#[command(name = "mirror-proxy", version)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(short, long, env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mirror-proxy: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        target_domain = %config.mirror.target_domain,
        target_endpoint = ?config.mirror.target_endpoint,
        secondary_domains = ?config.mirror.secondary_domains,
        max_retries = config.retries.max_retries,
        request_deadline_ms = config.request_deadline().as_millis() as u64,
        "Configuration loaded"
    );

    if let Some(addr) = config.observability.metrics_address.as_deref() {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %addr, "Failed to parse metrics address"),
        }
    }

    let bind_address = config.listener.bind_address();
    let listener = match TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_address, error = %e, "Failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    let server = match HttpServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build server");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    shutdown.trigger_on_signal();

    if let Err(e) = server.run(listener, server_shutdown).await {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Goodbye!");
    ExitCode::SUCCESS
}
