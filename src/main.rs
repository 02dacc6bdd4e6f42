use clap::Parser;
use geth_monitor::config::{CliArgs, Config};
use geth_monitor::monitor::connect_and_run;
use geth_monitor::monitor::handler::ConsolePrinter;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage (wss:// endpoints).
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load .env if present
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let config = Config::resolve(&args)?;

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("geth-monitor v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Without a signal handler the monitor can only stop on a feed error.
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    match connect_and_run(&config, ConsolePrinter::stdout(), shutdown).await {
        Ok(stats) => {
            info!(
                blocks = stats.blocks,
                pending_txs = stats.pending_txs,
                pending_feed = stats.pending_feed_active,
                "monitor exited cleanly"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "monitor terminated");
            std::process::exit(1);
        }
    }
}
