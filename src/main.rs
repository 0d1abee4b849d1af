use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use solana_pool_sniper::config::Config;
use solana_pool_sniper::orchestrator::Orchestrator;

#[tokio::main]
async fn main() {
    // Invalid configuration aborts startup with the full error listing.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("failed to initialize logging: {e:#}");
        std::process::exit(1);
    }

    let orchestrator = match Orchestrator::new(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("startup failed: {e:#}");
            std::process::exit(1);
        }
    };

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("signal received, shutting down");
        stop.stop();
    });

    if let Err(e) = orchestrator.run().await {
        error!("pipeline terminated with error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.log_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
    });

    let file_layer = match &config.log_file {
        None => None,
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!("cannot install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
