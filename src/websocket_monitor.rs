//! WebSocket fallback source: per-program `logsSubscribe`.
//!
//! Each enabled program gets its own subscription loop. Log messages go
//! through a cheap DEX-specific "could this be a pool creation" text
//! filter; matches claim the signature and fetch the full transaction
//! through the provider manager under the coordinator's bounded fetch
//! gate. Reconnects re-issue the subscription (the program set is fixed
//! at startup) with exponential backoff.

use anyhow::{anyhow, Result};
use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{WS_BACKOFF_BASE_MS, WS_BACKOFF_MAX_MS};
use crate::pool_ingestor::IngestorCore;
use crate::types::DexKind;

/// Cheap textual pre-filter applied to log lines before paying for a
/// transaction fetch.
pub fn could_be_pool_creation(dex: DexKind, logs: &[String]) -> bool {
    logs.iter().any(|line| match dex {
        DexKind::Pumpfun => {
            line.contains("Instruction: Create") || line.contains("Instruction: Initialize")
        }
        DexKind::Raydium => {
            line.contains("initialize2") || line.contains("Initialize") || line.contains("ray_log")
        }
        DexKind::Orca => line.contains("InitializePool") || line.contains("InitializeConfig"),
    })
}

pub struct WebSocketMonitor {
    ws_url: String,
    programs: Vec<(DexKind, Pubkey)>,
}

impl WebSocketMonitor {
    pub fn new(ws_url: String, programs: Vec<(DexKind, Pubkey)>) -> Self {
        Self { ws_url, programs }
    }

    /// Run until shutdown. An error is returned only when the very first
    /// connection cannot be established, so the coordinator can fall
    /// through to polling; once live, reconnection is handled here.
    pub async fn run(&self, core: Arc<IngestorCore>, shutdown: watch::Receiver<bool>) -> Result<()> {
        // Connectivity check before committing to this mode.
        let probe = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| anyhow!("WebSocket endpoint unreachable: {e}"))?;
        drop(probe);
        info!("🔌 WebSocket monitor starting for {} programs", self.programs.len());

        let mut handles = Vec::new();
        for (dex, program) in &self.programs {
            handles.push(tokio::spawn(program_log_loop(
                self.ws_url.clone(),
                *dex,
                *program,
                core.clone(),
                shutdown.clone(),
            )));
        }

        let mut shutdown = shutdown;
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        for handle in &handles {
            handle.abort();
        }
        info!("WebSocket monitor stopped");
        Ok(())
    }
}

/// One subscription lifecycle per program, re-subscribing on every
/// reconnect with `min(BASE * 2^attempts, MAX)` backoff.
async fn program_log_loop(
    ws_url: String,
    dex: DexKind,
    program: Pubkey,
    core: Arc<IngestorCore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempts: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return;
        }
        match subscribe_and_pump(&ws_url, dex, &program, &core, &mut shutdown).await {
            Ok(()) => return, // shutdown
            Err(e) => {
                core.note_error();
                let backoff = Duration::from_millis(
                    (WS_BACKOFF_BASE_MS.saturating_mul(1u64 << attempts.min(16)))
                        .min(WS_BACKOFF_MAX_MS),
                );
                attempts = attempts.saturating_add(1);
                warn!("{dex} log subscription dropped: {e}; reconnecting in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn subscribe_and_pump(
    ws_url: &str,
    dex: DexKind,
    program: &Pubkey,
    core: &Arc<IngestorCore>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let client = PubsubClient::new(ws_url).await?;
    let (mut stream, _unsubscribe) = client
        .logs_subscribe(
            RpcTransactionLogsFilter::Mentions(vec![program.to_string()]),
            RpcTransactionLogsConfig {
                commitment: Some(CommitmentConfig::confirmed()),
            },
        )
        .await?;
    info!("📡 logsSubscribe active: {dex} ({program})");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
            message = stream.next() => {
                match message {
                    Some(response) => {
                        let value = response.value;
                        if value.err.is_some() {
                            continue;
                        }
                        core.note_event_received();
                        if !could_be_pool_creation(dex, &value.logs) {
                            continue;
                        }
                        debug!("{dex} pool-creation candidate {}", value.signature);
                        if !core.claim_signature(&value.signature) {
                            continue;
                        }
                        match Signature::from_str(&value.signature) {
                            Ok(signature) => core.spawn_transaction_fetch(signature),
                            Err(e) => warn!("bad signature {}: {e}", value.signature),
                        }
                    }
                    None => return Err(anyhow!("log stream ended")),
                }
            }
        }
    }
}
