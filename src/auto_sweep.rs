//! Periodic surplus transfer to the cold wallet.
//!
//! On a timer, any hot-wallet balance above the fee reserve moves to the
//! configured cold-storage address through the provider manager's direct
//! send path. The timer is cancelled by the orchestrator's shutdown.

use anyhow::{anyhow, Result};
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::constants::{
    lamports_to_sol, SWEEP_INTERVAL, SWEEP_MIN_TRANSFER_LAMPORTS, SWEEP_RESERVE_LAMPORTS,
};
use crate::rpc_manager::RpcProviderManager;

/// Lamports worth moving once the fee reserve is kept back; `None` when
/// the surplus is below the minimum transfer size.
fn sweep_surplus(balance: u64) -> Option<u64> {
    let surplus = balance.saturating_sub(SWEEP_RESERVE_LAMPORTS);
    (surplus >= SWEEP_MIN_TRANSFER_LAMPORTS).then_some(surplus)
}

/// Signed transfer of `surplus` lamports to the cold wallet.
fn build_sweep_transaction(
    signer: &Keypair,
    cold_wallet: &Pubkey,
    surplus: u64,
    blockhash: Hash,
) -> Result<VersionedTransaction> {
    let wallet = signer.pubkey();
    let instruction = system_instruction::transfer(&wallet, cold_wallet, surplus);
    let message = Message::new_with_blockhash(&[instruction], Some(&wallet), &blockhash);
    let mut transaction = Transaction::new_unsigned(message);
    transaction
        .try_sign(&[signer], blockhash)
        .map_err(|e| anyhow!("sweep signing failed: {e}"))?;
    Ok(VersionedTransaction::from(transaction))
}

pub struct AutoSweep {
    rpc: Arc<RpcProviderManager>,
    signer: Arc<Keypair>,
    cold_wallet: Pubkey,
    dry_run: bool,
}

impl AutoSweep {
    pub fn new(
        rpc: Arc<RpcProviderManager>,
        signer: Arc<Keypair>,
        cold_wallet: Pubkey,
        dry_run: bool,
    ) -> Self {
        Self {
            rpc,
            signer,
            cold_wallet,
            dry_run,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🧹 auto-sweep active: surplus above {:.3} SOL moves to {}",
            lamports_to_sol(SWEEP_RESERVE_LAMPORTS),
            self.cold_wallet
        );
        let mut ticker = interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if *shutdown.borrow() {
            return;
        }
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("auto-sweep stopped");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!("sweep_failed: {e}");
                    }
                }
            }
        }
    }

    /// One sweep round; `Ok(None)` when there is nothing worth moving.
    pub async fn sweep_once(&self) -> Result<Option<String>> {
        let balance = self.rpc.get_balance(&self.signer.pubkey()).await?;
        self.sweep_with_balance(balance).await
    }

    /// Everything after the balance read, so the branches stay testable
    /// without a cluster.
    async fn sweep_with_balance(&self, balance: u64) -> Result<Option<String>> {
        let Some(surplus) = sweep_surplus(balance) else {
            debug!(
                "sweep skipped: balance {:.4} SOL within reserve",
                lamports_to_sol(balance)
            );
            return Ok(None);
        };

        info!(
            "sweep_started: moving {:.4} SOL to {}",
            lamports_to_sol(surplus),
            self.cold_wallet
        );
        if self.dry_run {
            info!("sweep_completed: dry run, nothing sent");
            return Ok(None);
        }

        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction = build_sweep_transaction(&self.signer, &self.cold_wallet, surplus, blockhash)?;

        let signature = self.rpc.send_transaction(&transaction, false, 3).await?;
        match self.rpc.confirm_transaction(&signature).await {
            Ok(true) => {
                info!("sweep_completed: {signature}");
                Ok(Some(signature.to_string()))
            }
            Ok(false) => Err(anyhow!("sweep transaction {signature} not confirmed")),
            Err(e) => Err(anyhow!("sweep confirmation failed: {e}")),
        }
    }
}
