//! Last-resort polling source.
//!
//! On a fixed interval, each enabled program is asked for its most
//! recent signatures up to the per-program cursor. New signatures are
//! processed oldest first through the shared bounded fetch gate. This
//! mode cannot fail; an empty round just means nothing launched.

use solana_rpc_client_api::response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::constants::POLLING_SIGNATURE_LIMIT;
use crate::pool_ingestor::IngestorCore;
use crate::types::DexKind;

pub struct PollingMonitor {
    programs: Vec<(DexKind, Pubkey)>,
    poll_interval: Duration,
}

impl PollingMonitor {
    pub fn new(programs: Vec<(DexKind, Pubkey)>, poll_interval: Duration) -> Self {
        Self {
            programs,
            poll_interval,
        }
    }

    pub async fn run(&self, core: Arc<IngestorCore>, shutdown: &mut watch::Receiver<bool>) {
        info!(
            "🔁 Polling monitor: {} programs every {:?}",
            self.programs.len(),
            self.poll_interval
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Per-program cursor: the newest signature seen last round.
        let mut cursors: HashMap<Pubkey, Signature> = HashMap::new();
        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("polling monitor stopped");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.poll_round(&core, &mut cursors).await;
                }
            }
        }
    }

    async fn poll_round(&self, core: &Arc<IngestorCore>, cursors: &mut HashMap<Pubkey, Signature>) {
        for (dex, program) in &self.programs {
            let until = cursors.get(program).copied();
            let signatures = match core
                .rpc
                .get_signatures_for_address(program, POLLING_SIGNATURE_LIMIT, until)
                .await
            {
                Ok(signatures) => signatures,
                Err(e) => {
                    core.note_error();
                    warn!("signature poll failed for {dex}: {e}");
                    continue;
                }
            };
            if signatures.is_empty() {
                continue;
            }

            let queued = process_signature_batch(core, *dex, program, &signatures, cursors);
            for signature in queued {
                core.spawn_transaction_fetch(signature);
            }
        }
    }
}

/// Advance the per-program cursor and claim a non-empty batch for
/// fetching. Responses arrive newest-first; the returned list is
/// oldest-first so events keep chain order. Failed transactions are
/// skipped outright and left unclaimed.
fn process_signature_batch(
    core: &Arc<IngestorCore>,
    dex: DexKind,
    program: &Pubkey,
    signatures: &[RpcConfirmedTransactionStatusWithSignature],
    cursors: &mut HashMap<Pubkey, Signature>,
) -> Vec<Signature> {
    if let Ok(newest) = Signature::from_str(&signatures[0].signature) {
        cursors.insert(*program, newest);
    }

    let mut queued = Vec::new();
    for entry in signatures.iter().rev() {
        core.note_event_received();
        if entry.err.is_some() {
            continue;
        }
        if !core.claim_signature(&entry.signature) {
            continue;
        }
        match Signature::from_str(&entry.signature) {
            Ok(signature) => queued.push(signature),
            Err(e) => warn!("bad signature from poll {}: {e}", entry.signature),
        }
    }
    if !queued.is_empty() {
        debug!("{dex}: queued {} candidate transactions", queued.len());
    }
    queued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::constants::PUMPFUN_PROGRAM;
    use crate::rpc_manager::RpcProviderManager;
    use crate::types::PoolEvent;
    use solana_sdk::transaction::TransactionError;
    use tokio::sync::mpsc;

    fn test_core(tx: mpsc::Sender<PoolEvent>) -> Arc<IngestorCore> {
        let rpc = Arc::new(
            RpcProviderManager::new(
                &[ProviderConfig {
                    name: "test".to_string(),
                    url: "http://localhost:18899".to_string(),
                    rps_limit: 10,
                    priority: 1,
                }],
                2_000,
            )
            .unwrap(),
        );
        IngestorCore::new(rpc, vec![(DexKind::Pumpfun, *PUMPFUN_PROGRAM)], 2, 5_000, tx)
    }

    fn status(signature: &Signature, err: Option<TransactionError>) -> RpcConfirmedTransactionStatusWithSignature {
        RpcConfirmedTransactionStatusWithSignature {
            signature: signature.to_string(),
            slot: 1,
            err,
            memo: None,
            block_time: None,
            confirmation_status: None,
        }
    }

    #[tokio::test]
    async fn test_cursor_advances_and_queue_is_oldest_first() {
        let (tx, _rx) = mpsc::channel(8);
        let core = test_core(tx);
        let program = *PUMPFUN_PROGRAM;
        let mut cursors = HashMap::new();

        // Newest first, as the RPC returns them.
        let newest = Signature::new_unique();
        let middle = Signature::new_unique();
        let oldest = Signature::new_unique();
        let batch = vec![status(&newest, None), status(&middle, None), status(&oldest, None)];

        let queued = process_signature_batch(&core, DexKind::Pumpfun, &program, &batch, &mut cursors);

        assert_eq!(cursors.get(&program), Some(&newest));
        assert_eq!(queued, vec![oldest, middle, newest]);
    }

    #[tokio::test]
    async fn test_failed_signatures_are_skipped_and_unclaimed() {
        let (tx, _rx) = mpsc::channel(8);
        let core = test_core(tx);
        let program = *PUMPFUN_PROGRAM;
        let mut cursors = HashMap::new();

        let good = Signature::new_unique();
        let failed = Signature::new_unique();
        let batch = vec![
            status(&good, None),
            status(&failed, Some(TransactionError::AccountNotFound)),
        ];

        let queued = process_signature_batch(&core, DexKind::Pumpfun, &program, &batch, &mut cursors);
        assert_eq!(queued, vec![good]);
        // The cursor still advances past the failed transaction.
        assert_eq!(cursors.get(&program), Some(&good));
        // Skipping happened before the claim, so a later successful
        // delivery of the same signature would still be processed.
        assert!(core.claim_signature(&failed.to_string()));
    }

    #[tokio::test]
    async fn test_already_claimed_signatures_not_requeued() {
        let (tx, _rx) = mpsc::channel(8);
        let core = test_core(tx);
        let program = *PUMPFUN_PROGRAM;
        let mut cursors = HashMap::new();

        let seen = Signature::new_unique();
        let fresh = Signature::new_unique();
        assert!(core.claim_signature(&seen.to_string()));

        let batch = vec![status(&fresh, None), status(&seen, None)];
        let queued = process_signature_batch(&core, DexKind::Pumpfun, &program, &batch, &mut cursors);

        assert_eq!(queued, vec![fresh]);
        assert_eq!(core.stats().duplicates_skipped, 1);
    }
}
