//! Geyser gRPC streaming source.
//!
//! Subscribes to account updates filtered by the enabled DEX program
//! owners and to non-vote, non-failed transactions mentioning those
//! programs. Each account update routes by owner to the matching
//! decoder; each transaction update is flattened into the shared decoder
//! shape. A short capability probe (connect + subscribe inside a
//! deadline) lets startup rule the mode out for the whole run.

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use yellowstone_grpc_client::{GeyserGrpcClient, Interceptor};
use yellowstone_grpc_proto::prelude::subscribe_update::UpdateOneof;
use yellowstone_grpc_proto::prelude::*;

use crate::constants::GRPC_PROBE_TIMEOUT_MS;
use crate::pool_ingestor::IngestorCore;
use crate::types::{DecodedInstruction, ParsedTransaction};

pub struct GrpcStream {
    endpoint: String,
    x_token: Option<String>,
    programs: Vec<Pubkey>,
}

impl GrpcStream {
    pub fn new(endpoint: String, x_token: Option<String>, programs: Vec<Pubkey>) -> Self {
        let endpoint = if endpoint.starts_with("http") {
            endpoint
        } else {
            format!("https://{endpoint}")
        };
        Self {
            endpoint,
            x_token,
            programs,
        }
    }

    fn build_request(&self) -> SubscribeRequest {
        let owners: Vec<String> = self.programs.iter().map(|p| p.to_string()).collect();

        let mut accounts = HashMap::new();
        accounts.insert(
            "dex_accounts".to_string(),
            SubscribeRequestFilterAccounts {
                account: vec![],
                owner: owners.clone(),
                ..Default::default()
            },
        );

        let mut transactions = HashMap::new();
        transactions.insert(
            "dex_transactions".to_string(),
            SubscribeRequestFilterTransactions {
                vote: Some(false),
                failed: Some(false),
                account_include: owners,
                ..Default::default()
            },
        );

        SubscribeRequest {
            accounts,
            transactions,
            commitment: Some(CommitmentLevel::Processed as i32),
            ..Default::default()
        }
    }

    /// Short connect-subscribe-drain attempt. Failure here marks gRPC
    /// unavailable for the lifetime of the run.
    pub async fn probe(&self) -> Result<()> {
        let deadline = Duration::from_millis(GRPC_PROBE_TIMEOUT_MS);
        timeout(deadline, async {
            let mut client = self.connect().await?;
            let (mut subscribe_tx, mut stream) = client.subscribe().await?;
            subscribe_tx.send(self.build_request()).await?;
            // Drain whatever the server pushes immediately; the subscribe
            // round-trip itself is the capability signal.
            tokio::select! {
                update = stream.next() => {
                    if let Some(Err(status)) = update {
                        return Err(anyhow!("probe stream error: {status}"));
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            }
            Ok(())
        })
        .await
        .map_err(|_| anyhow!("gRPC probe timed out after {deadline:?}"))?
    }

    /// Stream until shutdown (Ok) or stream end/error (Err, so the
    /// coordinator can fall back to WebSocket).
    pub async fn run(&self, core: Arc<IngestorCore>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("🔌 Connecting to gRPC stream: {}", self.endpoint);
        let mut client = self.connect().await?;
        let (mut subscribe_tx, mut stream) = client.subscribe().await?;
        subscribe_tx.send(self.build_request()).await?;
        info!("✅ gRPC subscription active for {} programs", self.programs.len());
        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("gRPC stream stopping on shutdown");
                        return Ok(());
                    }
                }
                update = stream.next() => {
                    match update {
                        Some(Ok(message)) => self.route_update(&core, message).await,
                        Some(Err(status)) => {
                            return Err(anyhow!("gRPC stream error: {status}"));
                        }
                        None => {
                            return Err(anyhow!("gRPC stream closed by server"));
                        }
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<GeyserGrpcClient<impl Interceptor>> {
        let mut builder = GeyserGrpcClient::build_from_shared(self.endpoint.clone())?;
        builder = builder.x_token(self.x_token.clone())?;
        Ok(builder.connect().await?)
    }

    async fn route_update(&self, core: &Arc<IngestorCore>, message: SubscribeUpdate) {
        match message.update_oneof {
            Some(UpdateOneof::Account(update)) => {
                let Some(info) = update.account else { return };
                let (Ok(address), Ok(owner)) = (
                    Pubkey::try_from(info.pubkey.as_slice()),
                    Pubkey::try_from(info.owner.as_slice()),
                ) else {
                    return;
                };
                core.process_account_update(&owner, &address, &info.data, update.slot)
                    .await;
            }
            Some(UpdateOneof::Transaction(update)) => {
                let Some(info) = update.transaction else { return };
                let signature = bs58::encode(&info.signature).into_string();
                if !core.claim_signature(&signature) {
                    return;
                }
                match convert_transaction(&signature, update.slot, info) {
                    Some(parsed) => core.process_transaction(&parsed).await,
                    None => debug!("unparseable transaction update {signature}"),
                }
            }
            Some(UpdateOneof::Ping(_)) => debug!("gRPC ping"),
            Some(_) => {}
            None => warn!("empty gRPC update"),
        }
    }
}

/// Flatten a proto transaction update into the decoder shape. Loaded
/// address-table keys are appended after the static keys (writable then
/// readonly), matching the runtime's account ordering.
fn convert_transaction(
    signature: &str,
    slot: u64,
    info: SubscribeUpdateTransactionInfo,
) -> Option<ParsedTransaction> {
    let tx = info.transaction?;
    let message = tx.message?;

    let mut account_keys: Vec<Pubkey> = Vec::with_capacity(message.account_keys.len());
    for key in &message.account_keys {
        account_keys.push(Pubkey::try_from(key.as_slice()).ok()?);
    }
    if let Some(meta) = info.meta {
        for key in meta
            .loaded_writable_addresses
            .iter()
            .chain(meta.loaded_readonly_addresses.iter())
        {
            account_keys.push(Pubkey::try_from(key.as_slice()).ok()?);
        }
    }

    let mut instructions = Vec::with_capacity(message.instructions.len());
    for ix in &message.instructions {
        let program_id = *account_keys.get(ix.program_id_index as usize)?;
        let accounts = ix
            .accounts
            .iter()
            .map(|i| account_keys.get(*i as usize).copied())
            .collect::<Option<Vec<_>>>()?;
        instructions.push(DecodedInstruction {
            program_id,
            accounts,
            data: ix.data.clone(),
        });
    }

    Some(ParsedTransaction {
        signature: signature.to_string(),
        slot,
        account_keys,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PUMPFUN_CREATE_DISCRIMINATOR, PUMPFUN_PROGRAM};

    fn proto_tx(
        account_keys: Vec<Vec<u8>>,
        instructions: Vec<CompiledInstruction>,
    ) -> SubscribeUpdateTransactionInfo {
        SubscribeUpdateTransactionInfo {
            signature: vec![1u8; 64],
            is_vote: false,
            transaction: Some(Transaction {
                signatures: vec![vec![1u8; 64]],
                message: Some(Message {
                    header: None,
                    account_keys,
                    recent_blockhash: vec![0u8; 32],
                    instructions,
                    versioned: false,
                    address_table_lookups: vec![],
                    ..Default::default()
                }),
                ..Default::default()
            }),
            meta: None,
            index: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_convert_transaction_resolves_accounts() {
        let keys: Vec<Pubkey> = (0..4).map(|_| Pubkey::new_unique()).collect();
        let mut raw_keys: Vec<Vec<u8>> = keys.iter().map(|k| k.to_bytes().to_vec()).collect();
        raw_keys.push(PUMPFUN_PROGRAM.to_bytes().to_vec());

        let info = proto_tx(
            raw_keys,
            vec![CompiledInstruction {
                program_id_index: 4,
                accounts: vec![0, 1, 2, 3],
                data: PUMPFUN_CREATE_DISCRIMINATOR.to_vec(),
            }],
        );

        let parsed = convert_transaction("sig", 12, info).unwrap();
        assert_eq!(parsed.slot, 12);
        assert_eq!(parsed.instructions.len(), 1);
        assert_eq!(parsed.instructions[0].program_id, *PUMPFUN_PROGRAM);
        assert_eq!(parsed.instructions[0].accounts, keys);
    }

    #[test]
    fn test_convert_rejects_out_of_range_index() {
        let keys: Vec<Vec<u8>> = (0..2)
            .map(|_| Pubkey::new_unique().to_bytes().to_vec())
            .collect();
        let info = proto_tx(
            keys,
            vec![CompiledInstruction {
                program_id_index: 9,
                accounts: vec![],
                data: vec![],
            }],
        );
        assert!(convert_transaction("sig", 1, info).is_none());
    }

    #[test]
    fn test_request_includes_owner_and_tx_filters() {
        let stream = GrpcStream::new(
            "grpc.example.org".to_string(),
            Some("token".to_string()),
            vec![*PUMPFUN_PROGRAM],
        );
        let request = stream.build_request();
        let accounts = &request.accounts["dex_accounts"];
        assert_eq!(accounts.owner, vec![PUMPFUN_PROGRAM.to_string()]);
        let txs = &request.transactions["dex_transactions"];
        assert_eq!(txs.vote, Some(false));
        assert_eq!(txs.failed, Some(false));
        assert_eq!(txs.account_include, vec![PUMPFUN_PROGRAM.to_string()]);
        assert_eq!(request.commitment, Some(CommitmentLevel::Processed as i32));
    }
}
