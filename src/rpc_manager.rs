//! Multi-provider RPC pool with health tracking, capacity-aware routing
//! and automatic failover.
//!
//! Every chain read and send in the sniper goes through this manager.
//! Account reads are cache-first and coalesced; each outbound call takes
//! a token from the selected provider's bucket; a provider that throws is
//! skipped for the rest of the failover round and marked unhealthy after
//! enough consecutive failures, then cooled down before re-entry.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use solana_account_decoder::parse_token::UiTokenAmount;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{
    RpcSendTransactionConfig, RpcSimulateTransactionConfig, RpcTransactionConfig,
};
use solana_rpc_client_api::response::{
    RpcConfirmedTransactionStatusWithSignature, RpcSimulateTransactionResult,
    RpcTokenAccountBalance,
};
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::{EncodedTransaction, UiMessage, UiTransactionEncoding};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::account_cache::TtlCache;
use crate::config::ProviderConfig;
use crate::constants::{
    ACCOUNT_CACHE_CAPACITY, MAX_ACCOUNTS_PER_BATCH, PROVIDER_COOLDOWN,
    PROVIDER_FAILURE_THRESHOLD, RPC_REQUEST_TIMEOUT,
};
use crate::rate_limiter::{Priority, TokenBucket};
use crate::request_coalescer::RequestCoalescer;
use crate::types::{DecodedInstruction, ParsedTransaction};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderStats {
    pub requests: u64,
    pub failures: u64,
}

#[derive(Debug)]
struct HealthState {
    healthy: bool,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
}

pub struct Provider {
    pub name: String,
    pub url: String,
    pub priority: u8,
    client: RpcClient,
    bucket: TokenBucket,
    health: Mutex<HealthState>,
    stats: Mutex<ProviderStats>,
}

impl Provider {
    fn new(config: &ProviderConfig, commitment: CommitmentConfig) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            priority: config.priority,
            client: RpcClient::new_with_timeout_and_commitment(
                config.url.clone(),
                RPC_REQUEST_TIMEOUT,
                commitment,
            ),
            bucket: TokenBucket::new(config.rps_limit, 2),
            health: Mutex::new(HealthState {
                healthy: true,
                consecutive_failures: 0,
                last_failure: None,
                last_success: None,
            }),
            stats: Mutex::new(ProviderStats::default()),
        }
    }

    /// Healthy, or unhealthy with an elapsed cooldown (which re-admits
    /// the provider with a cleared failure count).
    fn is_eligible(&self) -> bool {
        let mut health = self.health.lock();
        if health.healthy {
            return true;
        }
        let cooled = health
            .last_failure
            .map(|at| at.elapsed() >= PROVIDER_COOLDOWN)
            .unwrap_or(true);
        if cooled {
            health.healthy = true;
            health.consecutive_failures = 0;
            return true;
        }
        false
    }

    fn record_success(&self) {
        let mut health = self.health.lock();
        health.healthy = true;
        health.consecutive_failures = 0;
        health.last_success = Some(Instant::now());
        self.stats.lock().requests += 1;
    }

    fn record_failure(&self) {
        let mut health = self.health.lock();
        health.consecutive_failures += 1;
        health.last_failure = Some(Instant::now());
        if health.consecutive_failures >= PROVIDER_FAILURE_THRESHOLD {
            health.healthy = false;
        }
        let mut stats = self.stats.lock();
        stats.requests += 1;
        stats.failures += 1;
    }

    pub fn available_tokens(&self) -> f64 {
        self.bucket.available_tokens()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.health.lock().consecutive_failures
    }

    pub fn is_healthy(&self) -> bool {
        self.health.lock().healthy
    }

    pub fn stats(&self) -> ProviderStats {
        *self.stats.lock()
    }
}

/// Snapshot row for the periodic status log
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub name: String,
    pub priority: u8,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub available_tokens: f64,
    pub requests: u64,
    pub failures: u64,
}

pub struct RpcProviderManager {
    providers: Vec<Arc<Provider>>,
    account_cache: TtlCache<Pubkey, Option<Account>>,
    account_coalescer: RequestCoalescer<Option<Account>>,
    commitment: CommitmentConfig,
}

impl RpcProviderManager {
    pub fn new(configs: &[ProviderConfig], cache_ttl_ms: u64) -> Result<Self> {
        if configs.is_empty() {
            return Err(anyhow!("no RPC providers configured"));
        }
        let commitment = CommitmentConfig::confirmed();
        let providers = configs
            .iter()
            .map(|c| Arc::new(Provider::new(c, commitment)))
            .collect::<Vec<_>>();
        debug!(
            "RPC provider pool: {}",
            providers
                .iter()
                .map(|p| format!("{}(p{})", p.name, p.priority))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self {
            providers,
            account_cache: TtlCache::new(
                ACCOUNT_CACHE_CAPACITY,
                tokio::time::Duration::from_millis(cache_ttl_ms),
            ),
            account_coalescer: RequestCoalescer::new(),
            commitment,
        })
    }

    /// Pick the next provider for a failover round: eligible, not yet
    /// tried, lowest priority number; ties broken by bucket headroom.
    fn select_provider(&self, tried: &[bool]) -> Option<usize> {
        let mut best: Option<(usize, u8, f64)> = None;
        for (idx, provider) in self.providers.iter().enumerate() {
            if tried[idx] || !provider.is_eligible() {
                continue;
            }
            let tokens = provider.available_tokens();
            match best {
                None => best = Some((idx, provider.priority, tokens)),
                Some((_, best_priority, best_tokens)) => {
                    if provider.priority < best_priority
                        || (provider.priority == best_priority && tokens > best_tokens)
                    {
                        best = Some((idx, provider.priority, tokens));
                    }
                }
            }
        }
        best.map(|(idx, _, _)| idx)
    }

    /// Run one operation with per-provider admission and failover. Each
    /// provider is tried at most once per round.
    async fn with_failover<T, F, Fut>(&self, op: &str, priority: Priority, f: F) -> Result<T>
    where
        F: Fn(Arc<Provider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tried = vec![false; self.providers.len()];
        let mut last_error: Option<anyhow::Error> = None;

        while let Some(idx) = self.select_provider(&tried) {
            tried[idx] = true;
            let provider = self.providers[idx].clone();
            provider.bucket.acquire(priority).await;

            match f(provider.clone()).await {
                Ok(value) => {
                    provider.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    provider.record_failure();
                    warn!(
                        "⚠️  {op} failed on {} (consecutive: {}): {e}",
                        provider.name,
                        provider.consecutive_failures()
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => anyhow!("all providers failed for {op}: {e}"),
            None => anyhow!("all providers failed for {op}: none eligible"),
        })
    }

    // ------------------------------------------------------------------
    // Account reads (cached + coalesced)
    // ------------------------------------------------------------------

    pub async fn get_account_info(&self, address: &Pubkey) -> Result<Option<Account>> {
        if let Some(cached) = self.account_cache.get(address) {
            return Ok(cached);
        }

        let address = *address;
        let key = format!("acct:{address}");
        let result = self
            .account_coalescer
            .dedupe(&key, || async move {
                self.fetch_account(address).await.map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| anyhow!(e))?;

        self.account_cache.insert(address, result.clone());
        Ok(result)
    }

    async fn fetch_account(&self, address: Pubkey) -> Result<Option<Account>> {
        let commitment = self.commitment;
        self.with_failover("getAccountInfo", Priority::Normal, move |p| async move {
            let response = p
                .client
                .get_account_with_commitment(&address, commitment)
                .await?;
            Ok(response.value)
        })
        .await
    }

    /// Same-length batched read; cache hits are served locally and only
    /// the misses go upstream, in chunks of at most 100 addresses.
    pub async fn get_multiple_account_infos(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>> {
        let mut results: Vec<Option<Option<Account>>> = vec![None; addresses.len()];
        let mut missing: Vec<(usize, Pubkey)> = Vec::new();

        for (idx, address) in addresses.iter().enumerate() {
            match self.account_cache.get(address) {
                Some(hit) => results[idx] = Some(hit),
                None => missing.push((idx, *address)),
            }
        }

        for chunk in missing.chunks(MAX_ACCOUNTS_PER_BATCH) {
            let keys: Vec<Pubkey> = chunk.iter().map(|(_, k)| *k).collect();
            let fetch_keys = keys.clone();
            let fetched = self
                .with_failover("getMultipleAccounts", Priority::Normal, move |p| {
                    let keys = fetch_keys.clone();
                    async move {
                        let response = p
                            .client
                            .get_multiple_accounts_with_commitment(&keys, p.client.commitment())
                            .await?;
                        Ok(response.value)
                    }
                })
                .await?;

            for ((idx, key), account) in chunk.iter().zip(fetched.into_iter()) {
                self.account_cache.insert(*key, account.clone());
                results[*idx] = Some(account);
            }
        }

        Ok(results.into_iter().map(|r| r.unwrap_or(None)).collect())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Fetch and flatten a confirmed transaction into the decoder shape.
    /// A transaction the cluster does not know yet comes back as `None`.
    pub async fn get_parsed_transaction(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<ParsedTransaction>> {
        let signature = *signature;
        self.with_failover("getTransaction", Priority::Normal, move |p| async move {
            let config = RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::Json),
                commitment: Some(commitment),
                max_supported_transaction_version: Some(0),
            };
            match p.client.get_transaction_with_config(&signature, config).await {
                Ok(tx) => Ok(decode_encoded_transaction(
                    &signature.to_string(),
                    tx.slot,
                    tx.transaction.transaction,
                )),
                // Missing transactions are a caller-level miss, not a
                // provider fault; don't burn the failover round on them.
                Err(e) if is_not_found(&e.to_string()) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Sends jump the rate-limit queues so exit paths are never starved.
    pub async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
        max_retries: usize,
    ) -> Result<Signature> {
        let transaction = transaction.clone();
        self.with_failover("sendTransaction", Priority::High, move |p| {
            let transaction = transaction.clone();
            async move {
                let config = RpcSendTransactionConfig {
                    skip_preflight,
                    max_retries: Some(max_retries),
                    ..RpcSendTransactionConfig::default()
                };
                Ok(p.client
                    .send_transaction_with_config(&transaction, config)
                    .await?)
            }
        })
        .await
    }

    pub async fn confirm_transaction(&self, signature: &Signature) -> Result<bool> {
        let signature = *signature;
        self.with_failover("confirmTransaction", Priority::High, move |p| async move {
            Ok(p.client.confirm_transaction(&signature).await?)
        })
        .await
    }

    pub async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<RpcSimulateTransactionResult> {
        let transaction = transaction.clone();
        self.with_failover("simulateTransaction", Priority::Normal, move |p| {
            let transaction = transaction.clone();
            async move {
                let config = RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: true,
                    commitment: Some(CommitmentConfig::processed()),
                    ..RpcSimulateTransactionConfig::default()
                };
                let response = p
                    .client
                    .simulate_transaction_with_config(&transaction, config)
                    .await?;
                Ok(response.value)
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Misc reads used by polling, risk analysis and positions
    // ------------------------------------------------------------------

    pub async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
        until: Option<Signature>,
    ) -> Result<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        let address = *address;
        let commitment = self.commitment;
        self.with_failover("getSignaturesForAddress", Priority::Low, move |p| async move {
            let config = GetConfirmedSignaturesForAddress2Config {
                before: None,
                until,
                limit: Some(limit),
                commitment: Some(commitment),
            };
            Ok(p.client
                .get_signatures_for_address_with_config(&address, config)
                .await?)
        })
        .await
    }

    pub async fn get_token_largest_accounts(
        &self,
        mint: &Pubkey,
    ) -> Result<Vec<RpcTokenAccountBalance>> {
        let mint = *mint;
        self.with_failover("getTokenLargestAccounts", Priority::Normal, move |p| async move {
            Ok(p.client.get_token_largest_accounts(&mint).await?)
        })
        .await
    }

    pub async fn get_token_supply(&self, mint: &Pubkey) -> Result<UiTokenAmount> {
        let mint = *mint;
        self.with_failover("getTokenSupply", Priority::Normal, move |p| async move {
            Ok(p.client.get_token_supply(&mint).await?)
        })
        .await
    }

    pub async fn get_token_account_balance(&self, account: &Pubkey) -> Result<UiTokenAmount> {
        let account = *account;
        self.with_failover("getTokenAccountBalance", Priority::Normal, move |p| async move {
            Ok(p.client.get_token_account_balance(&account).await?)
        })
        .await
    }

    pub async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        let address = *address;
        self.with_failover("getBalance", Priority::Normal, move |p| async move {
            Ok(p.client.get_balance(&address).await?)
        })
        .await
    }

    pub async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.with_failover("getLatestBlockhash", Priority::High, move |p| async move {
            Ok(p.client.get_latest_blockhash().await?)
        })
        .await
    }

    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|p| {
                let stats = p.stats();
                ProviderStatus {
                    name: p.name.clone(),
                    priority: p.priority,
                    healthy: p.is_healthy(),
                    consecutive_failures: p.consecutive_failures(),
                    available_tokens: p.available_tokens(),
                    requests: stats.requests,
                    failures: stats.failures,
                }
            })
            .collect()
    }

    pub fn cache_stats(&self) -> crate::account_cache::CacheStats {
        self.account_cache.stats()
    }

    #[cfg(test)]
    fn provider(&self, idx: usize) -> &Arc<Provider> {
        &self.providers[idx]
    }
}

fn is_not_found(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("invalid param: could not find")
}

/// Flatten a JSON-encoded transaction into decoder input. Anything that
/// does not resolve cleanly (unknown encoding, bad base58, out-of-range
/// account index) yields `None`; not every fetched transaction is a pool.
pub fn decode_encoded_transaction(
    signature: &str,
    slot: u64,
    transaction: EncodedTransaction,
) -> Option<ParsedTransaction> {
    let ui_tx = match transaction {
        EncodedTransaction::Json(tx) => tx,
        _ => return None,
    };
    let raw = match ui_tx.message {
        UiMessage::Raw(raw) => raw,
        UiMessage::Parsed(_) => return None,
    };

    let mut account_keys = Vec::with_capacity(raw.account_keys.len());
    for key in &raw.account_keys {
        account_keys.push(Pubkey::from_str(key).ok()?);
    }

    let mut instructions = Vec::with_capacity(raw.instructions.len());
    for ix in &raw.instructions {
        let program_id = *account_keys.get(ix.program_id_index as usize)?;
        let accounts = ix
            .accounts
            .iter()
            .map(|i| account_keys.get(*i as usize).copied())
            .collect::<Option<Vec<_>>>()?;
        let data = bs58::decode(&ix.data).into_vec().ok()?;
        instructions.push(DecodedInstruction {
            program_id,
            accounts,
            data,
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

    fn test_configs() -> Vec<ProviderConfig> {
        vec![
            ProviderConfig {
                name: "a".to_string(),
                url: "http://localhost:18899".to_string(),
                rps_limit: 5,
                priority: 1,
            },
            ProviderConfig {
                name: "b".to_string(),
                url: "http://localhost:28899".to_string(),
                rps_limit: 3,
                priority: 1,
            },
            ProviderConfig {
                name: "c".to_string(),
                url: "http://localhost:38899".to_string(),
                rps_limit: 5,
                priority: 3,
            },
        ]
    }

    #[test]
    fn test_empty_provider_set_is_fatal() {
        assert!(RpcProviderManager::new(&[], 2_000).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_prefers_top_priority_with_headroom() {
        let manager = RpcProviderManager::new(&test_configs(), 2_000).unwrap();
        let tried = vec![false; 3];

        // Both p1 providers are full; either is acceptable, never the p3.
        let first = manager.select_provider(&tried).unwrap();
        assert!(first == 0 || first == 1);

        // Drain provider a's bucket below b's level.
        for _ in 0..2 {
            manager.provider(0).bucket.acquire(Priority::Normal).await;
        }
        assert_eq!(manager.select_provider(&tried), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_mark_unhealthy_and_cooldown_readmits() {
        let manager = RpcProviderManager::new(&test_configs(), 2_000).unwrap();
        let tried = vec![false; 3];

        for _ in 0..PROVIDER_FAILURE_THRESHOLD {
            manager.provider(0).record_failure();
        }
        assert!(!manager.provider(0).is_healthy());
        assert_eq!(manager.select_provider(&tried), Some(1));

        // After the cooldown the provider is eligible again with a
        // cleared failure count.
        tokio::time::advance(PROVIDER_COOLDOWN + tokio::time::Duration::from_secs(1)).await;
        let selected = manager.select_provider(&tried);
        assert!(selected == Some(0) || selected == Some(1));
        assert!(manager.provider(0).is_eligible());
        assert_eq!(manager.provider(0).consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_tries_each_provider_once() {
        let manager = RpcProviderManager::new(&test_configs(), 2_000).unwrap();
        let mut tried = vec![false; 3];
        let mut seen = Vec::new();
        while let Some(idx) = manager.select_provider(&tried) {
            tried[idx] = true;
            seen.push(idx);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_exhausts_to_terminal_error() {
        let manager = RpcProviderManager::new(&test_configs(), 2_000).unwrap();
        let result: Result<u8> = manager
            .with_failover("op", Priority::Normal, |p| async move {
                Err(anyhow!("refused by {}", p.name))
            })
            .await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("all providers failed"));
        for idx in 0..3 {
            assert_eq!(manager.provider(idx).consecutive_failures(), 1);
        }
    }

    #[test]
    fn test_decode_rejects_non_json_encoding() {
        let decoded = decode_encoded_transaction(
            "sig",
            1,
            EncodedTransaction::LegacyBinary("AQID".to_string()),
        );
        assert!(decoded.is_none());
    }
}
