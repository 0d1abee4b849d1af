//! Swap execution through the block-engine bundle path.
//!
//! A request becomes a signed versioned transaction: compute-budget
//! prefix, DEX swap instructions, then a lamport tip to one of the fixed
//! recipients chosen at random per submission. The transaction is
//! submitted as a single-transaction bundle and its status polled until
//! it lands, fails, drops or times out; failures fall back to a direct
//! RPC send with the tip stripped.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::*;
use crate::pumpfun_decoder::BondingCurveState;
use crate::raydium_decoder::RaydiumPoolState;
use crate::rpc_manager::RpcProviderManager;
use crate::swap_builder;
use crate::tip_strategy::{TipCalculator, TipStrategy};
use crate::types::{DexKind, SwapRequest, SwapResult, SwapSide};

/// Normalized block-engine bundle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStatus {
    Landed,
    Failed,
    Dropped,
    Pending,
    Unknown,
}

/// Map the block-engine's status strings onto the closed set.
pub fn normalize_bundle_status(raw: &str) -> BundleStatus {
    match raw.to_ascii_lowercase().as_str() {
        "landed" | "confirmed" | "finalized" => BundleStatus::Landed,
        "failed" | "rejected" => BundleStatus::Failed,
        "dropped" => BundleStatus::Dropped,
        "pending" | "processing" => BundleStatus::Pending,
        _ => BundleStatus::Unknown,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorMetrics {
    pub bundles_submitted: u64,
    pub bundles_landed: u64,
    pub bundles_failed: u64,
    pub fallback_sends: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

pub struct BundleExecutor {
    rpc: Arc<RpcProviderManager>,
    signer: Arc<Keypair>,
    http: Client,
    block_engine_url: String,
    tip_accounts: Mutex<Vec<Pubkey>>,
    pub tips: TipCalculator,
    dry_run: bool,
    default_slippage_bps: u16,
    /// Compute-unit price attached to every swap (micro-lamports)
    priority_fee: u64,
    metrics: Mutex<ExecutorMetrics>,
}

impl BundleExecutor {
    pub fn new(
        rpc: Arc<RpcProviderManager>,
        signer: Arc<Keypair>,
        block_engine_url: String,
        tips: TipCalculator,
        dry_run: bool,
        default_slippage_bps: u16,
    ) -> Self {
        let tip_accounts = JITO_TIP_ACCOUNTS
            .iter()
            .map(|a| Pubkey::from_str(a).expect("static tip account"))
            .collect::<Vec<_>>();
        Self {
            rpc,
            signer,
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("http client"),
            block_engine_url,
            tip_accounts: Mutex::new(tip_accounts),
            tips,
            dry_run,
            default_slippage_bps,
            priority_fee: 100_000,
            metrics: Mutex::new(ExecutorMetrics::default()),
        }
    }

    pub fn metrics(&self) -> ExecutorMetrics {
        *self.metrics.lock()
    }

    /// Drive a swap to inclusion. Never panics out of the boundary; every
    /// failure mode lands in the `SwapResult`.
    pub async fn execute(&self, request: &SwapRequest) -> SwapResult {
        let start = Instant::now();

        if self.dry_run {
            info!(
                "🧪 DRY RUN {} {} for mint {}",
                request.side, request.amount, request.mint
            );
            return SwapResult {
                success: true,
                tx_hash: Some(format!("dry-run-{}", Uuid::new_v4())),
                price: None,
                amount_out: None,
                error: None,
                latency_ms: start.elapsed().as_millis() as u64,
            };
        }

        let built = match self.build_swap_instructions(request).await {
            Ok(built) => built,
            Err(e) => return SwapResult::failure(format!("build failed: {e}"), ms(start)),
        };
        let (swap_ixs, price, amount_out) = built;

        let tip = self.choose_tip(request);
        let tip_account = self.pick_tip_account();

        // Full instruction list: compute budget, swap, tip transfer.
        let wallet = solana_sdk::signer::Signer::pubkey(&*self.signer);
        let mut instructions =
            swap_builder::compute_budget_instructions(SWAP_COMPUTE_UNITS, self.priority_fee);
        instructions.extend(swap_ixs.iter().cloned());
        instructions.push(swap_builder::tip_instruction(&wallet, &tip_account, tip));

        let blockhash = match self.rpc.get_latest_blockhash().await {
            Ok(hash) => hash,
            Err(e) => return SwapResult::failure(format!("blockhash unavailable: {e}"), ms(start)),
        };
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&wallet),
            &[self.signer.as_ref()],
            blockhash,
        );
        let versioned = VersionedTransaction::from(transaction);
        let tx_signature = versioned.signatures[0].to_string();

        match self.submit_and_await_bundle(&versioned).await {
            Ok(BundleStatus::Landed) => {
                self.tips.record_success(tip);
                self.metrics.lock().bundles_landed += 1;
                info!(
                    "✅ bundle landed for {} {} (tip {} lamports, {}ms)",
                    request.side,
                    request.mint,
                    tip,
                    ms(start)
                );
                SwapResult {
                    success: true,
                    tx_hash: Some(tx_signature),
                    price,
                    amount_out,
                    error: None,
                    latency_ms: ms(start),
                }
            }
            Ok(status) => {
                warn!("bundle did not land ({status:?}); trying direct send");
                self.metrics.lock().bundles_failed += 1;
                self.fallback_direct_send(&swap_ixs, price, amount_out, start).await
            }
            Err(e) => {
                warn!("bundle submission failed: {e}; trying direct send");
                self.metrics.lock().bundles_failed += 1;
                self.fallback_direct_send(&swap_ixs, price, amount_out, start).await
            }
        }
    }

    /// Uniformly random recipient per submission (never keyed to the
    /// signer, so the selection cannot be predicted per wallet).
    fn pick_tip_account(&self) -> Pubkey {
        let accounts = self.tip_accounts.lock();
        accounts[fastrand::usize(..accounts.len())]
    }

    /// Refresh the recipient list from the block-engine `getTipAccounts`
    /// endpoint; the built-in list stays when the call fails or returns
    /// nothing usable.
    pub async fn refresh_tip_accounts(&self) -> Result<usize> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": "getTipAccounts",
            "params": [],
        });
        let response: JsonRpcResponse = self
            .http
            .post(format!("{}/api/v1/bundles", self.block_engine_url))
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(anyhow!("getTipAccounts error {}: {}", error.code, error.message));
        }
        let fetched: Vec<Pubkey> = response
            .result
            .as_ref()
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|a| Pubkey::from_str(a).ok())
                    .collect()
            })
            .unwrap_or_default();
        if fetched.is_empty() {
            return Err(anyhow!("getTipAccounts returned no usable addresses"));
        }
        let count = fetched.len();
        *self.tip_accounts.lock() = fetched;
        debug!("tip account list refreshed ({count} entries)");
        Ok(count)
    }

    fn choose_tip(&self, request: &SwapRequest) -> u64 {
        let strategy = match request.expected_profit_lamports {
            Some(profit) => TipStrategy::Dynamic {
                expected_profit_lamports: profit,
            },
            None => TipStrategy::Fixed,
        };
        let computed = self.tips.compute(&strategy);
        // A warm success history can outbid the static floor.
        match self.tips.recommended() {
            Some(recommended) => computed.max(recommended),
            None => computed,
        }
    }

    /// Build DEX-specific swap instructions plus the execution price in
    /// the canonical unit, reading all required accounts in one batch.
    async fn build_swap_instructions(
        &self,
        request: &SwapRequest,
    ) -> Result<(Vec<Instruction>, Option<f64>, Option<u64>)> {
        let wallet = solana_sdk::signer::Signer::pubkey(&*self.signer);
        let slippage = request.slippage_bps.unwrap_or(self.default_slippage_bps) as u128;

        match request.dex {
            DexKind::Pumpfun => {
                let user_ata = swap_builder::derive_ata(&wallet, &request.mint, &TOKEN_PROGRAM);
                let reads = self
                    .rpc
                    .get_multiple_account_infos(&[request.pool, user_ata])
                    .await?;
                let curve_account = reads[0]
                    .as_ref()
                    .ok_or_else(|| anyhow!("bonding curve account missing"))?;
                let state = BondingCurveState::parse(&curve_account.data)
                    .ok_or_else(|| anyhow!("bonding curve unparseable"))?;
                if state.complete {
                    return Err(anyhow!("bonding curve complete; token migrated"));
                }
                let price = Some(state.spot_price());

                match request.side {
                    SwapSide::Buy => {
                        let expected = state.buy_output(request.amount);
                        if expected == 0 {
                            return Err(anyhow!("zero expected output for buy"));
                        }
                        let min_tokens =
                            (expected as u128 * (10_000 - slippage) / 10_000) as u64;
                        let mut instructions = Vec::new();
                        if reads[1].is_none() {
                            instructions.push(swap_builder::create_ata_instruction(
                                &wallet,
                                &wallet,
                                &request.mint,
                            ));
                        }
                        instructions.push(swap_builder::pumpfun_buy_instruction(
                            &wallet,
                            &request.mint,
                            &request.pool,
                            min_tokens,
                            request.amount,
                        )?);
                        Ok((instructions, price, Some(expected)))
                    }
                    SwapSide::Sell => {
                        if reads[1].is_none() {
                            return Err(anyhow!("no token account to sell from"));
                        }
                        let expected = state.sell_output(request.amount);
                        let min_sol = (expected as u128 * (10_000 - slippage) / 10_000) as u64;
                        let instruction = swap_builder::pumpfun_sell_instruction(
                            &wallet,
                            &request.mint,
                            &request.pool,
                            request.amount,
                            min_sol,
                        )?;
                        Ok((vec![instruction], price, Some(expected)))
                    }
                }
            }
            DexKind::Raydium => self.build_raydium_swap(request, &wallet, slippage).await,
            DexKind::Orca => Err(anyhow!("orca execution path not implemented")),
        }
    }

    /// Raydium buys wrap SOL into a WSOL ATA first; sells run the swap
    /// and unwrap. Expected output comes from the live vault reserves
    /// with the standard 25 bps pool fee.
    async fn build_raydium_swap(
        &self,
        request: &SwapRequest,
        wallet: &Pubkey,
        slippage: u128,
    ) -> Result<(Vec<Instruction>, Option<f64>, Option<u64>)> {
        let pool_account = self
            .rpc
            .get_account_info(&request.pool)
            .await?
            .ok_or_else(|| anyhow!("pool account missing"))?;
        let state = RaydiumPoolState::parse(&pool_account.data)
            .ok_or_else(|| anyhow!("pool state unparseable"))?;
        if !state.is_live() {
            return Err(anyhow!("pool status {} not tradable", state.status));
        }

        let (base_balance, quote_balance) = tokio::join!(
            self.rpc.get_token_account_balance(&state.base_vault),
            self.rpc.get_token_account_balance(&state.quote_vault)
        );
        let base_reserve: u128 = base_balance?.amount.parse().unwrap_or(0);
        let quote_reserve: u128 = quote_balance?.amount.parse().unwrap_or(0);
        if base_reserve == 0 || quote_reserve == 0 {
            return Err(anyhow!("pool reserves empty"));
        }
        let price = Some(raydium_spot_price(
            quote_reserve,
            base_reserve,
            state.base_decimal,
            state.quote_decimal,
        ));

        let token_program = *TOKEN_PROGRAM;
        let wsol_ata = swap_builder::derive_ata(wallet, &WSOL, &token_program);
        let token_ata = swap_builder::derive_ata(wallet, &request.mint, &token_program);

        // Constant-product estimate with the 25 bps pool fee.
        let swap_out = |amount_in: u128, reserve_in: u128, reserve_out: u128| -> u128 {
            let in_after_fee = amount_in * 9_975 / 10_000;
            reserve_out * in_after_fee / (reserve_in + in_after_fee)
        };

        match request.side {
            SwapSide::Buy => {
                let expected = swap_out(request.amount as u128, quote_reserve, base_reserve);
                if expected == 0 {
                    return Err(anyhow!("zero expected output for buy"));
                }
                let min_out = (expected * (10_000 - slippage) / 10_000) as u64;

                let mut instructions = vec![
                    swap_builder::create_ata_instruction(wallet, wallet, &WSOL),
                    solana_sdk::system_instruction::transfer(wallet, &wsol_ata, request.amount),
                    spl_token::instruction::sync_native(&token_program, &wsol_ata)?,
                    swap_builder::create_ata_instruction(wallet, wallet, &request.mint),
                ];
                instructions.push(swap_builder::raydium_swap_instruction(
                    &request.pool,
                    &state,
                    &wsol_ata,
                    &token_ata,
                    wallet,
                    request.amount,
                    min_out,
                ));
                instructions.push(spl_token::instruction::close_account(
                    &token_program,
                    &wsol_ata,
                    wallet,
                    wallet,
                    &[],
                )?);
                Ok((instructions, price, Some(expected as u64)))
            }
            SwapSide::Sell => {
                let expected = swap_out(request.amount as u128, base_reserve, quote_reserve);
                let min_out = (expected * (10_000 - slippage) / 10_000) as u64;
                let instructions = vec![
                    swap_builder::create_ata_instruction(wallet, wallet, &WSOL),
                    swap_builder::raydium_swap_instruction(
                        &request.pool,
                        &state,
                        &token_ata,
                        &wsol_ata,
                        wallet,
                        request.amount,
                        min_out,
                    ),
                    spl_token::instruction::close_account(
                        &token_program,
                        &wsol_ata,
                        wallet,
                        wallet,
                        &[],
                    )?,
                ];
                Ok((instructions, price, Some(expected as u64)))
            }
        }
    }

    /// Submit the 1-tx bundle and poll `getBundleStatuses` until a
    /// terminal status or the timeout.
    async fn submit_and_await_bundle(&self, transaction: &VersionedTransaction) -> Result<BundleStatus> {
        let encoded = bs58::encode(
            bincode::serialize(transaction).map_err(|e| anyhow!("tx serialize: {e}"))?,
        )
        .into_string();

        let bundle_id = self.send_bundle(vec![encoded]).await?;
        self.metrics.lock().bundles_submitted += 1;
        debug!("bundle {bundle_id} submitted");

        let deadline = Instant::now() + Duration::from_millis(BUNDLE_TIMEOUT_MS);
        loop {
            sleep(Duration::from_millis(BUNDLE_POLL_INTERVAL_MS)).await;
            match self.poll_bundle_status(&bundle_id).await {
                Ok(BundleStatus::Pending) | Ok(BundleStatus::Unknown) => {}
                Ok(terminal) => return Ok(terminal),
                Err(e) => debug!("bundle status poll error: {e}"),
            }
            if Instant::now() >= deadline {
                return Ok(BundleStatus::Dropped);
            }
        }
    }

    async fn send_bundle(&self, encoded_transactions: Vec<String>) -> Result<String> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": "sendBundle",
            "params": [encoded_transactions],
        });
        let response: JsonRpcResponse = self
            .http
            .post(format!("{}/api/v1/bundles", self.block_engine_url))
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(anyhow!("block engine error {}: {}", error.code, error.message));
        }
        response
            .result
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| anyhow!("block engine returned no bundle id"))
    }

    async fn poll_bundle_status(&self, bundle_id: &str) -> Result<BundleStatus> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": "getBundleStatuses",
            "params": [[bundle_id]],
        });
        let response: JsonRpcResponse = self
            .http
            .post(format!("{}/api/v1/bundles", self.block_engine_url))
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(anyhow!("status error {}: {}", error.code, error.message));
        }
        let raw_status = response
            .result
            .as_ref()
            .and_then(|r| r.get("value"))
            .and_then(|v| v.get(0))
            .and_then(|entry| {
                entry
                    .get("confirmation_status")
                    .or_else(|| entry.get("status"))
            })
            .and_then(Value::as_str)
            .unwrap_or("pending")
            .to_string();
        Ok(normalize_bundle_status(&raw_status))
    }

    /// Direct RPC path: the tip instruction is dropped and the remaining
    /// transaction sent with skip-preflight and bounded retries.
    async fn fallback_direct_send(
        &self,
        swap_ixs: &[Instruction],
        price: Option<f64>,
        amount_out: Option<u64>,
        start: Instant,
    ) -> SwapResult {
        self.metrics.lock().fallback_sends += 1;
        let wallet = solana_sdk::signer::Signer::pubkey(&*self.signer);
        let mut instructions =
            swap_builder::compute_budget_instructions(SWAP_COMPUTE_UNITS, self.priority_fee);
        instructions.extend(swap_ixs.iter().cloned());

        let mut last_error = String::new();
        for attempt in 0..FALLBACK_MAX_RETRIES {
            if attempt > 0 {
                let backoff =
                    Duration::from_millis(FALLBACK_RETRY_BASE_MS * (1 << (attempt - 1)) as u64);
                sleep(backoff).await;
            }
            let blockhash = match self.rpc.get_latest_blockhash().await {
                Ok(hash) => hash,
                Err(e) => {
                    last_error = format!("blockhash unavailable: {e}");
                    continue;
                }
            };
            let transaction = Transaction::new_signed_with_payer(
                &instructions,
                Some(&wallet),
                &[self.signer.as_ref()],
                blockhash,
            );
            let versioned = VersionedTransaction::from(transaction);

            match self.rpc.send_transaction(&versioned, true, 3).await {
                Ok(signature) => match self.rpc.confirm_transaction(&signature).await {
                    Ok(true) => {
                        info!("✅ direct send confirmed {signature} ({}ms)", ms(start));
                        return SwapResult {
                            success: true,
                            tx_hash: Some(signature.to_string()),
                            price,
                            amount_out,
                            error: None,
                            latency_ms: ms(start),
                        };
                    }
                    Ok(false) => last_error = format!("{signature} not confirmed"),
                    Err(e) => last_error = format!("confirm failed: {e}"),
                },
                Err(e) => last_error = format!("send failed: {e}"),
            }
        }

        SwapResult::failure(
            format!("bundle and direct send both failed: {last_error}"),
            ms(start),
        )
    }
}

fn ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Spot price from raw vault reserves in the canonical unit. The decimal
/// correction comes from the pool's own mint decimals, so a 9-decimal
/// base token is not priced as if it had Pumpfun's 6.
fn raydium_spot_price(
    quote_reserve: u128,
    base_reserve: u128,
    base_decimal: u8,
    quote_decimal: u8,
) -> f64 {
    let correction = 10f64.powi(quote_decimal as i32 - base_decimal as i32);
    quote_reserve as f64 / base_reserve as f64 * correction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_normalization() {
        assert_eq!(normalize_bundle_status("Landed"), BundleStatus::Landed);
        assert_eq!(normalize_bundle_status("confirmed"), BundleStatus::Landed);
        assert_eq!(normalize_bundle_status("FINALIZED"), BundleStatus::Landed);
        assert_eq!(normalize_bundle_status("failed"), BundleStatus::Failed);
        assert_eq!(normalize_bundle_status("rejected"), BundleStatus::Failed);
        assert_eq!(normalize_bundle_status("dropped"), BundleStatus::Dropped);
        assert_eq!(normalize_bundle_status("pending"), BundleStatus::Pending);
        assert_eq!(normalize_bundle_status("processing"), BundleStatus::Pending);
        assert_eq!(normalize_bundle_status("???"), BundleStatus::Unknown);
    }

    #[test]
    fn test_raydium_price_uses_pool_decimals() {
        // 6-decimal base vs 9-decimal quote matches the curve convention.
        let six = raydium_spot_price(30_000_000_000, 1_000_000_000_000, 6, 9);
        assert!((six - 0.03 * 1_000.0).abs() < 1e-9);

        // A 9-decimal base token needs no correction at all.
        let nine = raydium_spot_price(30_000_000_000, 1_000_000_000_000, 9, 9);
        assert!((nine - 0.03).abs() < 1e-9);

        // And the two must differ by exactly the decimal gap.
        assert!((six / nine - 1_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dry_run_short_circuits() {
        let rpc = Arc::new(
            RpcProviderManager::new(
                &[crate::config::ProviderConfig {
                    name: "test".to_string(),
                    url: "http://localhost:18899".to_string(),
                    rps_limit: 10,
                    priority: 1,
                }],
                2_000,
            )
            .unwrap(),
        );
        let executor = BundleExecutor::new(
            rpc,
            Arc::new(Keypair::new()),
            "http://localhost:9999".to_string(),
            TipCalculator::new(100_000, 10.0, 1_000_000),
            true,
            500,
        );
        let result = executor
            .execute(&SwapRequest {
                dex: DexKind::Pumpfun,
                mint: Pubkey::new_unique(),
                pool: Pubkey::new_unique(),
                side: SwapSide::Buy,
                amount: 100_000_000,
                slippage_bps: None,
                expected_profit_lamports: None,
            })
            .await;
        assert!(result.success);
        assert!(result.tx_hash.unwrap().starts_with("dry-run-"));
    }

    #[test]
    fn test_tip_choice_prefers_warm_history() {
        let tips = TipCalculator::new(100_000, 10.0, 2_000_000);
        for _ in 0..5 {
            tips.record_success(500_000);
        }
        let rpc = Arc::new(
            RpcProviderManager::new(
                &[crate::config::ProviderConfig {
                    name: "test".to_string(),
                    url: "http://localhost:18899".to_string(),
                    rps_limit: 10,
                    priority: 1,
                }],
                2_000,
            )
            .unwrap(),
        );
        let executor = BundleExecutor::new(
            rpc,
            Arc::new(Keypair::new()),
            "http://localhost:9999".to_string(),
            tips,
            true,
            500,
        );
        let tip = executor.choose_tip(&SwapRequest {
            dex: DexKind::Pumpfun,
            mint: Pubkey::new_unique(),
            pool: Pubkey::new_unique(),
            side: SwapSide::Buy,
            amount: 1,
            slippage_bps: None,
            expected_profit_lamports: None,
        });
        assert_eq!(tip, 550_000); // floor(500k * 1.1)
    }
}
