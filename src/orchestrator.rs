//! Pipeline orchestration: ingestion → risk → execution → positions.
//!
//! Components are constructed here and wired over typed channels; there
//! are no global singletons and no callback registration. Each incoming
//! event is handled in its own task so a slow bundle poll can never
//! stall exit triggers behind it; an in-flight mint set keeps two
//! detections of the same token from double-buying. Every stage records
//! its latency in a `perf:` tagged log line, and every dropped event
//! says why. `stop` flips one watch channel that all loops follow.

use anyhow::Result;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auto_sweep::AutoSweep;
use crate::bundle_executor::BundleExecutor;
use crate::config::Config;
use crate::constants::sol_to_lamports;
use crate::pool_ingestor::PoolIngestor;
use crate::position_manager::{PositionLimits, PositionManager};
use crate::risk_analyzer::{RiskAnalyzer, RiskSettings};
use crate::rpc_manager::RpcProviderManager;
use crate::swap_builder;
use crate::tip_strategy::TipCalculator;
use crate::types::{ExitTrigger, PoolEvent, PositionEvent, RiskRequest, SwapRequest, SwapSide};
use crate::wallet_manager::WalletManager;

/// Threshold gate: a passed analysis at or above the configured score.
pub fn should_buy(passed: bool, score: u32, threshold: u32) -> bool {
    passed && score >= threshold
}

/// Cloneable handle that requests a graceful shutdown
#[derive(Clone)]
pub struct StopHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Everything a spawned event handler needs, shared behind one Arc
struct Pipeline {
    wallet_pubkey: Pubkey,
    buy_amount_sol: f64,
    risk_score_threshold: u32,
    rpc: Arc<RpcProviderManager>,
    analyzer: Arc<RiskAnalyzer>,
    executor: Arc<BundleExecutor>,
    positions: Arc<PositionManager>,
    /// Mints with a buy pipeline currently running
    in_flight_mints: Mutex<HashSet<Pubkey>>,
}

/// Releases the in-flight claim when the handler finishes
struct MintClaim {
    pipeline: Arc<Pipeline>,
    mint: Pubkey,
}

impl Drop for MintClaim {
    fn drop(&mut self) {
        self.pipeline.in_flight_mints.lock().remove(&self.mint);
    }
}

impl Pipeline {
    fn claim_mint(self: &Arc<Self>, mint: Pubkey) -> Option<MintClaim> {
        if self.in_flight_mints.lock().insert(mint) {
            Some(MintClaim {
                pipeline: self.clone(),
                mint,
            })
        } else {
            None
        }
    }

    /// One pool event through quick_check → analyze → buy → open.
    async fn handle_pool_event(self: Arc<Self>, event: PoolEvent) {
        let pipeline_start = Instant::now();

        let request = match &event {
            PoolEvent::NewPool { .. } => match RiskRequest::from_new_pool(&event) {
                Some(request) => request,
                None => return,
            },
            PoolEvent::Migration { source_dex, mint, .. } => {
                // A migrated curve can no longer be traded where we hold
                // it; surface the condition, exits go through TP/SL.
                if self.positions.has_position_for_mint(mint) {
                    warn!("migration of {mint} from {source_dex} while position open");
                }
                return;
            }
            PoolEvent::LiquidityAdded { .. } => return,
        };

        if self.positions.has_position_for_mint(&request.mint) {
            debug!("skip {}: position already open", request.mint);
            return;
        }
        let Some(_claim) = self.claim_mint(request.mint) else {
            debug!("skip {}: buy pipeline already running", request.mint);
            return;
        };

        // Ultra-fast screen first; a blacklisted mint or a sell-denying
        // extension never reaches the full analysis.
        let quick = self.analyzer.quick_check(&request).await;
        if !quick.viable {
            info!(
                "perf:pipeline mint={} outcome=rejected_security_failed reason={} latency_ms={}",
                request.mint,
                quick.reason.as_deref().unwrap_or("not viable"),
                pipeline_start.elapsed().as_millis()
            );
            return;
        }

        let analysis_start = Instant::now();
        let analysis = match self.analyzer.analyze(&request).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(
                    "perf:pipeline mint={} outcome=analysis_error latency_ms={} error={e}",
                    request.mint,
                    pipeline_start.elapsed().as_millis()
                );
                return;
            }
        };
        info!(
            "perf:analysis mint={} score={} passed={} latency_ms={}",
            request.mint,
            analysis.score,
            analysis.passed,
            analysis_start.elapsed().as_millis()
        );

        if !analysis.passed {
            let critical = analysis
                .factors
                .iter()
                .find(|f| f.is_critical_failure() || !f.passed)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| "score".to_string());
            info!(
                "perf:pipeline mint={} outcome=rejected_security_failed factor={critical} latency_ms={}",
                request.mint,
                pipeline_start.elapsed().as_millis()
            );
            return;
        }
        if !should_buy(analysis.passed, analysis.score, self.risk_score_threshold) {
            info!(
                "perf:pipeline mint={} outcome=rejected_below_threshold score={} threshold={} latency_ms={}",
                request.mint,
                analysis.score,
                self.risk_score_threshold,
                pipeline_start.elapsed().as_millis()
            );
            return;
        }

        let result = self
            .executor
            .execute(&SwapRequest {
                dex: request.dex,
                mint: request.mint,
                pool: request.pool,
                side: SwapSide::Buy,
                amount: sol_to_lamports(self.buy_amount_sol),
                slippage_bps: None,
                expected_profit_lamports: None,
            })
            .await;
        info!(
            "perf:buy mint={} success={} latency_ms={}",
            request.mint, result.success, result.latency_ms
        );

        if !result.success {
            info!(
                "perf:pipeline mint={} outcome=buy_failed latency_ms={} error={}",
                request.mint,
                pipeline_start.elapsed().as_millis(),
                result.error.as_deref().unwrap_or("unknown")
            );
            return;
        }

        let (Some(price), Some(tokens)) = (result.price, result.amount_out) else {
            // Dry-run fills carry no price; the pipeline is validated
            // without opening a position.
            info!(
                "perf:pipeline mint={} outcome=bought_dry_run latency_ms={}",
                request.mint,
                pipeline_start.elapsed().as_millis()
            );
            return;
        };

        match self.positions.open_position(
            request.mint,
            request.pool,
            request.dex,
            price,
            self.buy_amount_sol,
            tokens,
            result.tx_hash.clone().unwrap_or_default(),
        ) {
            Ok(position) => info!(
                "perf:pipeline mint={} outcome=position_opened position={} latency_ms={}",
                request.mint,
                position.log_id(),
                pipeline_start.elapsed().as_millis()
            ),
            Err(e) => warn!(
                "perf:pipeline mint={} outcome=position_rejected latency_ms={} error={e}",
                request.mint,
                pipeline_start.elapsed().as_millis()
            ),
        }
    }

    /// One exit trigger through balance check → sell → close/revert.
    async fn handle_exit_trigger(self: Arc<Self>, trigger: ExitTrigger) {
        let start = Instant::now();
        let Some(position) = self.positions.position(trigger.position_id) else {
            warn!("exit trigger for unknown pos-{}", trigger.position_id);
            return;
        };

        // Confirm we actually hold tokens before selling; a zero balance
        // closes the book entry with no transaction.
        let ata = swap_builder::derive_ata(
            &self.wallet_pubkey,
            &trigger.mint,
            &crate::constants::TOKEN_PROGRAM,
        );
        let held = match self.rpc.get_token_account_balance(&ata).await {
            Ok(balance) => balance.amount.parse::<u64>().unwrap_or(0),
            Err(_) => 0,
        };
        if held == 0 {
            let _ = self
                .positions
                .close_position(trigger.position_id, trigger.reason, None, None);
            info!(
                "perf:exit position=pos-{} outcome=closed_no_balance latency_ms={}",
                trigger.position_id,
                start.elapsed().as_millis()
            );
            return;
        }

        let expected_profit_sol = position.sol_spent * position.pnl_percent / 100.0;
        let result = self
            .executor
            .execute(&SwapRequest {
                dex: trigger.dex,
                mint: trigger.mint,
                pool: trigger.pool,
                side: SwapSide::Sell,
                amount: held,
                slippage_bps: None,
                expected_profit_lamports: Some(sol_to_lamports(expected_profit_sol.max(0.0)) as i64),
            })
            .await;

        if result.success {
            let _ = self.positions.close_position(
                trigger.position_id,
                trigger.reason,
                result.tx_hash.clone(),
                result.price,
            );
            info!(
                "perf:exit position=pos-{} outcome=closed reason={} latency_ms={}",
                trigger.position_id,
                trigger.reason,
                start.elapsed().as_millis()
            );
        } else {
            // Revert so the next tick re-fires the trigger.
            self.positions.revert_to_open(trigger.position_id);
            warn!(
                "perf:exit position=pos-{} outcome=sell_failed latency_ms={} error={}",
                trigger.position_id,
                start.elapsed().as_millis(),
                result.error.as_deref().unwrap_or("unknown")
            );
        }
    }
}

pub struct Orchestrator {
    config: Config,
    pipeline: Arc<Pipeline>,
    ingestor: Arc<PoolIngestor>,
    sweep: Option<Arc<AutoSweep>>,
    pool_rx: mpsc::Receiver<PoolEvent>,
    exit_rx: mpsc::Receiver<ExitTrigger>,
    event_rx: mpsc::Receiver<PositionEvent>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self> {
        let wallet = Arc::new(WalletManager::from_base58(&config.private_key)?);
        let rpc = Arc::new(RpcProviderManager::new(
            &config.providers,
            config.rpc_cache_ttl_ms,
        )?);

        let analyzer = Arc::new(RiskAnalyzer::new(
            rpc.clone(),
            wallet.pubkey(),
            RiskSettings {
                min_liquidity_sol: config.min_liquidity_sol,
                max_top_holder_percent: config.max_top_holder_percent,
                enable_honeypot_check: config.enable_honeypot_check,
                max_tax_percent: config.max_tax_percent,
            },
        ));

        let executor = Arc::new(BundleExecutor::new(
            rpc.clone(),
            wallet.keypair().clone(),
            config.jito_block_engine_url.clone(),
            TipCalculator::new(
                config.jito_tip_lamports,
                config.jito_tip_percent,
                config.jito_max_tip_lamports,
            ),
            config.dry_run,
            config.max_slippage_bps,
        ));

        let (exit_tx, exit_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);
        let positions = Arc::new(PositionManager::new(
            rpc.clone(),
            PositionLimits {
                max_concurrent_positions: config.max_concurrent_positions,
                max_position_size_sol: config.max_position_size_sol,
                take_profit_percent: config.take_profit_percent,
                stop_loss_percent: config.stop_loss_percent,
            },
            exit_tx,
            event_tx,
        ));

        let (pool_tx, pool_rx) = mpsc::channel(512);
        let ingestor = Arc::new(PoolIngestor::new(&config, rpc.clone(), pool_tx));

        let sweep = match (config.enable_auto_sweep, config.cold_wallet_address) {
            (true, Some(cold_wallet)) => Some(Arc::new(AutoSweep::new(
                rpc.clone(),
                wallet.keypair().clone(),
                cold_wallet,
                config.dry_run,
            ))),
            _ => None,
        };

        let pipeline = Arc::new(Pipeline {
            wallet_pubkey: wallet.pubkey(),
            buy_amount_sol: config.buy_amount_sol,
            risk_score_threshold: config.risk_score_threshold,
            rpc,
            analyzer,
            executor,
            positions,
            in_flight_mints: Mutex::new(HashSet::new()),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            pipeline,
            ingestor,
            sweep,
            pool_rx,
            exit_rx,
            event_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the pipeline until the stop handle fires.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "🚀 sniper running: wallet={} dry_run={} threshold={}",
            self.pipeline.wallet_pubkey, self.config.dry_run, self.config.risk_score_threshold
        );

        // Best-effort: learn the block engine's current tip recipients.
        if !self.config.dry_run {
            if let Err(e) = self.pipeline.executor.refresh_tip_accounts().await {
                debug!("using built-in tip accounts: {e}");
            }
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let ingestor = self.ingestor.clone();
        let shutdown = self.shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            ingestor.run(shutdown).await;
        }));

        let positions = self.pipeline.positions.clone();
        let shutdown = self.shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            positions.run_refresh_loop(shutdown).await;
        }));

        if let Some(sweep) = &self.sweep {
            let sweep = sweep.clone();
            let shutdown = self.shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                sweep.run(shutdown).await;
            }));
        }

        let mut status_ticker = interval(Duration::from_secs(60));
        status_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(event) = self.pool_rx.recv() => {
                    tokio::spawn(self.pipeline.clone().handle_pool_event(event));
                }
                Some(trigger) = self.exit_rx.recv() => {
                    tokio::spawn(self.pipeline.clone().handle_exit_trigger(trigger));
                }
                Some(event) = self.event_rx.recv() => {
                    match event {
                        PositionEvent::Opened { id, mint, entry_price, sol_spent } => debug!(
                            "position_opened pos-{id} mint={mint} entry={entry_price:.9} spent={sol_spent:.3}"
                        ),
                        PositionEvent::Closed { id, mint, reason, pnl_percent } => debug!(
                            "position_closed pos-{id} mint={mint} reason={reason} pnl={pnl_percent:+.2}%"
                        ),
                    }
                }
                _ = status_ticker.tick() => {
                    self.log_status();
                }
            }
        }

        info!("🛑 shutdown: stopping ingestion, timers and sweep");
        let _ = self.shutdown_tx.send(true);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("shutdown complete");
        Ok(())
    }

    fn log_status(&self) {
        let ingestion = self.ingestor.core().stats();
        let positions = self.pipeline.positions.stats();
        let executor = self.pipeline.executor.metrics();
        info!(
            "📊 status: mode={} events={} pools={} dropped_fetches={} | open={} closed={} pnl={:+.2}% | bundles {}/{} landed",
            self.ingestor.mode(),
            ingestion.events_received,
            ingestion.pools_detected,
            ingestion.dropped_fetches,
            positions.open,
            positions.closed,
            positions.weighted_pnl_percent,
            executor.bundles_landed,
            executor.bundles_submitted,
        );
        for provider in self.pipeline.rpc.provider_statuses() {
            debug!(
                "  provider {} p{} healthy={} failures={} tokens={:.1} req={} err={}",
                provider.name,
                provider.priority,
                provider.healthy,
                provider.consecutive_failures,
                provider.available_tokens,
                provider.requests,
                provider.failures
            );
        }
    }
}
