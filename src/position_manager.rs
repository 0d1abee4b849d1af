//! Open-position lifecycle and the batched price-refresh loop.
//!
//! The manager owns the positions map; nothing mutates a position except
//! through these methods. A 500 ms tick refreshes Pumpfun prices with
//! one batched curve read, re-evaluates TP/SL and emits exit triggers
//! over a channel. Non-curve DEXes currently skip the refresh (a
//! well-defined no-op: their positions only exit manually).

use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::constants::POSITION_REFRESH_INTERVAL_MS;
use crate::pumpfun_decoder::BondingCurveState;
use crate::rpc_manager::RpcProviderManager;
use crate::types::{
    DexKind, ExitReason, ExitTrigger, Position, PositionEvent, PositionId, PositionStatus,
};

#[derive(Debug, Clone)]
pub struct PositionLimits {
    pub max_concurrent_positions: usize,
    pub max_position_size_sol: f64,
    pub take_profit_percent: f64,
    pub stop_loss_percent: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionStats {
    pub open: usize,
    pub closed: usize,
    pub sol_deployed: f64,
    /// P/L weighted by SOL spent, across closed positions
    pub weighted_pnl_percent: f64,
}

pub struct PositionManager {
    rpc: Arc<RpcProviderManager>,
    limits: PositionLimits,
    positions: Mutex<HashMap<PositionId, Position>>,
    next_id: AtomicU64,
    exit_tx: mpsc::Sender<ExitTrigger>,
    event_tx: mpsc::Sender<PositionEvent>,
}

impl PositionManager {
    pub fn new(
        rpc: Arc<RpcProviderManager>,
        limits: PositionLimits,
        exit_tx: mpsc::Sender<ExitTrigger>,
        event_tx: mpsc::Sender<PositionEvent>,
    ) -> Self {
        Self {
            rpc,
            limits,
            positions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            exit_tx,
            event_tx,
        }
    }

    /// Open a new position if capacity allows. TP/SL are derived from
    /// the entry price here and never recomputed.
    pub fn open_position(
        &self,
        mint: Pubkey,
        pool: Pubkey,
        dex: DexKind,
        entry_price: f64,
        sol_spent: f64,
        amount: u64,
        entry_tx: String,
    ) -> Result<Position> {
        if entry_price <= 0.0 {
            return Err(anyhow!("entry price must be positive"));
        }
        let mut positions = self.positions.lock();

        let active: Vec<&Position> = positions
            .values()
            .filter(|p| p.status != PositionStatus::Closed)
            .collect();
        if active.len() >= self.limits.max_concurrent_positions {
            return Err(anyhow!(
                "position limit reached ({}/{})",
                active.len(),
                self.limits.max_concurrent_positions
            ));
        }
        let deployed: f64 = active.iter().map(|p| p.sol_spent).sum();
        if deployed + sol_spent > self.limits.max_position_size_sol {
            return Err(anyhow!(
                "position size cap exceeded ({:.3} + {:.3} > {:.3} SOL)",
                deployed,
                sol_spent,
                self.limits.max_position_size_sol
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let position = Position {
            id,
            mint,
            pool,
            dex,
            entry_price,
            entry_time: Utc::now(),
            amount,
            sol_spent,
            current_price: entry_price,
            pnl_percent: 0.0,
            tp_price: entry_price * (1.0 + self.limits.take_profit_percent / 100.0),
            sl_price: entry_price * (1.0 - self.limits.stop_loss_percent / 100.0),
            status: PositionStatus::Open,
            entry_tx,
            exit_tx: None,
            exit_reason: None,
        };
        positions.insert(id, position.clone());
        drop(positions);

        info!(
            "📈 {} opened: {} entry={:.9} tp={:.9} sl={:.9} spent={:.3} SOL",
            position.log_id(),
            mint,
            entry_price,
            position.tp_price,
            position.sl_price,
            sol_spent
        );
        let _ = self.event_tx.try_send(PositionEvent::Opened {
            id,
            mint,
            entry_price,
            sol_spent,
        });
        Ok(position)
    }

    pub fn position(&self, id: PositionId) -> Option<Position> {
        self.positions.lock().get(&id).cloned()
    }

    pub fn has_position_for_mint(&self, mint: &Pubkey) -> bool {
        self.positions
            .lock()
            .values()
            .any(|p| p.mint == *mint && p.status != PositionStatus::Closed)
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .lock()
            .values()
            .filter(|p| p.status != PositionStatus::Closed)
            .cloned()
            .collect()
    }

    /// Close after a confirmed sell (or a zero-balance discovery). The
    /// final P/L is derived from the exit price when one is known.
    pub fn close_position(
        &self,
        id: PositionId,
        reason: ExitReason,
        exit_tx: Option<String>,
        exit_price: Option<f64>,
    ) -> Result<Position> {
        let mut positions = self.positions.lock();
        let position = positions
            .get_mut(&id)
            .ok_or_else(|| anyhow!("unknown position pos-{id}"))?;
        if position.status == PositionStatus::Closed {
            return Err(anyhow!("position pos-{id} already closed"));
        }

        position.status = PositionStatus::Closed;
        position.exit_tx = exit_tx;
        position.exit_reason = Some(reason);
        if let Some(exit_price) = exit_price {
            position.current_price = exit_price;
            position.pnl_percent =
                (exit_price - position.entry_price) / position.entry_price * 100.0;
        }
        let snapshot = position.clone();
        drop(positions);

        info!(
            "📉 {} closed ({reason}): pnl {:+.2}%",
            snapshot.log_id(),
            snapshot.pnl_percent
        );
        let _ = self.event_tx.try_send(PositionEvent::Closed {
            id,
            mint: snapshot.mint,
            reason,
            pnl_percent: snapshot.pnl_percent,
        });
        Ok(snapshot)
    }

    /// A sell that failed to land sends the position back to `Open` so
    /// the next tick re-fires its trigger.
    pub fn revert_to_open(&self, id: PositionId) {
        let mut positions = self.positions.lock();
        if let Some(position) = positions.get_mut(&id) {
            if position.status == PositionStatus::Closing {
                position.status = PositionStatus::Open;
                warn!("{} reverted to open after failed exit", position.log_id());
            }
        }
    }

    pub fn stats(&self) -> PositionStats {
        let positions = self.positions.lock();
        let mut stats = PositionStats::default();
        let mut closed_weight = 0.0;
        let mut weighted = 0.0;
        for position in positions.values() {
            match position.status {
                PositionStatus::Closed => {
                    stats.closed += 1;
                    closed_weight += position.sol_spent;
                    weighted += position.pnl_percent * position.sol_spent;
                }
                _ => {
                    stats.open += 1;
                    stats.sol_deployed += position.sol_spent;
                }
            }
        }
        if closed_weight > 0.0 {
            stats.weighted_pnl_percent = weighted / closed_weight;
        }
        stats
    }

    /// Price-refresh driver; cancelled by the shutdown watch.
    pub async fn run_refresh_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_millis(POSITION_REFRESH_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "🔄 position refresh loop started ({}ms tick)",
            POSITION_REFRESH_INTERVAL_MS
        );
        if *shutdown.borrow() {
            return;
        }
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("position refresh loop stopped");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.refresh_prices().await;
                    self.evaluate_exits().await;
                }
            }
        }
    }

    /// One batched read refreshes every open Pumpfun position.
    async fn refresh_prices(&self) {
        let curve_pools: Vec<Pubkey> = {
            let positions = self.positions.lock();
            positions
                .values()
                .filter(|p| p.status == PositionStatus::Open && p.dex == DexKind::Pumpfun)
                .map(|p| p.pool)
                .collect()
        };
        if curve_pools.is_empty() {
            return;
        }

        let accounts = match self.rpc.get_multiple_account_infos(&curve_pools).await {
            Ok(accounts) => accounts,
            Err(e) => {
                debug!("price refresh read failed: {e}");
                return;
            }
        };

        for (pool, account) in curve_pools.iter().zip(accounts.iter()) {
            let Some(account) = account else { continue };
            let Some(state) = BondingCurveState::parse(&account.data) else {
                continue;
            };
            self.apply_price(pool, state.spot_price());
        }
    }

    /// Update price and running P/L for every open position on `pool`.
    /// Exposed so alternative feeds (and tests) can inject refreshes.
    pub fn apply_price(&self, pool: &Pubkey, price: f64) {
        if price <= 0.0 {
            return;
        }
        let mut positions = self.positions.lock();
        for position in positions.values_mut() {
            if position.pool == *pool && position.status == PositionStatus::Open {
                position.current_price = price;
                position.pnl_percent =
                    (price - position.entry_price) / position.entry_price * 100.0;
            }
        }
    }

    /// Fire TP/SL triggers; triggered positions move to `Closing` so a
    /// trigger cannot double-fire while the exit is in flight.
    pub async fn evaluate_exits(&self) {
        let triggers: Vec<ExitTrigger> = {
            let mut positions = self.positions.lock();
            let mut out = Vec::new();
            for position in positions.values_mut() {
                if position.status != PositionStatus::Open {
                    continue;
                }
                let reason = if position.current_price >= position.tp_price {
                    Some(ExitReason::TakeProfit)
                } else if position.current_price <= position.sl_price {
                    Some(ExitReason::StopLoss)
                } else {
                    None
                };
                if let Some(reason) = reason {
                    position.status = PositionStatus::Closing;
                    out.push(ExitTrigger {
                        position_id: position.id,
                        mint: position.mint,
                        pool: position.pool,
                        dex: position.dex,
                        reason,
                        current_price: position.current_price,
                        amount: position.amount,
                    });
                }
            }
            out
        };

        for trigger in triggers {
            info!(
                "🎯 exit trigger pos-{} {} at {:.9}",
                trigger.position_id, trigger.reason, trigger.current_price
            );
            if self.exit_tx.send(trigger).await.is_err() {
                warn!("exit trigger channel closed");
                return;
            }
        }
    }
}
