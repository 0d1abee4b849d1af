//! Shared data model: pool events, risk results, positions, swap requests.
//!
//! Everything crossing a component boundary lives here so the channel
//! wiring in the orchestrator stays typed and inspectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// DEX families the sniper understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DexKind {
    Raydium,
    Pumpfun,
    Orca,
}

impl DexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DexKind::Raydium => "raydium",
            DexKind::Pumpfun => "pumpfun",
            DexKind::Orca => "orca",
        }
    }
}

impl std::fmt::Display for DexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the ingestion layer when a decoder recognizes a pool
#[derive(Debug, Clone, Serialize)]
pub enum PoolEvent {
    NewPool {
        dex: DexKind,
        mint: Pubkey,
        pool: Pubkey,
        base_mint: Pubkey,
        quote_mint: Pubkey,
        base_vault: Pubkey,
        quote_vault: Pubkey,
        lp_mint: Option<Pubkey>,
        open_time: Option<i64>,
        slot: u64,
        signature: String,
        timestamp: DateTime<Utc>,
    },
    Migration {
        source_dex: DexKind,
        target_dex: DexKind,
        mint: Pubkey,
        source_pool: Pubkey,
        target_pool: Option<Pubkey>,
        slot: u64,
        signature: String,
        timestamp: DateTime<Utc>,
    },
    /// Emitted by decoders for deposit instructions; not consumed by the
    /// buy pipeline today but kept so downstream consumers can subscribe.
    LiquidityAdded {
        dex: DexKind,
        pool: Pubkey,
        mint: Pubkey,
        slot: u64,
        signature: String,
        timestamp: DateTime<Utc>,
    },
}

impl PoolEvent {
    pub fn signature(&self) -> &str {
        match self {
            PoolEvent::NewPool { signature, .. }
            | PoolEvent::Migration { signature, .. }
            | PoolEvent::LiquidityAdded { signature, .. } => signature,
        }
    }

    pub fn mint(&self) -> Pubkey {
        match self {
            PoolEvent::NewPool { mint, .. }
            | PoolEvent::Migration { mint, .. }
            | PoolEvent::LiquidityAdded { mint, .. } => *mint,
        }
    }

    pub fn slot(&self) -> u64 {
        match self {
            PoolEvent::NewPool { slot, .. }
            | PoolEvent::Migration { slot, .. }
            | PoolEvent::LiquidityAdded { slot, .. } => *slot,
        }
    }
}

/// A transaction already decoded into the shape the DEX decoders consume
#[derive(Debug, Clone)]
pub struct ParsedTransaction {
    pub signature: String,
    pub slot: u64,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<DecodedInstruction>,
}

/// One top-level instruction with its accounts resolved to pubkeys
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub data: Vec<u8>,
}

// ============================================================================
// RISK MODEL
// ============================================================================

/// Factor names whose failure is fatal regardless of total score
pub const CRITICAL_FACTORS: [&str; 3] = ["honeypot", "mint_authority", "holder_distribution"];

/// Score below which a failed `holder_distribution` counts as critical
pub const HOLDER_DISTRIBUTION_CRITICAL_SCORE: i32 = -10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFactor {
    pub name: String,
    pub score: i32,
    pub max_score: i32,
    pub passed: bool,
    pub details: String,
}

impl RiskFactor {
    pub fn new(name: &str, score: i32, max_score: i32, passed: bool, details: String) -> Self {
        Self {
            name: name.to_string(),
            score,
            max_score,
            passed,
            details,
        }
    }

    /// A failed critical factor sinks the whole analysis
    pub fn is_critical_failure(&self) -> bool {
        if self.passed {
            return false;
        }
        match self.name.as_str() {
            "honeypot" | "mint_authority" => true,
            "holder_distribution" => self.score < HOLDER_DISTRIBUTION_CRITICAL_SCORE,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAnalysis {
    /// Normalized 0..=100
    pub score: u32,
    pub passed: bool,
    pub factors: Vec<RiskFactor>,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl RiskAnalysis {
    /// Build the final analysis from collected factors.
    ///
    /// score = round(100 * sum(score) / max(sum(max_score), 1)), clamped
    /// to [0, 100]; passed requires no critical failure and score >= 50.
    pub fn from_factors(factors: Vec<RiskFactor>, warnings: Vec<String>) -> Self {
        let total: i64 = factors.iter().map(|f| f.score as i64).sum();
        let max_total: i64 = factors.iter().map(|f| f.max_score as i64).sum::<i64>().max(1);
        let normalized = ((100.0 * total as f64 / max_total as f64).round() as i64).clamp(0, 100);
        let score = normalized as u32;
        let critical_failed = factors.iter().any(|f| f.is_critical_failure());
        Self {
            score,
            passed: !critical_failed && score >= 50,
            factors,
            warnings,
            timestamp: Utc::now(),
        }
    }
}

/// Input to the risk analyzer, carried over from the pool event
#[derive(Debug, Clone)]
pub struct RiskRequest {
    pub mint: Pubkey,
    pub pool: Pubkey,
    pub dex: DexKind,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub lp_mint: Option<Pubkey>,
    pub creator: Option<Pubkey>,
}

impl RiskRequest {
    pub fn from_new_pool(event: &PoolEvent) -> Option<Self> {
        match event {
            PoolEvent::NewPool {
                dex,
                mint,
                pool,
                base_mint,
                quote_mint,
                base_vault,
                quote_vault,
                lp_mint,
                ..
            } => Some(Self {
                mint: *mint,
                pool: *pool,
                dex: *dex,
                base_mint: *base_mint,
                quote_mint: *quote_mint,
                base_vault: *base_vault,
                quote_vault: *quote_vault,
                lp_mint: *lp_mint,
                creator: None,
            }),
            _ => None,
        }
    }
}

/// Result of the ultra-fast pre-screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickCheck {
    pub viable: bool,
    pub reason: Option<String>,
}

impl QuickCheck {
    pub fn viable() -> Self {
        Self {
            viable: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            viable: false,
            reason: Some(reason.into()),
        }
    }
}

// ============================================================================
// SWAP EXECUTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapSide {
    Buy,
    Sell,
}

impl std::fmt::Display for SwapSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapSide::Buy => f.write_str("buy"),
            SwapSide::Sell => f.write_str("sell"),
        }
    }
}

/// A request the orchestrator hands to the bundle executor.
///
/// For buys `amount` is lamports in; for sells it is raw token units in.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub dex: DexKind,
    pub mint: Pubkey,
    pub pool: Pubkey,
    pub side: SwapSide,
    pub amount: u64,
    pub slippage_bps: Option<u16>,
    /// Known when exiting a position; drives dynamic tip sizing
    pub expected_profit_lamports: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SwapResult {
    pub success: bool,
    pub tx_hash: Option<String>,
    /// Execution price in the canonical unit, when derivable
    pub price: Option<f64>,
    /// Expected units out: raw tokens for a buy, lamports for a sell
    pub amount_out: Option<u64>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl SwapResult {
    pub fn failure(error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: false,
            tx_hash: None,
            price: None,
            amount_out: None,
            error: Some(error.into()),
            latency_ms,
        }
    }
}

// ============================================================================
// POSITIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => f.write_str("take_profit"),
            ExitReason::StopLoss => f.write_str("stop_loss"),
            ExitReason::Manual => f.write_str("manual"),
        }
    }
}

/// Integer handles identify positions; `pos-<n>` is the stable log form.
pub type PositionId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub mint: Pubkey,
    pub pool: Pubkey,
    pub dex: DexKind,
    /// SOL per whole token at entry
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    /// Raw token units held
    pub amount: u64,
    pub sol_spent: f64,
    pub current_price: f64,
    pub pnl_percent: f64,
    pub tp_price: f64,
    pub sl_price: f64,
    pub status: PositionStatus,
    pub entry_tx: String,
    pub exit_tx: Option<String>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    pub fn log_id(&self) -> String {
        format!("pos-{}", self.id)
    }
}

/// Exit trigger sent from the position manager to the orchestrator
#[derive(Debug, Clone)]
pub struct ExitTrigger {
    pub position_id: PositionId,
    pub mint: Pubkey,
    pub pool: Pubkey,
    pub dex: DexKind,
    pub reason: ExitReason,
    pub current_price: f64,
    pub amount: u64,
}

/// Lifecycle events the position manager publishes
#[derive(Debug, Clone)]
pub enum PositionEvent {
    Opened {
        id: PositionId,
        mint: Pubkey,
        entry_price: f64,
        sol_spent: f64,
    },
    Closed {
        id: PositionId,
        mint: Pubkey,
        reason: ExitReason,
        pnl_percent: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(name: &str, score: i32, max: i32, passed: bool) -> RiskFactor {
        RiskFactor::new(name, score, max, passed, String::new())
    }

    #[test]
    fn test_analysis_normalization_clamps() {
        let analysis = RiskAnalysis::from_factors(
            vec![factor("liquidity", -40, 10, false)],
            vec![],
        );
        assert_eq!(analysis.score, 0);
        assert!(!analysis.passed);

        let analysis = RiskAnalysis::from_factors(vec![factor("liquidity", 10, 10, true)], vec![]);
        assert_eq!(analysis.score, 100);
        assert!(analysis.passed);
    }

    #[test]
    fn test_analysis_empty_factors_divides_by_one() {
        let analysis = RiskAnalysis::from_factors(vec![], vec![]);
        assert_eq!(analysis.score, 0);
        assert!(!analysis.passed);
    }

    #[test]
    fn test_critical_factor_sinks_passing_score() {
        let analysis = RiskAnalysis::from_factors(
            vec![
                factor("mint_authority", 0, 20, false),
                factor("liquidity", 10, 10, true),
                factor("lp_lock", 25, 25, true),
            ],
            vec![],
        );
        assert!(analysis.score >= 50);
        assert!(!analysis.passed);
    }

    #[test]
    fn test_holder_distribution_critical_only_below_threshold() {
        let mild = factor("holder_distribution", -5, 0, false);
        assert!(!mild.is_critical_failure());
        let severe = factor("holder_distribution", -15, 0, false);
        assert!(severe.is_critical_failure());
    }

    #[test]
    fn test_pass_requires_half_score() {
        let analysis = RiskAnalysis::from_factors(
            vec![factor("liquidity", 4, 10, true), factor("lp_lock", 0, 25, false)],
            vec![],
        );
        assert!(analysis.score < 50);
        assert!(!analysis.passed);
    }
}
