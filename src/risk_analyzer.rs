//! Tiered token risk assessment.
//!
//! `quick_check` answers in one or two reads (blacklist/whitelist,
//! critical token-2022 extensions, liquidity floor). `analyze` runs the
//! full pipeline: phase 1 fans out the fast fatal checks in parallel and
//! short-circuits on a critical failure, phase 2 inspects holder
//! concentration, LP locking and the creator, phase 3 simulates a sell.
//! Results are cached per mint; confirmed honeypots feed the blacklist.

use anyhow::{anyhow, Result};
use lru::LruCache;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::account_cache::TtlCache;
use crate::constants::*;
use crate::honeypot_simulator::{HoneypotSimulator, SellSimVerdict};
use crate::rpc_manager::RpcProviderManager;
use crate::token_extensions::{MintInfo, TokenAccountInfo};
use crate::types::{QuickCheck, RiskAnalysis, RiskFactor, RiskRequest};

/// Burn address treated as a permanent LP lock
pub const INCINERATOR: &str = "1nc1nerator11111111111111111111111111111111";

#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub min_liquidity_sol: f64,
    pub max_top_holder_percent: f64,
    pub enable_honeypot_check: bool,
    pub max_tax_percent: f64,
}

pub struct RiskAnalyzer {
    rpc: Arc<RpcProviderManager>,
    settings: RiskSettings,
    simulator: HoneypotSimulator,
    analysis_cache: TtlCache<String, RiskAnalysis>,
    blacklist: TtlCache<String, String>,
    whitelist: Mutex<LruCache<String, ()>>,
}

struct HolderSnapshot {
    top1: f64,
    top5: f64,
    top10: f64,
    creator_percent: Option<f64>,
}

impl RiskAnalyzer {
    pub fn new(rpc: Arc<RpcProviderManager>, wallet: Pubkey, settings: RiskSettings) -> Self {
        let simulator = HoneypotSimulator::new(rpc.clone(), wallet, settings.max_tax_percent);
        Self {
            rpc,
            simulator,
            settings,
            analysis_cache: TtlCache::new(2_048, ANALYSIS_CACHE_TTL),
            blacklist: TtlCache::new(BLACKLIST_CAPACITY, BLACKLIST_TTL),
            whitelist: Mutex::new(LruCache::new(NonZeroUsize::new(WHITELIST_CAPACITY).unwrap())),
        }
    }

    pub fn blacklist_mint(&self, mint: &Pubkey, reason: impl Into<String>) {
        let reason = reason.into();
        info!("⛔ blacklisting {mint}: {reason}");
        self.blacklist.insert(mint.to_string(), reason);
    }

    pub fn whitelist_mint(&self, mint: &Pubkey) {
        self.whitelist.lock().put(mint.to_string(), ());
    }

    pub fn is_blacklisted(&self, mint: &Pubkey) -> Option<String> {
        self.blacklist.get(&mint.to_string())
    }

    fn is_whitelisted(&self, mint: &Pubkey) -> bool {
        self.whitelist.lock().get(&mint.to_string()).is_some()
    }

    /// Ultra-fast viability screen: list membership, killer extensions,
    /// liquidity floor. No scoring.
    pub async fn quick_check(&self, request: &RiskRequest) -> QuickCheck {
        if let Some(reason) = self.is_blacklisted(&request.mint) {
            return QuickCheck::rejected(format!("blacklisted: {reason}"));
        }
        if self.is_whitelisted(&request.mint) {
            return QuickCheck::viable();
        }

        match self.read_mint(&request.mint).await {
            Ok((info, _)) => {
                let critical = info.critical_extensions();
                if !critical.is_empty() {
                    return QuickCheck::rejected(format!(
                        "critical_extensions: {}",
                        critical.join(",")
                    ));
                }
            }
            Err(e) => return QuickCheck::rejected(format!("mint unreadable: {e}")),
        }

        match self.liquidity_sol(request).await {
            Ok(liquidity) if liquidity >= self.settings.min_liquidity_sol => QuickCheck::viable(),
            Ok(liquidity) => QuickCheck::rejected(format!(
                "liquidity {liquidity:.2} SOL below minimum {:.2}",
                self.settings.min_liquidity_sol
            )),
            Err(e) => QuickCheck::rejected(format!("liquidity unreadable: {e}")),
        }
    }

    /// Full analysis; cached for five minutes per mint.
    pub async fn analyze(&self, request: &RiskRequest) -> Result<RiskAnalysis> {
        let cache_key = request.mint.to_string();

        if let Some(reason) = self.is_blacklisted(&request.mint) {
            return Ok(RiskAnalysis::from_factors(
                vec![RiskFactor::new(
                    "blacklist",
                    0,
                    0,
                    false,
                    format!("mint is blacklisted: {reason}"),
                )],
                vec![],
            ));
        }

        if let Some(cached) = self.analysis_cache.get(&cache_key) {
            debug!("analysis cache hit for {}", request.mint);
            return Ok(cached);
        }

        let mut factors: Vec<RiskFactor> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // ---- Phase 1: fast fatal signals, fanned out in parallel ----
        let (mint_read, liquidity_read) =
            tokio::join!(self.read_mint(&request.mint), self.liquidity_sol(request));

        let mut phase1_fatal = false;
        match mint_read {
            Ok((info, is_token_2022)) => {
                let (mint_factor, freeze_factor) = authority_factors(&info);
                phase1_fatal |= !mint_factor.passed || !freeze_factor.passed;
                factors.push(mint_factor);
                factors.push(freeze_factor);

                let (ext_factors, ext_warnings, ext_fatal) =
                    extension_factors(&info, is_token_2022);
                phase1_fatal |= ext_fatal;
                factors.extend(ext_factors);
                warnings.extend(ext_warnings);
            }
            Err(e) => {
                factors.push(RiskFactor::new(
                    "mint_authority",
                    0,
                    SCORE_MINT_AUTHORITY_REVOKED,
                    false,
                    format!("mint account unreadable: {e}"),
                ));
                phase1_fatal = true;
            }
        }

        match liquidity_read {
            Ok(liquidity) => {
                let factor = liquidity_factor(liquidity, self.settings.min_liquidity_sol);
                phase1_fatal |= !factor.passed;
                factors.push(factor);
            }
            Err(e) => {
                factors.push(RiskFactor::new(
                    "liquidity",
                    0,
                    SCORE_LIQUIDITY_OK,
                    false,
                    format!("quote vault unreadable: {e}"),
                ));
                phase1_fatal = true;
            }
        }

        if phase1_fatal {
            let analysis = RiskAnalysis::from_factors(factors, warnings);
            self.analysis_cache.insert(cache_key, analysis.clone());
            return Ok(analysis);
        }

        // ---- Phase 2: holder, LP and creator analysis ----
        match self.holder_snapshot(request).await {
            Ok(snapshot) => {
                factors.push(holder_distribution_factor(
                    &snapshot,
                    self.settings.max_top_holder_percent,
                ));
                if let Some(creator_pct) = snapshot.creator_percent {
                    factors.push(creator_factor(creator_pct));
                }
            }
            Err(e) => {
                warn!("holder analysis failed for {}: {e}", request.mint);
                warnings.push(format!("holder analysis unavailable: {e}"));
            }
        }

        if let Some(lp_mint) = request.lp_mint {
            match self.lp_locked_fraction(&lp_mint).await {
                Ok((fraction, burned)) => factors.push(lp_lock_factor(fraction, burned)),
                Err(e) => {
                    warn!("lp lock analysis failed for {}: {e}", request.mint);
                    warnings.push(format!("lp lock analysis unavailable: {e}"));
                }
            }
        }

        // ---- Phase 3: sell simulation ----
        if self.settings.enable_honeypot_check {
            match self.simulator.simulate_sell(request).await {
                Ok(verdict) => {
                    if matches!(verdict, SellSimVerdict::Honeypot { .. }) {
                        self.blacklist_mint(&request.mint, "sell simulation honeypot");
                    }
                    let (factor, sim_warnings) = honeypot_factor(&verdict);
                    factors.push(factor);
                    warnings.extend(sim_warnings);
                }
                Err(e) => {
                    warn!("sell simulation failed for {}: {e}", request.mint);
                    warnings.push(format!("sell simulation unavailable: {e}"));
                }
            }
        }

        let analysis = RiskAnalysis::from_factors(factors, warnings);
        info!(
            "🧪 risk analysis {}: score={} passed={} factors={}",
            request.mint,
            analysis.score,
            analysis.passed,
            analysis.factors.len()
        );
        self.analysis_cache.insert(cache_key, analysis.clone());
        Ok(analysis)
    }

    /// One account read; derives the token program and the parsed mint.
    async fn read_mint(&self, mint: &Pubkey) -> Result<(MintInfo, bool)> {
        let account = self
            .rpc
            .get_account_info(mint)
            .await?
            .ok_or_else(|| anyhow!("mint account not found"))?;

        let is_token_2022 = account.owner == *TOKEN_2022_PROGRAM;
        if !is_token_2022 && account.owner != *TOKEN_PROGRAM {
            return Err(anyhow!("account not owned by a token program"));
        }
        let info =
            MintInfo::parse(&account.data).ok_or_else(|| anyhow!("mint layout unparseable"))?;
        Ok((info, is_token_2022))
    }

    /// Pool liquidity in SOL-equivalent read from the quote vault.
    async fn liquidity_sol(&self, request: &RiskRequest) -> Result<f64> {
        if request.quote_mint == *WSOL {
            let lamports = self.rpc.get_balance(&request.quote_vault).await?;
            return Ok(lamports_to_sol(lamports));
        }
        if request.quote_mint == *USDC || request.quote_mint == *USDT {
            let balance = self.rpc.get_token_account_balance(&request.quote_vault).await?;
            let usd = balance.ui_amount.unwrap_or(0.0);
            return Ok(usd / STABLE_SOL_RATIO);
        }
        let balance = self.rpc.get_token_account_balance(&request.quote_vault).await?;
        Ok(balance.ui_amount.unwrap_or(0.0))
    }

    /// Largest-account concentration, pool vaults excluded.
    async fn holder_snapshot(&self, request: &RiskRequest) -> Result<HolderSnapshot> {
        let (largest, supply) = tokio::join!(
            self.rpc.get_token_largest_accounts(&request.mint),
            self.rpc.get_token_supply(&request.mint)
        );
        let largest = largest?;
        let supply_raw: u128 = supply?
            .amount
            .parse()
            .map_err(|_| anyhow!("unparseable token supply"))?;
        if supply_raw == 0 {
            return Err(anyhow!("token supply is zero"));
        }

        let mut amounts: Vec<(Pubkey, u128)> = Vec::new();
        for balance in &largest {
            let address = Pubkey::from_str(&balance.address)
                .map_err(|e| anyhow!("bad holder address: {e}"))?;
            // The pool's own custody accounts are liquidity, not holders.
            if address == request.base_vault || address == request.pool {
                continue;
            }
            let amount: u128 = balance.amount.amount.parse().unwrap_or(0);
            amounts.push((address, amount));
        }
        amounts.sort_by(|a, b| b.1.cmp(&a.1));

        let pct = |taken: usize| -> f64 {
            let sum: u128 = amounts.iter().take(taken).map(|(_, a)| *a).sum();
            sum as f64 / supply_raw as f64 * 100.0
        };
        let (top1, top5, top10) = (pct(1), pct(5), pct(10));

        // Creator attribution needs the owner of each token account.
        let creator_percent = match request.creator {
            None => None,
            Some(creator) => {
                let addresses: Vec<Pubkey> = amounts.iter().map(|(a, _)| *a).collect();
                let accounts = self.rpc.get_multiple_account_infos(&addresses).await?;
                let mut held: u128 = 0;
                for ((_, amount), account) in amounts.iter().zip(accounts.iter()) {
                    if let Some(account) = account {
                        if let Some(token_account) = TokenAccountInfo::parse(&account.data) {
                            if token_account.owner == creator {
                                held += amount;
                            }
                        }
                    }
                }
                Some(held as f64 / supply_raw as f64 * 100.0)
            }
        };

        Ok(HolderSnapshot {
            top1,
            top5,
            top10,
            creator_percent,
        })
    }

    /// Fraction of LP supply that is locked or burned, plus whether the
    /// lock is a burn. Circulating below 10% of supply counts as burned.
    async fn lp_locked_fraction(&self, lp_mint: &Pubkey) -> Result<(f64, bool)> {
        let (largest, supply) = tokio::join!(
            self.rpc.get_token_largest_accounts(lp_mint),
            self.rpc.get_token_supply(lp_mint)
        );
        let largest = largest?;
        let supply_raw: u128 = supply?
            .amount
            .parse()
            .map_err(|_| anyhow!("unparseable lp supply"))?;
        if supply_raw == 0 {
            // All LP burned: nothing circulates.
            return Ok((1.0, true));
        }

        let circulating: u128 = largest
            .iter()
            .map(|b| b.amount.amount.parse::<u128>().unwrap_or(0))
            .sum();
        if (circulating as f64) < supply_raw as f64 * 0.10 {
            return Ok((1.0, true));
        }

        // Count holdings owned by the incinerator as locked.
        let incinerator = Pubkey::from_str(INCINERATOR).expect("static address");
        let addresses: Vec<Pubkey> = largest
            .iter()
            .filter_map(|b| Pubkey::from_str(&b.address).ok())
            .collect();
        let accounts = self.rpc.get_multiple_account_infos(&addresses).await?;
        let mut locked: u128 = supply_raw.saturating_sub(circulating);
        for (balance, account) in largest.iter().zip(accounts.iter()) {
            if let Some(account) = account {
                if let Some(token_account) = TokenAccountInfo::parse(&account.data) {
                    if token_account.owner == incinerator {
                        locked += balance.amount.amount.parse::<u128>().unwrap_or(0);
                    }
                }
            }
        }
        Ok(((locked as f64 / supply_raw as f64).min(1.0), false))
    }

    pub fn cache_len(&self) -> usize {
        self.analysis_cache.len()
    }
}

// ----------------------------------------------------------------------
// Factor builders (pure; unit-tested below)
// ----------------------------------------------------------------------

fn authority_factors(info: &MintInfo) -> (RiskFactor, RiskFactor) {
    let mint_factor = match info.mint_authority {
        None => RiskFactor::new(
            "mint_authority",
            SCORE_MINT_AUTHORITY_REVOKED,
            SCORE_MINT_AUTHORITY_REVOKED,
            true,
            "mint authority revoked".to_string(),
        ),
        Some(authority) => RiskFactor::new(
            "mint_authority",
            0,
            SCORE_MINT_AUTHORITY_REVOKED,
            false,
            format!("mint authority still held by {authority}"),
        ),
    };
    let freeze_factor = match info.freeze_authority {
        None => RiskFactor::new(
            "freeze_authority",
            SCORE_FREEZE_AUTHORITY_REVOKED,
            SCORE_FREEZE_AUTHORITY_REVOKED,
            true,
            "freeze authority revoked".to_string(),
        ),
        Some(authority) => RiskFactor::new(
            "freeze_authority",
            0,
            SCORE_FREEZE_AUTHORITY_REVOKED,
            false,
            format!("freeze authority still held by {authority}"),
        ),
    };
    (mint_factor, freeze_factor)
}

/// Extension scoring: standard SPL +10, benign token-2022 +15, transfer
/// fees tiered, frozen default state penalized, killer extensions fatal.
fn extension_factors(
    info: &MintInfo,
    is_token_2022: bool,
) -> (Vec<RiskFactor>, Vec<String>, bool) {
    let mut factors = Vec::new();
    let mut warnings = Vec::new();
    let mut fatal = false;

    let critical = info.critical_extensions();
    if !critical.is_empty() {
        fatal = true;
        factors.push(RiskFactor::new(
            "token_extensions",
            -100,
            SCORE_BENIGN_TOKEN_2022,
            false,
            format!("sell-denying extensions present: {}", critical.join(",")),
        ));
        return (factors, warnings, fatal);
    }

    if !is_token_2022 {
        factors.push(RiskFactor::new(
            "token_extensions",
            SCORE_STANDARD_SPL,
            SCORE_BENIGN_TOKEN_2022,
            true,
            "standard SPL token".to_string(),
        ));
        return (factors, warnings, fatal);
    }

    factors.push(RiskFactor::new(
        "token_extensions",
        SCORE_BENIGN_TOKEN_2022,
        SCORE_BENIGN_TOKEN_2022,
        true,
        "token-2022 with benign extensions only".to_string(),
    ));

    if let Some(bps) = info.transfer_fee_bps() {
        let percent = bps as f64 / 100.0;
        let factor = if percent > 1.0 {
            RiskFactor::new(
                "transfer_fee",
                -15,
                0,
                false,
                format!("transfer fee {percent:.2}% exceeds 1%"),
            )
        } else if percent > 0.1 {
            warnings.push(format!("transfer fee {percent:.2}%"));
            RiskFactor::new(
                "transfer_fee",
                -5,
                0,
                true,
                format!("transfer fee {percent:.2}%"),
            )
        } else {
            RiskFactor::new(
                "transfer_fee",
                0,
                0,
                true,
                format!("negligible transfer fee {percent:.2}%"),
            )
        };
        factors.push(factor);
    }

    if info.default_state_frozen() {
        factors.push(RiskFactor::new(
            "default_account_state",
            -8,
            0,
            false,
            "new accounts default to frozen".to_string(),
        ));
    }

    (factors, warnings, fatal)
}

fn liquidity_factor(liquidity_sol: f64, min_liquidity_sol: f64) -> RiskFactor {
    let prorated = ((liquidity_sol / LIQUIDITY_FULL_SCORE_SOL) * SCORE_LIQUIDITY_OK as f64)
        .round()
        .clamp(0.0, SCORE_LIQUIDITY_OK as f64) as i32;
    let passed = liquidity_sol >= min_liquidity_sol;
    RiskFactor::new(
        "liquidity",
        if passed { prorated } else { 0 },
        SCORE_LIQUIDITY_OK,
        passed,
        format!("pool liquidity {liquidity_sol:.2} SOL (min {min_liquidity_sol:.2})"),
    )
}

fn holder_distribution_factor(snapshot: &HolderSnapshot, max_top_holder: f64) -> RiskFactor {
    let concentration = if snapshot.top1 <= 10.0 && snapshot.top5 <= 30.0 {
        "low"
    } else if snapshot.top1 <= 20.0 && snapshot.top5 <= 50.0 {
        "medium"
    } else {
        "high"
    };
    let overrun = (snapshot.top1 - max_top_holder).max(0.0);
    let penalty = (overrun.round() as i32 * TOP_HOLDER_PENALTY_PER_POINT).min(TOP_HOLDER_PENALTY_CAP);
    RiskFactor::new(
        "holder_distribution",
        -penalty,
        0,
        overrun <= 0.0,
        format!(
            "top1 {:.1}% top5 {:.1}% top10 {:.1}% concentration={concentration}",
            snapshot.top1, snapshot.top5, snapshot.top10
        ),
    )
}

fn lp_lock_factor(fraction: f64, burned: bool) -> RiskFactor {
    let percent = fraction * 100.0;
    if fraction >= LP_LOCK_FULL_FRACTION {
        // Burned LP is the strongest form of lock; duration bonus applies.
        let bonus = if burned { SCORE_LP_LOCK_DURATION_BONUS } else { 0 };
        RiskFactor::new(
            "lp_lock",
            SCORE_LP_LOCKED + bonus,
            SCORE_LP_LOCKED + SCORE_LP_LOCK_DURATION_BONUS,
            true,
            format!("{percent:.0}% of LP locked{}", if burned { " (burned)" } else { "" }),
        )
    } else if fraction >= LP_LOCK_PARTIAL_FRACTION {
        RiskFactor::new(
            "lp_lock",
            SCORE_LP_LOCKED / 2,
            SCORE_LP_LOCKED + SCORE_LP_LOCK_DURATION_BONUS,
            true,
            format!("{percent:.0}% of LP locked (partial)"),
        )
    } else {
        RiskFactor::new(
            "lp_lock",
            0,
            SCORE_LP_LOCKED + SCORE_LP_LOCK_DURATION_BONUS,
            false,
            format!("only {percent:.0}% of LP locked"),
        )
    }
}

fn creator_factor(creator_percent: f64) -> RiskFactor {
    if creator_percent > 20.0 {
        RiskFactor::new(
            "creator_holdings",
            -15,
            0,
            false,
            format!("creator holds {creator_percent:.1}% of supply"),
        )
    } else if creator_percent > 10.0 {
        RiskFactor::new(
            "creator_holdings",
            -5,
            0,
            true,
            format!("creator holds {creator_percent:.1}% of supply"),
        )
    } else {
        RiskFactor::new(
            "creator_holdings",
            0,
            0,
            true,
            format!("creator holds {creator_percent:.1}% of supply"),
        )
    }
}

fn honeypot_factor(verdict: &SellSimVerdict) -> (RiskFactor, Vec<String>) {
    let mut warnings = Vec::new();
    let factor = match verdict {
        SellSimVerdict::Passed { tax_percent } => RiskFactor::new(
            "honeypot",
            SCORE_HONEYPOT_PASSED,
            SCORE_HONEYPOT_PASSED,
            true,
            match tax_percent {
                Some(tax) => format!("sell simulated cleanly (tax {tax:.1}%)"),
                None => "sell simulated cleanly".to_string(),
            },
        ),
        SellSimVerdict::PartialPass => RiskFactor::new(
            "honeypot",
            SCORE_HONEYPOT_PASSED / 2,
            SCORE_HONEYPOT_PASSED,
            true,
            "could not fully verify sell (insufficient funds)".to_string(),
        ),
        SellSimVerdict::MaxTxLimit => {
            warnings.push("token enforces a max transaction limit".to_string());
            RiskFactor::new(
                "honeypot",
                -5,
                SCORE_HONEYPOT_PASSED,
                true,
                "sellable but transfer-capped".to_string(),
            )
        }
        SellSimVerdict::TaxTooHigh { tax_percent } => {
            warnings.push(format!("sell tax {tax_percent:.1}% above configured cap"));
            RiskFactor::new(
                "honeypot",
                -10,
                SCORE_HONEYPOT_PASSED,
                true,
                format!("sell tax {tax_percent:.1}% too high"),
            )
        }
        SellSimVerdict::Honeypot { reason } => RiskFactor::new(
            "honeypot",
            -30,
            SCORE_HONEYPOT_PASSED,
            false,
            format!("sell blocked: {reason}"),
        ),
        SellSimVerdict::Inconclusive { reason } => {
            warnings.push(format!("sell simulation inconclusive: {reason}"));
            RiskFactor::new(
                "honeypot",
                0,
                SCORE_HONEYPOT_PASSED,
                true,
                format!("simulation inconclusive: {reason}"),
            )
        }
        SellSimVerdict::Skipped { reason } => RiskFactor::new(
            "honeypot",
            0,
            0,
            true,
            format!("sell simulation skipped: {reason}"),
        ),
    };
    (factor, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_extensions::test_fixtures;
    use crate::token_extensions::{EXT_MINT_CLOSE_AUTHORITY, EXT_TRANSFER_FEE_CONFIG};

    fn snapshot(top1: f64, top5: f64, top10: f64) -> HolderSnapshot {
        HolderSnapshot {
            top1,
            top5,
            top10,
            creator_percent: None,
        }
    }

    #[test]
    fn test_authority_factors_score_revocation() {
        let info = MintInfo::parse(&test_fixtures::encode_mint(None, 0, 6, None)).unwrap();
        let (mint_factor, freeze_factor) = authority_factors(&info);
        assert!(mint_factor.passed);
        assert_eq!(mint_factor.score, SCORE_MINT_AUTHORITY_REVOKED);
        assert!(freeze_factor.passed);
        assert_eq!(freeze_factor.score, SCORE_FREEZE_AUTHORITY_REVOKED);
    }

    #[test]
    fn test_live_mint_authority_is_critical_failure() {
        let info = MintInfo::parse(&test_fixtures::encode_mint(
            Some(Pubkey::new_unique()),
            0,
            6,
            None,
        ))
        .unwrap();
        let (mint_factor, _) = authority_factors(&info);
        assert!(!mint_factor.passed);
        assert!(mint_factor.is_critical_failure());
    }

    #[test]
    fn test_critical_extension_is_fatal_and_sinks_score() {
        let data = test_fixtures::with_extensions(
            test_fixtures::encode_mint(None, 0, 6, None),
            &[(EXT_MINT_CLOSE_AUTHORITY, vec![0u8; 32])],
        );
        let info = MintInfo::parse(&data).unwrap();
        let (factors, _, fatal) = extension_factors(&info, true);
        assert!(fatal);
        let analysis = RiskAnalysis::from_factors(factors, vec![]);
        assert!(!analysis.passed);
        assert_eq!(analysis.score, 0);
    }

    #[test]
    fn test_transfer_fee_tiers() {
        for (bps, expect_fail, expect_score) in
            [(500u16, true, -15), (50, false, -5), (5, false, 0)]
        {
            let data = test_fixtures::with_extensions(
                test_fixtures::encode_mint(None, 0, 6, None),
                &[(
                    EXT_TRANSFER_FEE_CONFIG,
                    test_fixtures::transfer_fee_value(bps, 0),
                )],
            );
            let info = MintInfo::parse(&data).unwrap();
            let (factors, _, fatal) = extension_factors(&info, true);
            assert!(!fatal);
            let fee = factors.iter().find(|f| f.name == "transfer_fee").unwrap();
            assert_eq!(!fee.passed, expect_fail, "bps={bps}");
            assert_eq!(fee.score, expect_score, "bps={bps}");
        }
    }

    #[test]
    fn test_liquidity_prorates_below_ten_sol() {
        let full = liquidity_factor(12.5, 1.0);
        assert!(full.passed);
        assert_eq!(full.score, SCORE_LIQUIDITY_OK);

        let half = liquidity_factor(5.0, 1.0);
        assert!(half.passed);
        assert_eq!(half.score, 5);

        let starved = liquidity_factor(0.4, 1.0);
        assert!(!starved.passed);
        assert_eq!(starved.score, 0);
    }

    #[test]
    fn test_holder_concentration_classes() {
        let low = holder_distribution_factor(&snapshot(8.0, 25.0, 40.0), 20.0);
        assert!(low.passed);
        assert!(low.details.contains("concentration=low"));

        let medium = holder_distribution_factor(&snapshot(15.0, 45.0, 60.0), 20.0);
        assert!(medium.passed);
        assert!(medium.details.contains("concentration=medium"));

        let high = holder_distribution_factor(&snapshot(35.0, 70.0, 85.0), 20.0);
        assert!(!high.passed);
        assert!(high.details.contains("concentration=high"));
        assert_eq!(high.score, -15);
        assert!(high.is_critical_failure());
    }

    #[test]
    fn test_holder_penalty_caps_at_twenty() {
        let extreme = holder_distribution_factor(&snapshot(95.0, 99.0, 99.9), 20.0);
        assert_eq!(extreme.score, -TOP_HOLDER_PENALTY_CAP);
    }

    #[test]
    fn test_lp_lock_tiers() {
        let burned = lp_lock_factor(1.0, true);
        assert_eq!(burned.score, SCORE_LP_LOCKED + SCORE_LP_LOCK_DURATION_BONUS);
        assert!(burned.passed);

        let locked = lp_lock_factor(0.95, false);
        assert_eq!(locked.score, SCORE_LP_LOCKED);

        let partial = lp_lock_factor(0.6, false);
        assert_eq!(partial.score, SCORE_LP_LOCKED / 2);
        assert!(partial.passed);

        let unlocked = lp_lock_factor(0.2, false);
        assert!(!unlocked.passed);
        assert_eq!(unlocked.score, 0);
    }

    #[test]
    fn test_creator_holdings_tiers() {
        assert!(!creator_factor(35.0).passed);
        assert_eq!(creator_factor(35.0).score, -15);
        assert!(creator_factor(12.0).passed);
        assert_eq!(creator_factor(12.0).score, -5);
        assert_eq!(creator_factor(3.0).score, 0);
    }

    #[test]
    fn test_honeypot_factor_mapping() {
        let (passed, _) = honeypot_factor(&SellSimVerdict::Passed { tax_percent: None });
        assert_eq!(passed.score, SCORE_HONEYPOT_PASSED);

        let (partial, _) = honeypot_factor(&SellSimVerdict::PartialPass);
        assert_eq!(partial.score, SCORE_HONEYPOT_PASSED / 2);
        assert!(partial.passed);

        let (hp, _) = honeypot_factor(&SellSimVerdict::Honeypot {
            reason: "blocked".to_string(),
        });
        assert!(!hp.passed);
        assert!(hp.is_critical_failure());

        let (maxed, warnings) = honeypot_factor(&SellSimVerdict::MaxTxLimit);
        assert!(maxed.passed);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_happy_path_factor_set_scores_high() {
        // Clean pumpfun launch: revoked authorities, standard SPL, deep
        // liquidity, dispersed holders, clean sell sim.
        let info = MintInfo::parse(&test_fixtures::encode_mint(None, 0, 6, None)).unwrap();
        let (mint_factor, freeze_factor) = authority_factors(&info);
        let (ext_factors, _, _) = extension_factors(&info, false);
        let mut factors = vec![mint_factor, freeze_factor];
        factors.extend(ext_factors);
        factors.push(liquidity_factor(12.5, 1.0));
        factors.push(holder_distribution_factor(&snapshot(8.0, 22.0, 35.0), 20.0));
        let (hp, _) = honeypot_factor(&SellSimVerdict::Passed { tax_percent: None });
        factors.push(hp);

        let analysis = RiskAnalysis::from_factors(factors, vec![]);
        assert!(analysis.passed);
        assert_eq!(analysis.score, 100);
    }
}
