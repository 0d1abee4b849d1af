//! Sell-path simulation: can this token actually be sold?
//!
//! Builds a DEX-appropriate sell for a nominal test amount with the
//! configured wallet as signer and simulates it against the current
//! slot. The result interpretation is deliberately coarse: a sell the
//! wallet cannot fund is "could not fully verify", an explicit
//! block/denylist error is a honeypot, a max/limit error is a tradable
//! token with transfer caps, and a clean simulation gets its logs
//! scanned for tax indicators. The Raydium sell instruction is skipped
//! until its account layout is verified against a live pool.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use std::sync::Arc;
use tracing::debug;

use crate::constants::{HONEYPOT_TEST_AMOUNT, TAX_HONEYPOT_PERCENT};
use crate::rpc_manager::RpcProviderManager;
use crate::swap_builder;
use crate::types::{DexKind, RiskRequest};

static TAX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tax[:\s]+(\d+\.?\d*)").unwrap());
static FEE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)fee[:\s]+(\d+\.?\d*)").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum SellSimVerdict {
    /// Simulation succeeded; tax (if any) within tolerance
    Passed { tax_percent: Option<f64> },
    /// Wallet could not fund the test sell; half credit
    PartialPass,
    /// Sellable but the token enforces a transfer cap
    MaxTxLimit,
    /// Simulation succeeded but the detected tax exceeds the configured cap
    TaxTooHigh { tax_percent: f64 },
    /// Sell is blocked outright
    Honeypot { reason: String },
    /// Simulation error with no known interpretation
    Inconclusive { reason: String },
    /// No verified sell path for this DEX
    Skipped { reason: &'static str },
}

pub struct HoneypotSimulator {
    rpc: Arc<RpcProviderManager>,
    wallet: Pubkey,
    max_tax_percent: f64,
}

impl HoneypotSimulator {
    pub fn new(rpc: Arc<RpcProviderManager>, wallet: Pubkey, max_tax_percent: f64) -> Self {
        Self {
            rpc,
            wallet,
            max_tax_percent,
        }
    }

    pub async fn simulate_sell(&self, request: &RiskRequest) -> Result<SellSimVerdict> {
        let instruction = match request.dex {
            DexKind::Pumpfun => swap_builder::pumpfun_sell_instruction(
                &self.wallet,
                &request.mint,
                &request.pool,
                HONEYPOT_TEST_AMOUNT,
                0,
            )?,
            // The AMM v4 sell layout is unverified; a malformed
            // instruction would read as a honeypot and poison the score.
            DexKind::Raydium => {
                return Ok(SellSimVerdict::Skipped {
                    reason: "raydium sell simulation not yet verified",
                })
            }
            DexKind::Orca => {
                return Ok(SellSimVerdict::Skipped {
                    reason: "no orca sell path",
                })
            }
        };

        let blockhash = self.rpc.get_latest_blockhash().await?;
        let message = Message::new_with_blockhash(&[instruction], Some(&self.wallet), &blockhash);
        let transaction = VersionedTransaction::from(Transaction::new_unsigned(message));

        let result = self.rpc.simulate_transaction(&transaction).await?;
        let logs = result.logs.unwrap_or_default();
        let err_text = result.err.map(|e| format!("{e:?}"));
        debug!(
            "sell sim for {}: err={:?} ({} log lines)",
            request.mint,
            err_text,
            logs.len()
        );
        Ok(self.interpret(err_text, &logs))
    }

    fn interpret(&self, err: Option<String>, logs: &[String]) -> SellSimVerdict {
        if let Some(err) = err {
            let haystack = format!("{err} {}", logs.join(" ")).to_ascii_lowercase();
            if haystack.contains("insufficientfunds") || haystack.contains("insufficient funds") {
                return SellSimVerdict::PartialPass;
            }
            if haystack.contains("blocked")
                || haystack.contains("blacklist")
                || haystack.contains("denied")
            {
                return SellSimVerdict::Honeypot { reason: err };
            }
            if haystack.contains("max") || haystack.contains("limit") {
                return SellSimVerdict::MaxTxLimit;
            }
            return SellSimVerdict::Inconclusive { reason: err };
        }

        match detect_tax(logs) {
            Some(tax) if tax > TAX_HONEYPOT_PERCENT => SellSimVerdict::Honeypot {
                reason: format!("simulated sell tax {tax:.1}%"),
            },
            Some(tax) if tax > self.max_tax_percent => SellSimVerdict::TaxTooHigh { tax_percent: tax },
            tax => SellSimVerdict::Passed { tax_percent: tax },
        }
    }
}

/// Scan simulation logs for tax/fee percentage indicators; the highest
/// match wins.
pub fn detect_tax(logs: &[String]) -> Option<f64> {
    let mut highest: Option<f64> = None;
    for line in logs {
        for pattern in [&*TAX_PATTERN, &*FEE_PATTERN] {
            for capture in pattern.captures_iter(line) {
                if let Ok(value) = capture[1].parse::<f64>() {
                    highest = Some(highest.map_or(value, |h: f64| h.max(value)));
                }
            }
        }
    }
    highest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn simulator() -> HoneypotSimulator {
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
        HoneypotSimulator::new(rpc, Pubkey::new_unique(), 10.0)
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insufficient_funds_is_partial_pass() {
        let verdict = simulator().interpret(
            Some("Error: InsufficientFunds".to_string()),
            &[],
        );
        assert_eq!(verdict, SellSimVerdict::PartialPass);
    }

    #[test]
    fn test_blocked_is_honeypot() {
        let verdict = simulator().interpret(
            Some("custom program error".to_string()),
            &lines(&["Program log: transfer blocked for this wallet"]),
        );
        assert!(matches!(verdict, SellSimVerdict::Honeypot { .. }));
    }

    #[test]
    fn test_limit_error_is_max_tx() {
        let verdict = simulator().interpret(
            Some("exceeds max transaction amount".to_string()),
            &[],
        );
        assert_eq!(verdict, SellSimVerdict::MaxTxLimit);
    }

    #[test]
    fn test_unknown_error_is_inconclusive() {
        let verdict = simulator().interpret(Some("weird error".to_string()), &[]);
        assert!(matches!(verdict, SellSimVerdict::Inconclusive { .. }));
    }

    #[test]
    fn test_clean_success_passes_without_tax() {
        let verdict = simulator().interpret(None, &lines(&["Program log: Instruction: Sell"]));
        assert_eq!(verdict, SellSimVerdict::Passed { tax_percent: None });
    }

    #[test]
    fn test_moderate_tax_flagged() {
        let verdict = simulator().interpret(None, &lines(&["Program log: tax: 12.5 applied"]));
        assert_eq!(verdict, SellSimVerdict::TaxTooHigh { tax_percent: 12.5 });
    }

    #[test]
    fn test_extreme_tax_is_honeypot() {
        let verdict = simulator().interpret(None, &lines(&["Program log: fee: 95 of transfer"]));
        assert!(matches!(verdict, SellSimVerdict::Honeypot { .. }));
    }

    #[test]
    fn test_detect_tax_takes_highest() {
        let logs = lines(&["Program log: fee: 2.5", "Program log: tax: 7"]);
        assert_eq!(detect_tax(&logs), Some(7.0));
        assert_eq!(detect_tax(&lines(&["no numbers here"])), None);
    }
}
