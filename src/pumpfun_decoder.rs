//! Pumpfun bonding-curve decoding and constant-product pricing math.
//!
//! Curve accounts are a fixed little-endian layout behind an 8-byte
//! Anchor discriminator. All pricing math runs in widened u128 with the
//! multiplications ordered before the divisions, so intermediate
//! products cannot overflow and truncation happens exactly once.

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::constants::*;
use crate::types::{DexKind, ParsedTransaction, PoolEvent};

/// Bonding-curve account contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondingCurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
}

impl BondingCurveState {
    /// Parse a curve account; `None` for wrong discriminator or size.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PUMPFUN_CURVE_MIN_LEN {
            return None;
        }
        if data[..8] != PUMPFUN_CURVE_DISCRIMINATOR {
            return None;
        }
        Some(Self {
            virtual_token_reserves: read_u64(data, PUMPFUN_OFF_VIRTUAL_TOKEN_RESERVES)?,
            virtual_sol_reserves: read_u64(data, PUMPFUN_OFF_VIRTUAL_SOL_RESERVES)?,
            real_token_reserves: read_u64(data, PUMPFUN_OFF_REAL_TOKEN_RESERVES)?,
            real_sol_reserves: read_u64(data, PUMPFUN_OFF_REAL_SOL_RESERVES)?,
            token_total_supply: read_u64(data, PUMPFUN_OFF_TOKEN_TOTAL_SUPPLY)?,
            complete: data[PUMPFUN_OFF_COMPLETE] != 0,
        })
    }

    /// Serialize back into the account layout (fixtures and tests).
    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; PUMPFUN_CURVE_MIN_LEN];
        data[..8].copy_from_slice(&PUMPFUN_CURVE_DISCRIMINATOR);
        data[PUMPFUN_OFF_VIRTUAL_TOKEN_RESERVES..PUMPFUN_OFF_VIRTUAL_TOKEN_RESERVES + 8]
            .copy_from_slice(&self.virtual_token_reserves.to_le_bytes());
        data[PUMPFUN_OFF_VIRTUAL_SOL_RESERVES..PUMPFUN_OFF_VIRTUAL_SOL_RESERVES + 8]
            .copy_from_slice(&self.virtual_sol_reserves.to_le_bytes());
        data[PUMPFUN_OFF_REAL_TOKEN_RESERVES..PUMPFUN_OFF_REAL_TOKEN_RESERVES + 8]
            .copy_from_slice(&self.real_token_reserves.to_le_bytes());
        data[PUMPFUN_OFF_REAL_SOL_RESERVES..PUMPFUN_OFF_REAL_SOL_RESERVES + 8]
            .copy_from_slice(&self.real_sol_reserves.to_le_bytes());
        data[PUMPFUN_OFF_TOKEN_TOTAL_SUPPLY..PUMPFUN_OFF_TOKEN_TOTAL_SUPPLY + 8]
            .copy_from_slice(&self.token_total_supply.to_le_bytes());
        data[PUMPFUN_OFF_COMPLETE] = self.complete as u8;
        data
    }

    /// A curve whose virtual reserves exactly match the protocol launch
    /// constants has seen no trade yet.
    pub fn is_fresh_curve(&self) -> bool {
        self.virtual_sol_reserves == PUMPFUN_INITIAL_VIRTUAL_SOL
            && self.virtual_token_reserves == PUMPFUN_INITIAL_VIRTUAL_TOKENS
    }

    /// Spot price in the sniper's canonical unit (SOL per token, with the
    /// SOL(9)/token(6) decimal mismatch corrected by a single 10^3
    /// scalar). Every price in the pipeline (entry, TP/SL, refresh)
    /// comes through here so comparisons stay unit-consistent.
    pub fn spot_price(&self) -> f64 {
        if self.virtual_token_reserves == 0 {
            return 0.0;
        }
        self.virtual_sol_reserves as f64 / self.virtual_token_reserves as f64
            * PUMPFUN_DECIMAL_CORRECTION
    }

    /// Token output for `sol_in` lamports, fee deducted up front.
    pub fn buy_output(&self, sol_in: u64) -> u64 {
        if self.virtual_token_reserves == 0 || sol_in == 0 {
            return 0;
        }
        let fee = (sol_in as u128 * PUMPFUN_FEE_BPS as u128) / 10_000;
        let sol_after_fee = sol_in as u128 - fee;
        let v_sol = self.virtual_sol_reserves as u128;
        let v_tok = self.virtual_token_reserves as u128;

        let new_v_sol = v_sol + sol_after_fee;
        // Product before quotient keeps full precision.
        let new_v_tok = (v_sol * v_tok) / new_v_sol;
        (v_tok - new_v_tok) as u64
    }

    /// Lamport output (net of fee) for selling `tokens_in` raw units.
    pub fn sell_output(&self, tokens_in: u64) -> u64 {
        if self.virtual_token_reserves == 0 || tokens_in == 0 {
            return 0;
        }
        let v_sol = self.virtual_sol_reserves as u128;
        let v_tok = self.virtual_token_reserves as u128;

        let new_v_tok = v_tok + tokens_in as u128;
        let new_v_sol = (v_sol * v_tok) / new_v_tok;
        let gross = v_sol - new_v_sol;
        let net = gross * (10_000 - PUMPFUN_FEE_BPS as u128) / 10_000;
        net as u64
    }

    /// State after a buy of `sol_in` lamports (reserve bookkeeping only)
    pub fn after_buy(&self, sol_in: u64) -> Self {
        let tokens_out = self.buy_output(sol_in);
        let fee = (sol_in as u128 * PUMPFUN_FEE_BPS as u128) / 10_000;
        let sol_after_fee = (sol_in as u128 - fee) as u64;
        Self {
            virtual_token_reserves: self.virtual_token_reserves - tokens_out,
            virtual_sol_reserves: self.virtual_sol_reserves + sol_after_fee,
            real_token_reserves: self.real_token_reserves.saturating_sub(tokens_out),
            real_sol_reserves: self.real_sol_reserves + sol_after_fee,
            token_total_supply: self.token_total_supply,
            complete: self.complete,
        }
    }
}

#[derive(Debug, Default)]
pub struct PumpfunDecoder;

impl PumpfunDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a curve account update. The curve account does not carry
    /// its mint, so the caller supplies it from the create-event index;
    /// without a known mint there is nothing to emit.
    pub fn parse_account(
        &self,
        address: &Pubkey,
        data: &[u8],
        slot: u64,
        known_mint: Option<Pubkey>,
    ) -> Option<PoolEvent> {
        let state = BondingCurveState::parse(data)?;
        let mint = known_mint?;

        if state.complete {
            // A completed curve has migrated to Raydium; curve trades are
            // no longer valid. The synthetic key differs from the launch
            // event's so the migration is not swallowed by dedup.
            return Some(PoolEvent::Migration {
                source_dex: DexKind::Pumpfun,
                target_dex: DexKind::Raydium,
                mint,
                source_pool: *address,
                target_pool: None,
                slot,
                signature: format!("account:{address}:migrated"),
                timestamp: Utc::now(),
            });
        }

        if !state.is_fresh_curve() {
            debug!("curve {address} already traded, not a launch");
            return None;
        }

        Some(PoolEvent::NewPool {
            dex: DexKind::Pumpfun,
            mint,
            pool: *address,
            base_mint: mint,
            quote_mint: *WSOL,
            // The curve account itself custodies the SOL side.
            base_vault: *address,
            quote_vault: *address,
            lp_mint: None,
            open_time: None,
            slot,
            signature: format!("account:{address}"),
            timestamp: Utc::now(),
        })
    }

    /// Walk top-level instructions for a `create` and read its fixed
    /// account slots (0 = mint, 2 = bonding curve).
    pub fn parse_transaction(&self, tx: &ParsedTransaction) -> Option<PoolEvent> {
        for ix in &tx.instructions {
            if ix.program_id != *PUMPFUN_PROGRAM {
                continue;
            }
            if ix.data.len() < 8 || ix.data[..8] != PUMPFUN_CREATE_DISCRIMINATOR {
                continue;
            }
            let mint = *ix.accounts.get(PUMPFUN_CREATE_SLOT_MINT)?;
            let curve = *ix.accounts.get(PUMPFUN_CREATE_SLOT_CURVE)?;
            // Slot 3 is the curve's token vault when present.
            let token_vault = ix.accounts.get(3).copied().unwrap_or(curve);

            return Some(PoolEvent::NewPool {
                dex: DexKind::Pumpfun,
                mint,
                pool: curve,
                base_mint: mint,
                quote_mint: *WSOL,
                base_vault: token_vault,
                quote_vault: curve,
                lp_mint: None,
                open_time: None,
                slot: tx.slot,
                signature: tx.signature.clone(),
                timestamp: Utc::now(),
            });
        }
        None
    }
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecodedInstruction;

    fn fresh_curve() -> BondingCurveState {
        BondingCurveState {
            virtual_token_reserves: PUMPFUN_INITIAL_VIRTUAL_TOKENS,
            virtual_sol_reserves: PUMPFUN_INITIAL_VIRTUAL_SOL,
            real_token_reserves: 793_100_000_000_000,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
        }
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let state = fresh_curve();
        let parsed = BondingCurveState::parse(&state.encode()).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_wrong_discriminator_rejected() {
        let mut data = fresh_curve().encode();
        data[0] ^= 0xff;
        assert!(BondingCurveState::parse(&data).is_none());
    }

    #[test]
    fn test_buy_then_sell_never_profits() {
        // Fee is paid on both legs: round-tripping x SOL returns < x.
        let state = fresh_curve();
        for sol_in in [10_000_000u64, 500_000_000, 5_000_000_000] {
            let tokens = state.buy_output(sol_in);
            assert!(tokens > 0);
            let after = state.after_buy(sol_in);
            let back = after.sell_output(tokens);
            assert!(back <= sol_in, "{back} > {sol_in}");
        }
    }

    #[test]
    fn test_buy_output_monotonic() {
        let state = fresh_curve();
        assert!(state.buy_output(2_000_000_000) > state.buy_output(1_000_000_000));
    }

    #[test]
    fn test_spot_price_applies_decimal_correction() {
        let state = fresh_curve();
        let raw_ratio = state.virtual_sol_reserves as f64 / state.virtual_token_reserves as f64;
        assert_eq!(state.spot_price(), raw_ratio * 1_000.0);
    }

    #[test]
    fn test_fresh_curve_detection() {
        let mut state = fresh_curve();
        assert!(state.is_fresh_curve());
        state.virtual_sol_reserves += 1;
        assert!(!state.is_fresh_curve());
    }

    #[test]
    fn test_account_without_known_mint_yields_nothing() {
        let decoder = PumpfunDecoder::new();
        let curve = Pubkey::new_unique();
        let data = fresh_curve().encode();
        assert!(decoder.parse_account(&curve, &data, 1, None).is_none());
    }

    #[test]
    fn test_fresh_curve_account_emits_new_pool() {
        let decoder = PumpfunDecoder::new();
        let curve = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let event = decoder
            .parse_account(&curve, &fresh_curve().encode(), 7, Some(mint))
            .unwrap();
        match event {
            PoolEvent::NewPool { dex, mint: m, pool, quote_mint, .. } => {
                assert_eq!(dex, DexKind::Pumpfun);
                assert_eq!(m, mint);
                assert_eq!(pool, curve);
                assert_eq!(quote_mint, *WSOL);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_complete_curve_emits_migration() {
        let decoder = PumpfunDecoder::new();
        let mut state = fresh_curve();
        state.complete = true;
        let event = decoder
            .parse_account(&Pubkey::new_unique(), &state.encode(), 7, Some(Pubkey::new_unique()))
            .unwrap();
        match event {
            PoolEvent::Migration { source_dex, target_dex, .. } => {
                assert_eq!(source_dex, DexKind::Pumpfun);
                assert_eq!(target_dex, DexKind::Raydium);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_create_instruction_decodes() {
        let decoder = PumpfunDecoder::new();
        let accounts: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
        let tx = ParsedTransaction {
            signature: "sigCreate".to_string(),
            slot: 11,
            account_keys: accounts.clone(),
            instructions: vec![DecodedInstruction {
                program_id: *PUMPFUN_PROGRAM,
                accounts: accounts.clone(),
                data: PUMPFUN_CREATE_DISCRIMINATOR.to_vec(),
            }],
        };
        let event = decoder.parse_transaction(&tx).unwrap();
        match event {
            PoolEvent::NewPool { mint, pool, signature, .. } => {
                assert_eq!(mint, accounts[PUMPFUN_CREATE_SLOT_MINT]);
                assert_eq!(pool, accounts[PUMPFUN_CREATE_SLOT_CURVE]);
                assert_eq!(signature, "sigCreate");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_buy_instruction_is_not_a_create() {
        let decoder = PumpfunDecoder::new();
        let accounts: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
        let tx = ParsedTransaction {
            signature: "sigBuy".to_string(),
            slot: 11,
            account_keys: accounts.clone(),
            instructions: vec![DecodedInstruction {
                program_id: *PUMPFUN_PROGRAM,
                accounts,
                data: PUMPFUN_BUY_DISCRIMINATOR.to_vec(),
            }],
        };
        assert!(decoder.parse_transaction(&tx).is_none());
    }
}
