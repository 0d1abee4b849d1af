//! Raydium AMM V4 decoding: pool-state accounts and `initialize2`
//! instructions into typed pool events.
//!
//! The pool account is a fixed little-endian layout; offsets live in
//! `constants.rs` and the round-trip fixture test below is the contract
//! for them. Anything that does not look like a live pool decodes to
//! `None`; plenty of accounts owned by the AMM program are not pools.

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::constants::*;
use crate::types::{DexKind, ParsedTransaction, PoolEvent};

/// The slice of AMM v4 pool state the sniper consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaydiumPoolState {
    pub status: u64,
    pub base_decimal: u8,
    pub quote_decimal: u8,
    pub pool_open_time: u64,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
}

impl RaydiumPoolState {
    /// Parse the fixed layout; `None` for anything too small.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < RAYDIUM_POOL_MIN_LEN {
            return None;
        }
        Some(Self {
            status: read_u64(data, RAYDIUM_OFF_STATUS)?,
            base_decimal: read_u64(data, RAYDIUM_OFF_BASE_DECIMAL)? as u8,
            quote_decimal: read_u64(data, RAYDIUM_OFF_QUOTE_DECIMAL)? as u8,
            pool_open_time: read_u64(data, RAYDIUM_OFF_POOL_OPEN_TIME)?,
            base_vault: read_pubkey(data, RAYDIUM_OFF_BASE_VAULT)?,
            quote_vault: read_pubkey(data, RAYDIUM_OFF_QUOTE_VAULT)?,
            base_mint: read_pubkey(data, RAYDIUM_OFF_BASE_MINT)?,
            quote_mint: read_pubkey(data, RAYDIUM_OFF_QUOTE_MINT)?,
            lp_mint: read_pubkey(data, RAYDIUM_OFF_LP_MINT)?,
            open_orders: read_pubkey(data, RAYDIUM_OFF_OPEN_ORDERS)?,
            market_id: read_pubkey(data, RAYDIUM_OFF_MARKET_ID)?,
            market_program: read_pubkey(data, RAYDIUM_OFF_MARKET_PROGRAM)?,
            target_orders: read_pubkey(data, RAYDIUM_OFF_TARGET_ORDERS)?,
            withdraw_queue: read_pubkey(data, RAYDIUM_OFF_WITHDRAW_QUEUE)?,
        })
    }

    pub fn is_live(&self) -> bool {
        self.status == RAYDIUM_STATUS_INITIALIZED || self.status == RAYDIUM_STATUS_SWAP_ENABLED
    }

    /// Serialize back into the account layout (fixture building and the
    /// round-trip contract test).
    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; RAYDIUM_POOL_MIN_LEN];
        write_u64(&mut data, RAYDIUM_OFF_STATUS, self.status);
        write_u64(&mut data, RAYDIUM_OFF_BASE_DECIMAL, self.base_decimal as u64);
        write_u64(&mut data, RAYDIUM_OFF_QUOTE_DECIMAL, self.quote_decimal as u64);
        write_u64(&mut data, RAYDIUM_OFF_POOL_OPEN_TIME, self.pool_open_time);
        write_pubkey(&mut data, RAYDIUM_OFF_BASE_VAULT, &self.base_vault);
        write_pubkey(&mut data, RAYDIUM_OFF_QUOTE_VAULT, &self.quote_vault);
        write_pubkey(&mut data, RAYDIUM_OFF_BASE_MINT, &self.base_mint);
        write_pubkey(&mut data, RAYDIUM_OFF_QUOTE_MINT, &self.quote_mint);
        write_pubkey(&mut data, RAYDIUM_OFF_LP_MINT, &self.lp_mint);
        write_pubkey(&mut data, RAYDIUM_OFF_OPEN_ORDERS, &self.open_orders);
        write_pubkey(&mut data, RAYDIUM_OFF_MARKET_ID, &self.market_id);
        write_pubkey(&mut data, RAYDIUM_OFF_MARKET_PROGRAM, &self.market_program);
        write_pubkey(&mut data, RAYDIUM_OFF_TARGET_ORDERS, &self.target_orders);
        write_pubkey(&mut data, RAYDIUM_OFF_WITHDRAW_QUEUE, &self.withdraw_queue);
        data
    }
}

/// Mints treated as the quote side of a pair
fn is_quote_mint(mint: &Pubkey) -> bool {
    *mint == *WSOL || *mint == *USDC || *mint == *USDT
}

#[derive(Debug, Default)]
pub struct RaydiumDecoder;

impl RaydiumDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a pool account update. Yields `NewPool` only for live
    /// status values; everything else is ignored.
    pub fn parse_account(&self, address: &Pubkey, data: &[u8], slot: u64) -> Option<PoolEvent> {
        let state = RaydiumPoolState::parse(data)?;
        if !state.is_live() {
            debug!("raydium pool {address} status {} not live, skipping", state.status);
            return None;
        }

        // The tradable token is the non-quote side of the pair.
        let (mint, base_mint, quote_mint, base_vault, quote_vault) =
            if is_quote_mint(&state.base_mint) {
                (
                    state.quote_mint,
                    state.quote_mint,
                    state.base_mint,
                    state.quote_vault,
                    state.base_vault,
                )
            } else {
                (
                    state.base_mint,
                    state.base_mint,
                    state.quote_mint,
                    state.base_vault,
                    state.quote_vault,
                )
            };

        Some(PoolEvent::NewPool {
            dex: DexKind::Raydium,
            mint,
            pool: *address,
            base_mint,
            quote_mint,
            base_vault,
            quote_vault,
            lp_mint: Some(state.lp_mint),
            open_time: Some(state.pool_open_time as i64),
            slot,
            // Account updates carry no transaction signature; a synthetic
            // per-pool key keeps repeated writes dedupable upstream.
            signature: format!("account:{address}"),
            timestamp: Utc::now(),
        })
    }

    /// Walk top-level instructions for an `initialize2` and read its
    /// fixed account slots.
    pub fn parse_transaction(&self, tx: &ParsedTransaction) -> Option<PoolEvent> {
        for ix in &tx.instructions {
            if ix.program_id != *RAYDIUM_AMM_V4_PROGRAM {
                continue;
            }
            if ix.data.len() < 8 || ix.data[..8] != RAYDIUM_INITIALIZE2_DISCRIMINATOR {
                continue;
            }
            if ix.accounts.len() < RAYDIUM_INIT2_MIN_ACCOUNTS {
                debug!(
                    "initialize2 in {} has {} accounts, need {}",
                    tx.signature,
                    ix.accounts.len(),
                    RAYDIUM_INIT2_MIN_ACCOUNTS
                );
                continue;
            }

            let pool = ix.accounts[RAYDIUM_INIT2_SLOT_AMM];
            let lp_mint = ix.accounts[RAYDIUM_INIT2_SLOT_LP_MINT];
            let coin_mint = ix.accounts[RAYDIUM_INIT2_SLOT_COIN_MINT];
            let pc_mint = ix.accounts[RAYDIUM_INIT2_SLOT_PC_MINT];
            let coin_vault = ix.accounts[RAYDIUM_INIT2_SLOT_COIN_VAULT];
            let pc_vault = ix.accounts[RAYDIUM_INIT2_SLOT_PC_VAULT];

            let (mint, base_mint, quote_mint, base_vault, quote_vault) =
                if is_quote_mint(&coin_mint) {
                    (pc_mint, pc_mint, coin_mint, pc_vault, coin_vault)
                } else {
                    (coin_mint, coin_mint, pc_mint, coin_vault, pc_vault)
                };

            // initialize2 data: discriminator, nonce u8, open_time u64 LE
            let open_time = if ix.data.len() >= 17 {
                read_u64(&ix.data, 9).map(|t| t as i64)
            } else {
                None
            };

            return Some(PoolEvent::NewPool {
                dex: DexKind::Raydium,
                mint,
                pool,
                base_mint,
                quote_mint,
                base_vault,
                quote_vault,
                lp_mint: Some(lp_mint),
                open_time,
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

fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_pubkey(data: &[u8], offset: usize) -> Option<Pubkey> {
    data.get(offset..offset + 32)
        .map(|b| Pubkey::new_from_array(b.try_into().unwrap()))
}

fn write_pubkey(data: &mut [u8], offset: usize, value: &Pubkey) {
    data[offset..offset + 32].copy_from_slice(value.as_ref());
}
