//! Global constants for the pool sniper.
//!
//! This module centralizes program ids, wire-format offsets and timing
//! defaults so there is a single source of truth for every magic number.

use once_cell::sync::Lazy;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// SOLANA BLOCKCHAIN CONSTANTS
// ============================================================================

/// 1 SOL = 1 billion lamports
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert lamports to SOL (floating point)
pub const fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Convert SOL to lamports
pub const fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64) as u64
}

/// Maximum transaction compute units
pub const MAX_COMPUTE_UNITS: u32 = 1_400_000;

/// Default compute unit limit requested for swap transactions
pub const SWAP_COMPUTE_UNITS: u32 = 200_000;

// ============================================================================
// PROGRAM IDS
// ============================================================================

/// Raydium AMM V4 program ID
pub const RAYDIUM_AMM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Pumpfun bonding curve program ID
pub const PUMPFUN_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Orca Whirlpools program ID
pub const ORCA_WHIRLPOOLS_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";

/// SPL Token program ID
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Token-2022 program ID
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Associated Token Account program ID
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// Wrapped SOL mint
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// USDC mint (mainnet)
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// USDT mint (mainnet)
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

pub static RAYDIUM_AMM_V4_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| Pubkey::from_str(RAYDIUM_AMM_V4_PROGRAM_ID).unwrap());
pub static PUMPFUN_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| Pubkey::from_str(PUMPFUN_PROGRAM_ID).unwrap());
pub static ORCA_WHIRLPOOLS_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| Pubkey::from_str(ORCA_WHIRLPOOLS_PROGRAM_ID).unwrap());
pub static TOKEN_PROGRAM: Lazy<Pubkey> = Lazy::new(|| Pubkey::from_str(TOKEN_PROGRAM_ID).unwrap());
pub static TOKEN_2022_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| Pubkey::from_str(TOKEN_2022_PROGRAM_ID).unwrap());
pub static ASSOCIATED_TOKEN_PROGRAM: Lazy<Pubkey> =
    Lazy::new(|| Pubkey::from_str(ASSOCIATED_TOKEN_PROGRAM_ID).unwrap());
pub static WSOL: Lazy<Pubkey> = Lazy::new(|| Pubkey::from_str(WSOL_MINT).unwrap());
pub static USDC: Lazy<Pubkey> = Lazy::new(|| Pubkey::from_str(USDC_MINT).unwrap());
pub static USDT: Lazy<Pubkey> = Lazy::new(|| Pubkey::from_str(USDT_MINT).unwrap());

// ============================================================================
// RAYDIUM AMM V4 POOL LAYOUT
// ============================================================================
//
// Fixed little-endian layout: u64 words from offset 0, the pubkey block
// from offset 336. Only fields the sniper consumes are listed; the
// minimum length covers everything read here.

/// Minimum account size accepted as an AMM v4 pool
pub const RAYDIUM_POOL_MIN_LEN: usize = 679;

pub const RAYDIUM_OFF_STATUS: usize = 0;
pub const RAYDIUM_OFF_BASE_DECIMAL: usize = 32;
pub const RAYDIUM_OFF_QUOTE_DECIMAL: usize = 40;
pub const RAYDIUM_OFF_POOL_OPEN_TIME: usize = 224;
pub const RAYDIUM_OFF_BASE_VAULT: usize = 336;
pub const RAYDIUM_OFF_QUOTE_VAULT: usize = 368;
pub const RAYDIUM_OFF_BASE_MINT: usize = 400;
pub const RAYDIUM_OFF_QUOTE_MINT: usize = 432;
pub const RAYDIUM_OFF_LP_MINT: usize = 464;
pub const RAYDIUM_OFF_OPEN_ORDERS: usize = 496;
pub const RAYDIUM_OFF_MARKET_ID: usize = 528;
pub const RAYDIUM_OFF_MARKET_PROGRAM: usize = 560;
pub const RAYDIUM_OFF_TARGET_ORDERS: usize = 592;
pub const RAYDIUM_OFF_WITHDRAW_QUEUE: usize = 624;

/// Pool status values that represent a live, tradable pool
pub const RAYDIUM_STATUS_INITIALIZED: u64 = 1;
pub const RAYDIUM_STATUS_SWAP_ENABLED: u64 = 6;

/// `initialize2` instruction discriminator (8-byte prefix)
pub const RAYDIUM_INITIALIZE2_DISCRIMINATOR: [u8; 8] =
    [0x09, 0xcb, 0xfe, 0x40, 0x59, 0x20, 0xb3, 0x9f];

/// Fixed account slots inside an `initialize2` instruction
pub const RAYDIUM_INIT2_SLOT_AMM: usize = 4;
pub const RAYDIUM_INIT2_SLOT_LP_MINT: usize = 7;
pub const RAYDIUM_INIT2_SLOT_COIN_MINT: usize = 8;
pub const RAYDIUM_INIT2_SLOT_PC_MINT: usize = 9;
pub const RAYDIUM_INIT2_SLOT_COIN_VAULT: usize = 10;
pub const RAYDIUM_INIT2_SLOT_PC_VAULT: usize = 11;
pub const RAYDIUM_INIT2_MIN_ACCOUNTS: usize = 12;

// ============================================================================
// PUMPFUN BONDING CURVE
// ============================================================================

/// Bonding curve account discriminator (`account:BondingCurve`)
pub const PUMPFUN_CURVE_DISCRIMINATOR: [u8; 8] = [0x17, 0xb7, 0xf8, 0x37, 0x60, 0xd8, 0xac, 0x60];

/// Minimum bonding curve account size: 8-byte discriminator, five u64
/// reserve fields, 1-byte `complete` flag
pub const PUMPFUN_CURVE_MIN_LEN: usize = 49;

pub const PUMPFUN_OFF_VIRTUAL_TOKEN_RESERVES: usize = 8;
pub const PUMPFUN_OFF_VIRTUAL_SOL_RESERVES: usize = 16;
pub const PUMPFUN_OFF_REAL_TOKEN_RESERVES: usize = 24;
pub const PUMPFUN_OFF_REAL_SOL_RESERVES: usize = 32;
pub const PUMPFUN_OFF_TOKEN_TOTAL_SUPPLY: usize = 40;
pub const PUMPFUN_OFF_COMPLETE: usize = 48;

/// Virtual reserves a freshly created curve starts with: 30 SOL
pub const PUMPFUN_INITIAL_VIRTUAL_SOL: u64 = 30_000_000_000;

/// Virtual token reserves a freshly created curve starts with (1.073e15)
pub const PUMPFUN_INITIAL_VIRTUAL_TOKENS: u64 = 1_073_000_000_000_000;

/// Curve trade fee in basis points (1%)
pub const PUMPFUN_FEE_BPS: u64 = 100;

/// Instruction discriminators (`global:<name>`)
pub const PUMPFUN_CREATE_DISCRIMINATOR: [u8; 8] = [0x18, 0x1e, 0xc8, 0x28, 0x05, 0x1c, 0x07, 0x77];
pub const PUMPFUN_BUY_DISCRIMINATOR: [u8; 8] = [0x66, 0x06, 0x3d, 0x12, 0x01, 0xda, 0xeb, 0xea];
pub const PUMPFUN_SELL_DISCRIMINATOR: [u8; 8] = [0x33, 0xe6, 0x85, 0xa4, 0x01, 0x7f, 0x83, 0xad];

/// Fixed account slots inside a `create` instruction
pub const PUMPFUN_CREATE_SLOT_MINT: usize = 0;
pub const PUMPFUN_CREATE_SLOT_CURVE: usize = 2;

/// Pumpfun fee recipient + event authority accounts
pub const PUMPFUN_FEE_RECIPIENT: &str = "CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM";
pub const PUMPFUN_EVENT_AUTHORITY: &str = "Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxHp9vN";

/// Pumpfun tokens use 6 decimals while SOL uses 9; spot prices derived
/// from raw reserve ratios must be scaled by 10^3 to land in SOL/token
pub const PUMPFUN_DECIMAL_CORRECTION: f64 = 1_000.0;

// ============================================================================
// JITO BUNDLE CONSTANTS
// ============================================================================

/// Official Jito tip accounts for mainnet-beta
pub const JITO_TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

/// Total cap on waiting for a bundle to land
pub const BUNDLE_TIMEOUT_MS: u64 = 60_000;

/// Interval between `getBundleStatuses` polls
pub const BUNDLE_POLL_INTERVAL_MS: u64 = 2_000;

/// Direct-RPC fallback retry attempts
pub const FALLBACK_MAX_RETRIES: u32 = 3;

/// Base delay for fallback retry backoff
pub const FALLBACK_RETRY_BASE_MS: u64 = 500;

/// Rolling window of successful tips kept for the recommendation
pub const TIP_HISTORY_CAP: usize = 10;

/// Samples required before a tip recommendation is derived
pub const TIP_HISTORY_MIN_SAMPLES: usize = 5;

// ============================================================================
// INGESTION CONSTANTS
// ============================================================================

/// Signature dedup set cap; eviction keeps the most recent half
pub const SIGNATURE_DEDUP_CAP: usize = 10_000;
pub const SIGNATURE_DEDUP_RETAIN: usize = 5_000;

/// Default bound on concurrent transaction fetches
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 2;

/// Default per-fetch timeout
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval for the last-resort signature poller
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 2_000;

/// Signatures fetched per polling round and program
pub const POLLING_SIGNATURE_LIMIT: usize = 20;

/// WebSocket reconnect backoff
pub const WS_BACKOFF_BASE_MS: u64 = 1_000;
pub const WS_BACKOFF_MAX_MS: u64 = 30_000;

/// gRPC capability probe window
pub const GRPC_PROBE_TIMEOUT_MS: u64 = 3_000;

// ============================================================================
// RPC PROVIDER CONSTANTS
// ============================================================================

/// Consecutive failures before a provider is marked unhealthy
pub const PROVIDER_FAILURE_THRESHOLD: u32 = 3;

/// Cooldown before an unhealthy provider becomes eligible again
pub const PROVIDER_COOLDOWN: Duration = Duration::from_secs(30);

/// Max addresses per `getMultipleAccounts` call
pub const MAX_ACCOUNTS_PER_BATCH: usize = 100;

/// Default TTL for cached account reads
pub const DEFAULT_RPC_CACHE_TTL_MS: u64 = 2_000;

/// Account cache capacity
pub const ACCOUNT_CACHE_CAPACITY: usize = 10_000;

/// Per-provider HTTP timeout
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// RISK SCORING WEIGHTS
// ============================================================================
//
// Initial values; tune from live hit rates, not in-flight.

pub const SCORE_MINT_AUTHORITY_REVOKED: i32 = 20;
pub const SCORE_FREEZE_AUTHORITY_REVOKED: i32 = 15;
pub const SCORE_LP_LOCKED: i32 = 25;
pub const SCORE_LP_LOCK_DURATION_BONUS: i32 = 5;
pub const SCORE_LIQUIDITY_OK: i32 = 10;
pub const SCORE_HONEYPOT_PASSED: i32 = 15;
pub const SCORE_STANDARD_SPL: i32 = 10;
pub const SCORE_BENIGN_TOKEN_2022: i32 = 15;

/// Per-percentage-point penalty above the top-holder threshold, capped
pub const TOP_HOLDER_PENALTY_PER_POINT: i32 = 1;
pub const TOP_HOLDER_PENALTY_CAP: i32 = 20;

/// Liquidity at or above this many SOL earns the full liquidity score
pub const LIQUIDITY_FULL_SCORE_SOL: f64 = 10.0;

/// LP locked fraction thresholds
pub const LP_LOCK_FULL_FRACTION: f64 = 0.90;
pub const LP_LOCK_PARTIAL_FRACTION: f64 = 0.50;

/// Simulated taxes above this are treated as a honeypot outright
pub const TAX_HONEYPOT_PERCENT: f64 = 50.0;

/// Crude stablecoin -> SOL conversion (1 SOL ~ 150 USD)
pub const STABLE_SOL_RATIO: f64 = 150.0;

/// Analysis result cache TTL
pub const ANALYSIS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Blacklist LRU: 24h TTL, bounded
pub const BLACKLIST_TTL: Duration = Duration::from_secs(24 * 3600);
pub const BLACKLIST_CAPACITY: usize = 10_000;
pub const WHITELIST_CAPACITY: usize = 1_000;

/// Nominal token amount used for the sell simulation (1000 tokens at 6 dp)
pub const HONEYPOT_TEST_AMOUNT: u64 = 1_000 * 1_000_000;

// ============================================================================
// POSITION MANAGEMENT
// ============================================================================

/// Price refresh tick for open positions
pub const POSITION_REFRESH_INTERVAL_MS: u64 = 500;

// ============================================================================
// AUTO SWEEP
// ============================================================================

/// Interval between sweep checks
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Balance kept in the hot wallet for fees and future buys
pub const SWEEP_RESERVE_LAMPORTS: u64 = 100_000_000; // 0.1 SOL

/// Minimum surplus worth sweeping
pub const SWEEP_MIN_TRANSFER_LAMPORTS: u64 = 50_000_000; // 0.05 SOL

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sol_lamports_conversion() {
        assert_eq!(sol_to_lamports(1.0), LAMPORTS_PER_SOL);
        assert_eq!(lamports_to_sol(LAMPORTS_PER_SOL), 1.0);
        assert_eq!(sol_to_lamports(0.5), 500_000_000);
    }

    #[test]
    fn test_program_ids_parse() {
        assert_ne!(*RAYDIUM_AMM_V4_PROGRAM, Pubkey::default());
        assert_ne!(*PUMPFUN_PROGRAM, Pubkey::default());
        assert_ne!(*ORCA_WHIRLPOOLS_PROGRAM, Pubkey::default());
        assert_ne!(*WSOL, *USDC);
    }

    #[test]
    fn test_tip_accounts_parse() {
        for addr in JITO_TIP_ACCOUNTS {
            assert!(Pubkey::from_str(addr).is_ok());
        }
    }

    #[test]
    fn test_raydium_layout_fits_min_len() {
        // Every read field must end inside the minimum account size.
        assert!(RAYDIUM_OFF_WITHDRAW_QUEUE + 32 <= RAYDIUM_POOL_MIN_LEN);
        assert!(RAYDIUM_OFF_POOL_OPEN_TIME + 8 <= RAYDIUM_POOL_MIN_LEN);
    }

    #[test]
    fn test_pumpfun_layout_fits_min_len() {
        assert_eq!(PUMPFUN_OFF_COMPLETE + 1, PUMPFUN_CURVE_MIN_LEN);
    }
}
