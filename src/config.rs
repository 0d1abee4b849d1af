//! Environment-sourced configuration.
//!
//! All recognized variables are read up front into a validated `Config`.
//! Validation collects every problem it finds and aborts startup with a
//! line-by-line listing instead of failing on the first bad value.

use anyhow::{anyhow, Result};
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_POLLING_INTERVAL_MS,
    DEFAULT_RPC_CACHE_TTL_MS,
};

/// One upstream RPC endpoint with its admission parameters
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub url: String,
    pub rps_limit: u32,
    /// 1 is preferred, 3 is last resort
    pub priority: u8,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Streaming
    pub grpc_endpoint: Option<String>,
    pub grpc_token: Option<String>,
    pub helius_ws_url: Option<String>,
    pub enable_grpc_auto_detect: bool,

    // RPC substrate
    pub providers: Vec<ProviderConfig>,
    pub rpc_cache_ttl_ms: u64,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_ms: u64,
    pub rpc_polling_interval_ms: u64,

    // Wallet
    pub private_key: String,

    // Trading
    pub buy_amount_sol: f64,
    pub max_slippage_bps: u16,
    pub take_profit_percent: f64,
    pub stop_loss_percent: f64,
    pub max_position_size_sol: f64,
    pub max_concurrent_positions: usize,

    // Bundles
    pub jito_block_engine_url: String,
    pub jito_tip_lamports: u64,
    pub jito_tip_percent: f64,
    pub jito_max_tip_lamports: u64,

    // Risk
    pub min_liquidity_sol: f64,
    pub max_top_holder_percent: f64,
    pub risk_score_threshold: u32,
    pub enable_honeypot_check: bool,
    pub max_tax_percent: f64,

    // DEX toggles
    pub enable_raydium: bool,
    pub enable_pumpfun: bool,
    pub enable_orca: bool,

    // Modes
    pub dry_run: bool,
    pub use_devnet: bool,

    // Auto sweep
    pub enable_auto_sweep: bool,
    pub cold_wallet_address: Option<Pubkey>,

    // Logging
    pub log_level: String,
    pub log_file: Option<String>,
    pub log_console: bool,
}

/// Collects parse errors so every bad variable is reported at once
struct EnvReader {
    errors: Vec<String>,
}

impl EnvReader {
    fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn opt(&mut self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T: FromStr>(&mut self, key: &str, default: T) -> T {
        match self.opt(key) {
            None => default,
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => v,
                Err(_) => {
                    self.errors
                        .push(format!("{key}: cannot parse {raw:?} as {}", std::any::type_name::<T>()));
                    default
                }
            },
        }
    }

    fn bool_or(&mut self, key: &str, default: bool) -> bool {
        match self.opt(key) {
            None => default,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    self.errors.push(format!("{key}: cannot parse {other:?} as boolean"));
                    default
                }
            },
        }
    }
}

impl Config {
    /// Read and validate the full environment.
    ///
    /// Returns one error carrying the complete listing of problems.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut r = EnvReader::new();

        let use_devnet = r.bool_or("USE_DEVNET", false);

        let grpc_endpoint = r.opt("GRPC_ENDPOINT");
        let grpc_token = r.opt("GRPC_TOKEN");
        let helius_api_key = r.opt("HELIUS_API_KEY");

        let helius_cluster = if use_devnet { "devnet" } else { "mainnet" };
        let helius_rpc_url = helius_api_key
            .as_ref()
            .map(|k| format!("https://{helius_cluster}.helius-rpc.com/?api-key={k}"));
        let helius_ws_url = helius_api_key
            .as_ref()
            .map(|k| format!("wss://{helius_cluster}.helius-rpc.com/?api-key={k}"));

        let helius_rps = r.parse_or::<u32>("HELIUS_RPC_RPS", 10);
        let shyft_rps = r.parse_or::<u32>("SHYFT_RPC_RPS", 10);
        let helius_priority = r.parse_or::<u8>("HELIUS_PRIORITY", 1);
        let shyft_priority = r.parse_or::<u8>("SHYFT_PRIORITY", 2);
        let solana_priority = r.parse_or::<u8>("SOLANA_PRIORITY", 3);

        let mut providers = Vec::new();
        if let Some(url) = helius_rpc_url {
            providers.push(ProviderConfig {
                name: "helius".to_string(),
                url,
                rps_limit: helius_rps,
                priority: helius_priority,
            });
        }
        if let Some(raw) = r.opt("BACKUP_RPC_URLS") {
            for (idx, url) in raw
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .enumerate()
            {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    r.errors
                        .push(format!("BACKUP_RPC_URLS[{idx}]: {url:?} is not an http(s) url"));
                    continue;
                }
                let is_shyft = url.contains("shyft");
                providers.push(ProviderConfig {
                    name: if is_shyft {
                        "shyft".to_string()
                    } else {
                        format!("backup-{idx}")
                    },
                    url: url.to_string(),
                    rps_limit: shyft_rps,
                    priority: shyft_priority,
                });
            }
        }
        // The public endpoint is always present as a last resort.
        providers.push(ProviderConfig {
            name: "solana".to_string(),
            url: if use_devnet {
                "https://api.devnet.solana.com".to_string()
            } else {
                "https://api.mainnet-beta.solana.com".to_string()
            },
            rps_limit: 5,
            priority: solana_priority,
        });

        for p in &providers {
            if p.rps_limit == 0 {
                r.errors.push(format!("provider {}: rps limit must be > 0", p.name));
            }
            if !(1..=3).contains(&p.priority) {
                r.errors
                    .push(format!("provider {}: priority {} outside 1..=3", p.name, p.priority));
            }
        }

        let private_key = match r.opt("PRIVATE_KEY") {
            Some(k) => {
                match bs58::decode(k.trim()).into_vec() {
                    Ok(bytes) if bytes.len() == 64 => k,
                    Ok(bytes) => {
                        r.errors.push(format!(
                            "PRIVATE_KEY: decoded to {} bytes, expected 64",
                            bytes.len()
                        ));
                        String::new()
                    }
                    Err(e) => {
                        r.errors.push(format!("PRIVATE_KEY: invalid base58 ({e})"));
                        String::new()
                    }
                }
            }
            None => {
                r.errors.push("PRIVATE_KEY: required but not set".to_string());
                String::new()
            }
        };

        let buy_amount_sol = r.parse_or::<f64>("BUY_AMOUNT_SOL", 0.1);
        if buy_amount_sol <= 0.0 {
            r.errors.push(format!("BUY_AMOUNT_SOL: must be > 0, got {buy_amount_sol}"));
        }
        let max_slippage_bps = r.parse_or::<u16>("MAX_SLIPPAGE_BPS", 500);
        if max_slippage_bps > 10_000 {
            r.errors
                .push(format!("MAX_SLIPPAGE_BPS: must be <= 10000, got {max_slippage_bps}"));
        }
        let take_profit_percent = r.parse_or::<f64>("TAKE_PROFIT_PERCENT", 50.0);
        if take_profit_percent <= 0.0 {
            r.errors
                .push(format!("TAKE_PROFIT_PERCENT: must be > 0, got {take_profit_percent}"));
        }
        let stop_loss_percent = r.parse_or::<f64>("STOP_LOSS_PERCENT", 20.0);
        if !(0.0..100.0).contains(&stop_loss_percent) || stop_loss_percent == 0.0 {
            r.errors.push(format!(
                "STOP_LOSS_PERCENT: must be inside (0, 100), got {stop_loss_percent}"
            ));
        }
        let max_position_size_sol = r.parse_or::<f64>("MAX_POSITION_SIZE_SOL", 1.0);
        if max_position_size_sol < buy_amount_sol {
            r.errors.push(format!(
                "MAX_POSITION_SIZE_SOL: {max_position_size_sol} is below BUY_AMOUNT_SOL {buy_amount_sol}"
            ));
        }
        let max_concurrent_positions = r.parse_or::<usize>("MAX_CONCURRENT_POSITIONS", 3);
        if max_concurrent_positions == 0 {
            r.errors.push("MAX_CONCURRENT_POSITIONS: must be >= 1".to_string());
        }

        let jito_block_engine_url = r
            .opt("JITO_BLOCK_ENGINE_URL")
            .unwrap_or_else(|| "https://mainnet.block-engine.jito.wtf".to_string());
        let jito_tip_lamports = r.parse_or::<u64>("JITO_TIP_LAMPORTS", 1_000_000);
        let jito_tip_percent = r.parse_or::<f64>("JITO_TIP_PERCENT", 10.0);
        let jito_max_tip_lamports = r.parse_or::<u64>("JITO_MAX_TIP_LAMPORTS", 5_000_000);
        if jito_max_tip_lamports < jito_tip_lamports {
            r.errors.push(format!(
                "JITO_MAX_TIP_LAMPORTS: {jito_max_tip_lamports} is below JITO_TIP_LAMPORTS {jito_tip_lamports}"
            ));
        }

        let min_liquidity_sol = r.parse_or::<f64>("MIN_LIQUIDITY_SOL", 1.0);
        let max_top_holder_percent = r.parse_or::<f64>("MAX_TOP_HOLDER_PERCENT", 20.0);
        let risk_score_threshold = r.parse_or::<u32>("RISK_SCORE_THRESHOLD", 60);
        if risk_score_threshold > 100 {
            r.errors
                .push(format!("RISK_SCORE_THRESHOLD: must be <= 100, got {risk_score_threshold}"));
        }
        let enable_honeypot_check = r.bool_or("ENABLE_HONEYPOT_CHECK", true);
        let max_tax_percent = r.parse_or::<f64>("MAX_TAX_PERCENT", 10.0);

        let enable_raydium = r.bool_or("ENABLE_RAYDIUM", true);
        let enable_pumpfun = r.bool_or("ENABLE_PUMPFUN", true);
        let enable_orca = r.bool_or("ENABLE_ORCA", false);
        if !enable_raydium && !enable_pumpfun && !enable_orca {
            r.errors
                .push("ENABLE_RAYDIUM/ENABLE_PUMPFUN/ENABLE_ORCA: at least one DEX must be enabled".to_string());
        }

        let rpc_cache_ttl_ms = r.parse_or::<u64>("RPC_CACHE_TTL_MS", DEFAULT_RPC_CACHE_TTL_MS);
        let max_concurrent_fetches =
            r.parse_or::<usize>("MAX_CONCURRENT_FETCHES", DEFAULT_MAX_CONCURRENT_FETCHES);
        if max_concurrent_fetches == 0 {
            r.errors.push("MAX_CONCURRENT_FETCHES: must be >= 1".to_string());
        }
        let fetch_timeout_ms = r.parse_or::<u64>("FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS);
        let rpc_polling_interval_ms =
            r.parse_or::<u64>("RPC_POLLING_INTERVAL_MS", DEFAULT_POLLING_INTERVAL_MS);
        let enable_grpc_auto_detect = r.bool_or("ENABLE_GRPC_AUTO_DETECT", true);

        let dry_run = r.bool_or("DRY_RUN", false);

        let enable_auto_sweep = r.bool_or("ENABLE_AUTO_SWEEP", false);
        let cold_wallet_address = match r.opt("COLD_WALLET_ADDRESS") {
            Some(raw) => match Pubkey::from_str(raw.trim()) {
                Ok(pk) => Some(pk),
                Err(e) => {
                    r.errors.push(format!("COLD_WALLET_ADDRESS: invalid address ({e})"));
                    None
                }
            },
            None => None,
        };
        if enable_auto_sweep && cold_wallet_address.is_none() {
            r.errors
                .push("COLD_WALLET_ADDRESS: required when ENABLE_AUTO_SWEEP is on".to_string());
        }

        let log_level = r.opt("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_file = r.opt("LOG_FILE");
        let log_console = r.bool_or("LOG_CONSOLE", true);

        if !r.errors.is_empty() {
            let listing = r
                .errors
                .iter()
                .map(|e| format!("  - {e}"))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(anyhow!("invalid configuration:\n{listing}"));
        }

        Ok(Self {
            grpc_endpoint,
            grpc_token,
            helius_ws_url,
            enable_grpc_auto_detect,
            providers,
            rpc_cache_ttl_ms,
            max_concurrent_fetches,
            fetch_timeout_ms,
            rpc_polling_interval_ms,
            private_key,
            buy_amount_sol,
            max_slippage_bps,
            take_profit_percent,
            stop_loss_percent,
            max_position_size_sol,
            max_concurrent_positions,
            jito_block_engine_url,
            jito_tip_lamports,
            jito_tip_percent,
            jito_max_tip_lamports,
            min_liquidity_sol,
            max_top_holder_percent,
            risk_score_threshold,
            enable_honeypot_check,
            max_tax_percent,
            enable_raydium,
            enable_pumpfun,
            enable_orca,
            dry_run,
            use_devnet,
            enable_auto_sweep,
            cold_wallet_address,
            log_level,
            log_file,
            log_console,
        })
    }

    /// Program ids for every enabled DEX, in a stable order
    pub fn enabled_programs(&self) -> Vec<(crate::types::DexKind, Pubkey)> {
        use crate::constants::{ORCA_WHIRLPOOLS_PROGRAM, PUMPFUN_PROGRAM, RAYDIUM_AMM_V4_PROGRAM};
        use crate::types::DexKind;

        let mut programs = Vec::new();
        if self.enable_raydium {
            programs.push((DexKind::Raydium, *RAYDIUM_AMM_V4_PROGRAM));
        }
        if self.enable_pumpfun {
            programs.push((DexKind::Pumpfun, *PUMPFUN_PROGRAM));
        }
        if self.enable_orca {
            programs.push((DexKind::Orca, *ORCA_WHIRLPOOLS_PROGRAM));
        }
        programs
    }
}
