//! Automated on-chain trading pipeline for new Solana liquidity pools.
//!
//! This library provides:
//! - Multi-source pool detection (Geyser gRPC, WebSocket logs, polling)
//! - DEX account/instruction decoders for Raydium AMM v4 and Pumpfun
//! - A tiered risk analyzer with sell simulation and scoring
//! - A multi-provider RPC substrate (rate limits, cache, failover)
//! - Bundle execution with dynamic tips and direct-RPC fallback
//! - Position tracking with batched price refresh and TP/SL exits

pub mod account_cache;
pub mod auto_sweep;
pub mod bundle_executor;
pub mod config;
pub mod constants;
pub mod grpc_stream;
pub mod honeypot_simulator;
pub mod orchestrator;
pub mod polling_monitor;
pub mod pool_ingestor;
pub mod position_manager;
pub mod pumpfun_decoder;
pub mod rate_limiter;
pub mod raydium_decoder;
pub mod request_coalescer;
pub mod risk_analyzer;
pub mod rpc_manager;
pub mod swap_builder;
pub mod tip_strategy;
pub mod token_extensions;
pub mod types;
pub mod wallet_manager;
pub mod websocket_monitor;

// Re-export main types for convenience
pub use account_cache::{CacheStats, TtlCache};
pub use auto_sweep::AutoSweep;
pub use bundle_executor::{BundleExecutor, BundleStatus, ExecutorMetrics};
pub use config::{Config, ProviderConfig};
pub use grpc_stream::GrpcStream;
pub use honeypot_simulator::{HoneypotSimulator, SellSimVerdict};
pub use orchestrator::{Orchestrator, StopHandle};
pub use polling_monitor::PollingMonitor;
pub use pool_ingestor::{IngestionMode, IngestionStats, IngestorCore, PoolIngestor, SignatureDedup};
pub use position_manager::{PositionLimits, PositionManager, PositionStats};
pub use pumpfun_decoder::{BondingCurveState, PumpfunDecoder};
pub use rate_limiter::{Priority, TokenBucket};
pub use raydium_decoder::{RaydiumDecoder, RaydiumPoolState};
pub use request_coalescer::RequestCoalescer;
pub use risk_analyzer::{RiskAnalyzer, RiskSettings};
pub use rpc_manager::{ProviderStatus, RpcProviderManager};
pub use tip_strategy::{TipCalculator, TipStrategy, Urgency};
pub use token_extensions::{MintExtension, MintInfo, TokenAccountInfo};
pub use types::{
    DexKind, ExitReason, ExitTrigger, ParsedTransaction, PoolEvent, Position, PositionEvent,
    PositionStatus, QuickCheck, RiskAnalysis, RiskFactor, RiskRequest, SwapRequest, SwapResult,
    SwapSide,
};
pub use wallet_manager::WalletManager;
pub use websocket_monitor::WebSocketMonitor;
