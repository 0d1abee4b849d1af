//! Event ingestion coordinator.
//!
//! Exactly one source mode is active at a time: gRPC streaming is
//! preferred, WebSocket log subscriptions are the fallback, and a
//! signature-polling loop is the last resort that always starts. The
//! coordinator owns the pieces every source shares: the signature dedup
//! set, the curve→mint index, the bounded fetch gate, decoder routing
//! and the outbound event channel.

use lru::LruCache;
use parking_lot::Mutex;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{SIGNATURE_DEDUP_CAP, SIGNATURE_DEDUP_RETAIN};
use crate::grpc_stream::GrpcStream;
use crate::polling_monitor::PollingMonitor;
use crate::pumpfun_decoder::PumpfunDecoder;
use crate::raydium_decoder::RaydiumDecoder;
use crate::rpc_manager::RpcProviderManager;
use crate::types::{DexKind, ParsedTransaction, PoolEvent};
use crate::websocket_monitor::WebSocketMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionMode {
    Grpc,
    WebSocket,
    Polling,
}

impl std::fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestionMode::Grpc => f.write_str("grpc"),
            IngestionMode::WebSocket => f.write_str("websocket"),
            IngestionMode::Polling => f.write_str("polling"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionStats {
    pub events_received: u64,
    pub pools_detected: u64,
    pub errors: u64,
    pub dropped_fetches: u64,
    pub duplicates_skipped: u64,
}

/// Bounded set of processed signatures. Once the cap is hit the oldest
/// half is evicted, keeping the most recent entries.
pub struct SignatureDedup {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
    retain: usize,
}

impl SignatureDedup {
    pub fn new(cap: usize, retain: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
            cap,
            retain: retain.min(cap),
        }
    }

    /// Returns true when the signature was new and is now claimed.
    pub fn claim(&mut self, signature: &str) -> bool {
        if self.seen.contains(signature) {
            return false;
        }
        self.seen.insert(signature.to_string());
        self.order.push_back(signature.to_string());
        if self.order.len() > self.cap {
            while self.order.len() > self.retain {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        true
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// State shared by whichever source is currently active
pub struct IngestorCore {
    pub rpc: Arc<RpcProviderManager>,
    pub programs: Vec<(DexKind, Pubkey)>,
    raydium: RaydiumDecoder,
    pumpfun: PumpfunDecoder,
    dedup: Mutex<SignatureDedup>,
    /// bonding curve address -> token mint, learned from create events
    curve_mints: Mutex<LruCache<Pubkey, Pubkey>>,
    event_tx: mpsc::Sender<PoolEvent>,
    fetch_gate: Arc<Semaphore>,
    max_fetches: usize,
    pub fetch_timeout: Duration,
    stats: Mutex<IngestionStats>,
    last_event: Mutex<Option<Instant>>,
}

impl IngestorCore {
    pub fn new(
        rpc: Arc<RpcProviderManager>,
        programs: Vec<(DexKind, Pubkey)>,
        max_concurrent_fetches: usize,
        fetch_timeout_ms: u64,
        event_tx: mpsc::Sender<PoolEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            rpc,
            programs,
            raydium: RaydiumDecoder::new(),
            pumpfun: PumpfunDecoder::new(),
            dedup: Mutex::new(SignatureDedup::new(SIGNATURE_DEDUP_CAP, SIGNATURE_DEDUP_RETAIN)),
            curve_mints: Mutex::new(LruCache::new(NonZeroUsize::new(4_096).unwrap())),
            event_tx,
            fetch_gate: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
            max_fetches: max_concurrent_fetches.max(1),
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            stats: Mutex::new(IngestionStats::default()),
            last_event: Mutex::new(None),
        })
    }

    pub fn dex_for_program(&self, program: &Pubkey) -> Option<DexKind> {
        self.programs
            .iter()
            .find(|(_, id)| id == program)
            .map(|(dex, _)| *dex)
    }

    /// Claim a signature for processing; false means it was already seen.
    pub fn claim_signature(&self, signature: &str) -> bool {
        let fresh = self.dedup.lock().claim(signature);
        if !fresh {
            self.stats.lock().duplicates_skipped += 1;
        }
        fresh
    }

    pub fn note_event_received(&self) {
        self.stats.lock().events_received += 1;
        *self.last_event.lock() = Some(Instant::now());
    }

    pub fn note_error(&self) {
        self.stats.lock().errors += 1;
    }

    pub fn stats(&self) -> IngestionStats {
        self.stats.lock().clone()
    }

    /// Permits missing from the gate are exactly the in-flight fetches.
    pub fn pending_fetches(&self) -> usize {
        self.max_fetches - self.fetch_gate.available_permits()
    }

    /// Decode one account update routed by its owner program.
    pub async fn process_account_update(
        &self,
        owner: &Pubkey,
        address: &Pubkey,
        data: &[u8],
        slot: u64,
    ) {
        self.note_event_received();
        let Some(dex) = self.dex_for_program(owner) else {
            return;
        };
        let event = match dex {
            DexKind::Raydium => self.raydium.parse_account(address, data, slot),
            DexKind::Pumpfun => {
                let known_mint = self.curve_mints.lock().get(address).copied();
                self.pumpfun.parse_account(address, data, slot, known_mint)
            }
            // Orca pools are watched at the log level only; no account
            // decoder is wired for them.
            DexKind::Orca => None,
        };
        if let Some(event) = event {
            self.emit(event).await;
        }
    }

    /// Route a fetched transaction through whichever decoder recognizes
    /// it. Decode misses are silent; not every transaction is a pool.
    pub async fn process_transaction(&self, tx: &ParsedTransaction) {
        self.note_event_received();
        let event = self
            .enabled(DexKind::Pumpfun)
            .then(|| self.pumpfun.parse_transaction(tx))
            .flatten()
            .or_else(|| {
                self.enabled(DexKind::Raydium)
                    .then(|| self.raydium.parse_transaction(tx))
                    .flatten()
            });
        if let Some(event) = event {
            self.emit(event).await;
        }
    }

    fn enabled(&self, dex: DexKind) -> bool {
        self.programs.iter().any(|(kind, _)| *kind == dex)
    }

    /// Fetch-and-decode with the bounded in-flight gate. When the gate is
    /// closed the candidate is dropped outright: a backlog of stale
    /// fetches is worse than missing a tail-end signal.
    pub fn spawn_transaction_fetch(self: &Arc<Self>, signature: Signature) {
        let Ok(permit) = self.fetch_gate.clone().try_acquire_owned() else {
            self.stats.lock().dropped_fetches += 1;
            debug!("fetch gate full, dropping candidate {signature}");
            return;
        };

        let core = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let fetched = timeout(
                core.fetch_timeout,
                core.rpc
                    .get_parsed_transaction(&signature, CommitmentConfig::confirmed()),
            )
            .await;
            match fetched {
                Ok(Ok(Some(tx))) => core.process_transaction(&tx).await,
                Ok(Ok(None)) => debug!("transaction {signature} not available yet"),
                Ok(Err(e)) => {
                    core.note_error();
                    warn!("transaction fetch failed for {signature}: {e}");
                }
                Err(_) => {
                    core.note_error();
                    warn!("transaction fetch timed out for {signature}");
                }
            }
        });
    }

    async fn emit(&self, event: PoolEvent) {
        // Account-sourced events carry synthetic signatures; claim them
        // here so repeated writes of the same account dedup cleanly.
        if event.signature().starts_with("account:") && !self.claim_signature(event.signature()) {
            return;
        }

        if let PoolEvent::NewPool {
            dex: DexKind::Pumpfun,
            mint,
            pool,
            ..
        } = &event
        {
            self.curve_mints.lock().put(*pool, *mint);
        }

        self.stats.lock().pools_detected += 1;
        info!(
            "🆕 pool event: {} mint={} sig={}",
            match &event {
                PoolEvent::NewPool { dex, .. } => format!("new_pool/{dex}"),
                PoolEvent::Migration { source_dex, target_dex, .. } =>
                    format!("migration/{source_dex}->{target_dex}"),
                PoolEvent::LiquidityAdded { dex, .. } => format!("liquidity/{dex}"),
            },
            event.mint(),
            event.signature()
        );
        if self.event_tx.send(event).await.is_err() {
            warn!("pool event channel closed, dropping event");
        }
    }
}

/// Mode chain driver
pub struct PoolIngestor {
    core: Arc<IngestorCore>,
    grpc: Option<GrpcStream>,
    websocket: Option<WebSocketMonitor>,
    polling: PollingMonitor,
    use_devnet: bool,
    auto_detect: bool,
    mode: Mutex<IngestionMode>,
}

impl PoolIngestor {
    pub fn new(config: &Config, rpc: Arc<RpcProviderManager>, event_tx: mpsc::Sender<PoolEvent>) -> Self {
        let programs = config.enabled_programs();
        let core = IngestorCore::new(
            rpc,
            programs.clone(),
            config.max_concurrent_fetches,
            config.fetch_timeout_ms,
            event_tx,
        );

        let grpc = config.grpc_endpoint.as_ref().map(|endpoint| {
            GrpcStream::new(
                endpoint.clone(),
                config.grpc_token.clone(),
                programs.iter().map(|(_, id)| *id).collect(),
            )
        });
        let websocket = config
            .helius_ws_url
            .as_ref()
            .map(|url| WebSocketMonitor::new(url.clone(), programs.clone()));
        let polling = PollingMonitor::new(
            programs.clone(),
            Duration::from_millis(config.rpc_polling_interval_ms),
        );

        Self {
            core,
            grpc,
            websocket,
            polling,
            use_devnet: config.use_devnet,
            auto_detect: config.enable_grpc_auto_detect,
            mode: Mutex::new(IngestionMode::Polling),
        }
    }

    pub fn core(&self) -> Arc<IngestorCore> {
        self.core.clone()
    }

    pub fn mode(&self) -> IngestionMode {
        *self.mode.lock()
    }

    fn set_mode(&self, mode: IngestionMode) {
        *self.mode.lock() = mode;
        info!("📡 ingestion mode: {mode}");
    }

    /// Drive the source chain until shutdown. gRPC first (unless devnet
    /// or probing rules it out), WebSocket on gRPC failure, polling as
    /// the floor that cannot fail.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut grpc_available = self.grpc.is_some() && !self.use_devnet;

        if grpc_available && self.auto_detect {
            let stream = self.grpc.as_ref().unwrap();
            match stream.probe().await {
                Ok(()) => info!("✅ gRPC capability probe passed"),
                Err(e) => {
                    warn!("gRPC probe failed, disabling for this run: {e}");
                    grpc_available = false;
                }
            }
        }

        if *shutdown.borrow() {
            return;
        }

        if grpc_available {
            self.set_mode(IngestionMode::Grpc);
            let stream = self.grpc.as_ref().unwrap();
            match stream.run(self.core.clone(), shutdown.clone()).await {
                Ok(()) => return, // clean shutdown
                Err(e) => {
                    self.core.note_error();
                    warn!("gRPC stream ended: {e}; falling back to WebSocket");
                }
            }
        }

        if *shutdown.borrow() {
            return;
        }

        if let Some(ws) = &self.websocket {
            self.set_mode(IngestionMode::WebSocket);
            match ws.run(self.core.clone(), shutdown.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    self.core.note_error();
                    warn!("WebSocket monitor unavailable: {e}; falling back to polling");
                }
            }
        }

        if *shutdown.borrow() {
            return;
        }

        // Polling cannot fail; it may simply find nothing.
        self.set_mode(IngestionMode::Polling);
        self.polling.run(self.core.clone(), &mut shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::constants::{PUMPFUN_CREATE_DISCRIMINATOR, PUMPFUN_PROGRAM, RAYDIUM_AMM_V4_PROGRAM};
    use crate::types::DecodedInstruction;

    fn test_core(tx: mpsc::Sender<PoolEvent>) -> Arc<IngestorCore> {
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
        IngestorCore::new(
            rpc,
            vec![
                (DexKind::Raydium, *RAYDIUM_AMM_V4_PROGRAM),
                (DexKind::Pumpfun, *PUMPFUN_PROGRAM),
            ],
            2,
            5_000,
            tx,
        )
    }

    #[test]
    fn test_dedup_claims_once() {
        let mut dedup = SignatureDedup::new(100, 50);
        assert!(dedup.claim("sig1"));
        assert!(!dedup.claim("sig1"));
        assert!(dedup.contains("sig1"));
    }

    #[test]
    fn test_dedup_evicts_oldest_half_at_cap() {
        let mut dedup = SignatureDedup::new(10, 5);
        for i in 0..11 {
            assert!(dedup.claim(&format!("sig{i}")));
        }
        // Cap breach trims back down to `retain` entries.
        assert_eq!(dedup.len(), 5);
        assert!(!dedup.contains("sig0"));
        assert!(dedup.contains("sig10"));
        // Evicted signatures can be claimed again.
        assert!(dedup.claim("sig0"));
    }

    #[tokio::test]
    async fn test_create_event_populates_curve_index() {
        let (tx, mut rx) = mpsc::channel(16);
        let core = test_core(tx);

        let accounts: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
        let parsed = ParsedTransaction {
            signature: "sigCreate".to_string(),
            slot: 5,
            account_keys: accounts.clone(),
            instructions: vec![DecodedInstruction {
                program_id: *PUMPFUN_PROGRAM,
                accounts: accounts.clone(),
                data: PUMPFUN_CREATE_DISCRIMINATOR.to_vec(),
            }],
        };
        core.process_transaction(&parsed).await;

        let event = rx.recv().await.unwrap();
        let curve = accounts[2];
        assert_eq!(core.curve_mints.lock().get(&curve), Some(&accounts[0]));
        assert_eq!(event.mint(), accounts[0]);
    }

    #[tokio::test]
    async fn test_account_events_dedup_by_synthetic_signature() {
        let (tx, mut rx) = mpsc::channel(16);
        let core = test_core(tx);

        let curve = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        core.curve_mints.lock().put(curve, mint);

        let state = crate::pumpfun_decoder::BondingCurveState {
            virtual_token_reserves: crate::constants::PUMPFUN_INITIAL_VIRTUAL_TOKENS,
            virtual_sol_reserves: crate::constants::PUMPFUN_INITIAL_VIRTUAL_SOL,
            real_token_reserves: 1,
            real_sol_reserves: 0,
            token_total_supply: 1,
            complete: false,
        };
        let data = state.encode();
        core.process_account_update(&PUMPFUN_PROGRAM, &curve, &data, 1).await;
        core.process_account_update(&PUMPFUN_PROGRAM, &curve, &data, 2).await;

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert_eq!(core.stats().pools_detected, 1);
    }

    #[tokio::test]
    async fn test_unknown_owner_is_ignored() {
        let (tx, mut rx) = mpsc::channel(16);
        let core = test_core(tx);
        core.process_account_update(&Pubkey::new_unique(), &Pubkey::new_unique(), &[0u8; 128], 1)
            .await;
        assert!(rx.try_recv().is_err());
    }
}
