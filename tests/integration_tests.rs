//! Cross-component scenarios for the pool sniper.
//!
//! These run entirely in-process against hand-built account fixtures:
//! decoder output through the ingestion core, position lifecycle through
//! TP/SL triggers, and the scoring rules end to end. Anything requiring
//! a live cluster stays in the per-module unit tests as logic-only
//! coverage.

use solana_pool_sniper::*;

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::mpsc;

use solana_pool_sniper::constants::{
    PUMPFUN_CREATE_DISCRIMINATOR, PUMPFUN_INITIAL_VIRTUAL_SOL, PUMPFUN_INITIAL_VIRTUAL_TOKENS,
    PUMPFUN_PROGRAM, RAYDIUM_AMM_V4_PROGRAM,
};
use solana_pool_sniper::types::DecodedInstruction;

fn test_rpc() -> Arc<RpcProviderManager> {
    Arc::new(
        RpcProviderManager::new(
            &[ProviderConfig {
                name: "local".to_string(),
                url: "http://localhost:18899".to_string(),
                rps_limit: 10,
                priority: 1,
            }],
            2_000,
        )
        .unwrap(),
    )
}

fn test_core(tx: mpsc::Sender<PoolEvent>) -> Arc<IngestorCore> {
    IngestorCore::new(
        test_rpc(),
        vec![
            (DexKind::Raydium, *RAYDIUM_AMM_V4_PROGRAM),
            (DexKind::Pumpfun, *PUMPFUN_PROGRAM),
        ],
        2,
        5_000,
        tx,
    )
}

fn pumpfun_create_tx(signature: &str, accounts: &[Pubkey]) -> ParsedTransaction {
    ParsedTransaction {
        signature: signature.to_string(),
        slot: 100,
        account_keys: accounts.to_vec(),
        instructions: vec![DecodedInstruction {
            program_id: *PUMPFUN_PROGRAM,
            accounts: accounts.to_vec(),
            data: PUMPFUN_CREATE_DISCRIMINATOR.to_vec(),
        }],
    }
}

// ---------------------------------------------------------------------
// Detection pipeline
// ---------------------------------------------------------------------

#[tokio::test]
async fn create_transaction_flows_to_pool_event() {
    let (tx, mut rx) = mpsc::channel(8);
    let core = test_core(tx);
    let accounts: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();

    core.process_transaction(&pumpfun_create_tx("sigA", &accounts)).await;

    let event = rx.recv().await.expect("event emitted");
    match event {
        PoolEvent::NewPool {
            dex,
            mint,
            pool,
            signature,
            slot,
            ..
        } => {
            assert_eq!(dex, DexKind::Pumpfun);
            assert_eq!(mint, accounts[0]);
            assert_eq!(pool, accounts[2]);
            assert_eq!(signature, "sigA");
            assert_eq!(slot, 100);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn redelivered_signature_is_processed_exactly_once() {
    // A WebSocket reconnect re-delivers signatures; the dedup set must
    // swallow the repeat before any fetch is initiated.
    let (tx, mut rx) = mpsc::channel(8);
    let core = test_core(tx);

    assert!(core.claim_signature("sig-reconnect"));
    assert!(!core.claim_signature("sig-reconnect"));
    assert!(rx.try_recv().is_err());
    assert_eq!(core.stats().duplicates_skipped, 1);
}

#[tokio::test]
async fn curve_account_updates_need_the_create_first() {
    let (tx, mut rx) = mpsc::channel(8);
    let core = test_core(tx);

    let curve_state = BondingCurveState {
        virtual_token_reserves: PUMPFUN_INITIAL_VIRTUAL_TOKENS,
        virtual_sol_reserves: PUMPFUN_INITIAL_VIRTUAL_SOL,
        real_token_reserves: 1,
        real_sol_reserves: 0,
        token_total_supply: 1,
        complete: false,
    };
    let curve = Pubkey::new_unique();

    // Unknown curve: the account update alone cannot name the mint.
    core.process_account_update(&PUMPFUN_PROGRAM, &curve, &curve_state.encode(), 5)
        .await;
    assert!(rx.try_recv().is_err());

    // After the create transaction the curve->mint index is warm, but
    // this curve was announced under a different address, so still
    // nothing fires for it.
    let accounts: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
    core.process_transaction(&pumpfun_create_tx("sigB", &accounts)).await;
    let _create_event = rx.recv().await.unwrap();
    core.process_account_update(&PUMPFUN_PROGRAM, &curve, &curve_state.encode(), 6)
        .await;
    assert!(rx.try_recv().is_err());
}

#[test]
fn raydium_pool_layout_round_trips() {
    let state = RaydiumPoolState {
        status: 6,
        base_decimal: 6,
        quote_decimal: 9,
        pool_open_time: 1_726_000_000,
        base_vault: Pubkey::new_unique(),
        quote_vault: Pubkey::new_unique(),
        base_mint: Pubkey::new_unique(),
        quote_mint: Pubkey::new_unique(),
        lp_mint: Pubkey::new_unique(),
        open_orders: Pubkey::new_unique(),
        market_id: Pubkey::new_unique(),
        market_program: Pubkey::new_unique(),
        target_orders: Pubkey::new_unique(),
        withdraw_queue: Pubkey::new_unique(),
    };
    let decoded = RaydiumPoolState::parse(&state.encode()).unwrap();
    assert_eq!(decoded, state);
}

// ---------------------------------------------------------------------
// Curve math properties
// ---------------------------------------------------------------------

#[test]
fn buy_then_sell_always_pays_the_fee() {
    let state = BondingCurveState {
        virtual_token_reserves: PUMPFUN_INITIAL_VIRTUAL_TOKENS,
        virtual_sol_reserves: PUMPFUN_INITIAL_VIRTUAL_SOL,
        real_token_reserves: 793_100_000_000_000,
        real_sol_reserves: 0,
        token_total_supply: 1_000_000_000_000_000,
        complete: false,
    };
    for sol_in in [1_000_000u64, 50_000_000, 1_000_000_000, 20_000_000_000] {
        let tokens = state.buy_output(sol_in);
        let after = state.after_buy(sol_in);
        let sol_back = after.sell_output(tokens);
        assert!(
            sol_back <= sol_in,
            "round-trip of {sol_in} returned {sol_back}"
        );
    }
}

// ---------------------------------------------------------------------
// Risk scoring
// ---------------------------------------------------------------------

/// Token-2022 mint image with one TLV extension appended.
fn mint_with_extension(ext_type: u16, value: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 82];
    // COption tags zero = both authorities revoked; initialized flag set.
    data[45] = 1;
    data.resize(165, 0);
    data.push(1); // account type: mint
    data.extend_from_slice(&ext_type.to_le_bytes());
    data.extend_from_slice(&(value.len() as u16).to_le_bytes());
    data.extend_from_slice(value);
    data
}

#[test]
fn critical_extension_mint_fails_analysis() {
    // MintCloseAuthority is one of the sell-denying extensions.
    let data = mint_with_extension(3, &[0u8; 32]);
    let info = MintInfo::parse(&data).unwrap();
    assert_eq!(info.critical_extensions(), vec!["MintCloseAuthority"]);

    let factor = RiskFactor::new(
        "token_extensions",
        -100,
        15,
        false,
        "sell-denying extensions present".to_string(),
    );
    let analysis = RiskAnalysis::from_factors(vec![factor], vec![]);
    assert!(!analysis.passed);
    assert_eq!(analysis.score, 0);
}

#[test]
fn analysis_score_is_always_in_range() {
    let cases = vec![
        vec![RiskFactor::new("a", -500, 10, false, String::new())],
        vec![RiskFactor::new("a", 500, 10, true, String::new())],
        vec![],
        vec![
            RiskFactor::new("a", 10, 10, true, String::new()),
            RiskFactor::new("b", -10, 0, false, String::new()),
        ],
    ];
    for factors in cases {
        let analysis = RiskAnalysis::from_factors(factors, vec![]);
        assert!(analysis.score <= 100);
        if analysis.passed {
            assert!(analysis.score >= 50);
            assert!(!analysis.factors.iter().any(|f| f.is_critical_failure()));
        }
    }
}

#[test]
fn buy_gate_is_exact_at_the_threshold() {
    use solana_pool_sniper::orchestrator::should_buy;
    let threshold = 70;
    assert!(!should_buy(true, threshold - 1, threshold));
    assert!(should_buy(true, threshold, threshold));
    assert!(!should_buy(false, 100, threshold));
}

// ---------------------------------------------------------------------
// Position lifecycle
// ---------------------------------------------------------------------

struct PositionHarness {
    manager: PositionManager,
    exit_rx: mpsc::Receiver<ExitTrigger>,
}

fn position_harness(max_positions: usize, max_sol: f64) -> PositionHarness {
    let (exit_tx, exit_rx) = mpsc::channel(32);
    let (event_tx, _event_rx) = mpsc::channel(32);
    let manager = PositionManager::new(
        test_rpc(),
        PositionLimits {
            max_concurrent_positions: max_positions,
            max_position_size_sol: max_sol,
            take_profit_percent: 50.0,
            stop_loss_percent: 20.0,
        },
        exit_tx,
        event_tx,
    );
    PositionHarness { manager, exit_rx }
}

#[tokio::test]
async fn take_profit_exit_realizes_the_configured_gain() {
    let mut harness = position_harness(3, 5.0);
    let entry_price = 0.000028;
    let position = harness
        .manager
        .open_position(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            DexKind::Pumpfun,
            entry_price,
            0.1,
            35_714_285_000,
            "buySig".to_string(),
        )
        .unwrap();

    // The batched refresh reports exactly the TP price.
    harness.manager.apply_price(&position.pool, position.tp_price);
    harness.manager.evaluate_exits().await;

    let trigger = harness.exit_rx.recv().await.unwrap();
    assert_eq!(trigger.reason, ExitReason::TakeProfit);
    assert_eq!(
        harness.manager.position(position.id).unwrap().status,
        PositionStatus::Closing
    );

    let closed = harness
        .manager
        .close_position(
            position.id,
            ExitReason::TakeProfit,
            Some("sellSig".to_string()),
            Some(position.tp_price),
        )
        .unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    assert!((closed.pnl_percent - 50.0).abs() < 1e-6);
    assert_eq!(closed.exit_tx.as_deref(), Some("sellSig"));
}

#[tokio::test]
async fn failed_sell_reverts_and_retriggers_next_tick() {
    let mut harness = position_harness(3, 5.0);
    let position = harness
        .manager
        .open_position(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            DexKind::Pumpfun,
            0.001,
            0.1,
            1_000_000,
            "buySig".to_string(),
        )
        .unwrap();

    harness.manager.apply_price(&position.pool, 0.0005);
    harness.manager.evaluate_exits().await;
    assert_eq!(harness.exit_rx.recv().await.unwrap().reason, ExitReason::StopLoss);

    // Sell failed downstream; the orchestrator reverts the position.
    harness.manager.revert_to_open(position.id);
    harness.manager.evaluate_exits().await;
    assert_eq!(harness.exit_rx.recv().await.unwrap().reason, ExitReason::StopLoss);
}

#[test]
fn position_map_never_exceeds_its_limits() {
    let harness = position_harness(3, 1.0);
    let mut opened = Vec::new();
    let mut rejected = 0;

    for i in 0..8 {
        match harness.manager.open_position(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            DexKind::Pumpfun,
            0.001,
            0.25,
            1_000,
            format!("sig{i}"),
        ) {
            Ok(position) => opened.push(position),
            Err(_) => rejected += 1,
        }

        // Invariant after every step: count and SOL within limits.
        let stats = harness.manager.stats();
        assert!(stats.open <= 3);
        assert!(stats.sol_deployed <= 1.0 + 1e-9);

        // Occasionally close one to free capacity.
        if i == 3 {
            if let Some(position) = opened.pop() {
                harness
                    .manager
                    .close_position(position.id, ExitReason::Manual, None, Some(0.0012))
                    .unwrap();
            }
        }
    }
    assert!(rejected > 0);
}

// ---------------------------------------------------------------------
// Execution plumbing
// ---------------------------------------------------------------------

#[test]
fn bundle_status_strings_normalize_to_the_closed_set() {
    use solana_pool_sniper::bundle_executor::normalize_bundle_status;
    for (raw, expected) in [
        ("landed", BundleStatus::Landed),
        ("confirmed", BundleStatus::Landed),
        ("finalized", BundleStatus::Landed),
        ("failed", BundleStatus::Failed),
        ("rejected", BundleStatus::Failed),
        ("dropped", BundleStatus::Dropped),
        ("pending", BundleStatus::Pending),
        ("processing", BundleStatus::Pending),
        ("anything-else", BundleStatus::Unknown),
    ] {
        assert_eq!(normalize_bundle_status(raw), expected, "{raw}");
    }
}

#[test]
fn tip_recommendation_tracks_landed_tips_only() {
    let tips = TipCalculator::new(50_000, 10.0, 5_000_000);
    assert_eq!(tips.recommended(), None);
    for tip in [100_000u64, 100_000, 100_000, 100_000, 100_000] {
        tips.record_success(tip);
    }
    assert_eq!(tips.recommended(), Some(110_000));
}

#[tokio::test]
async fn rate_limited_reads_share_capacity_fairly() {
    // High-priority sends always overtake queued reads.
    let bucket = TokenBucket::new(1, 1);
    bucket.acquire(Priority::Normal).await;

    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for (label, priority) in [("read", Priority::Low), ("send", Priority::High)] {
        let bucket = bucket.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            bucket.acquire(priority).await;
            order.lock().push(label);
        }));
        tokio::task::yield_now().await;
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock(), vec!["send", "read"]);
}
