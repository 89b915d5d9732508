mod common;

use std::sync::Arc;

use mirrortrade::db::observed_repo;
use mirrortrade::evm::executor::EvmExecutor;
use mirrortrade::models::{Chain, NewObservedTrade, TradeStatus};
use mirrortrade::solana::executor::SolanaExecutor;

use common::{make_observed, offline_config, path_swap_calldata, seed_followed_wallet, setup_test_db};

const WALLET: &str = "0x00000000000000000000000000000000000000f1";
const ROUTER: &str = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";

#[tokio::test]
async fn test_dry_run_path_swap_is_recorded_as_skip_with_estimate() {
    let pool = setup_test_db().await;
    seed_followed_wallet(&pool, Chain::Evm, WALLET, None, None).await;

    let trade = NewObservedTrade {
        chain: Chain::Evm,
        tx_hash: "0xe2e1".into(),
        block_number: 100,
        wallet: WALLET.into(),
        dex: Some(ROUTER.into()),
        method: Some("swapExactETHForTokens".into()),
        token_in: Some("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".into()),
        token_out: Some("0x6b175474e89094c44da98b954eedeac495271d0f".into()),
        amount_in: Some("1000".into()),
        min_out: Some("900".into()),
        raw_input: Some(path_swap_calldata()),
    };
    observed_repo::insert_observed(&pool, &trade).await.unwrap();

    let claimed = observed_repo::claim_next_unprocessed(&pool, Chain::Evm)
        .await
        .unwrap()
        .expect("claim");
    assert!(claimed.processed);

    let executor = EvmExecutor::new(pool.clone(), Arc::new(offline_config())).unwrap();
    let record = executor.process(&claimed).await;

    // Dry run with no aggregator and an unreachable quoter: the estimate
    // degrades to zero but the trade still lands as a recorded skip.
    assert_eq!(record.status, TradeStatus::Skipped);
    assert_eq!(record.amount_out.as_deref(), Some("0"));
    assert!(record.tx_hash.is_none());
    assert!(record
        .error
        .as_deref()
        .is_some_and(|e| e.contains("min_out degraded")));

    let stored = observed_repo::get_observed(&pool, claimed.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.processed);
}

#[tokio::test]
async fn test_policy_denied_token_is_skipped() {
    let pool = setup_test_db().await;

    let mut config = offline_config();
    config.risk_defaults.denied_tokens =
        vec!["0x6b175474e89094c44da98b954eedeac495271d0f".into()];

    let trade = NewObservedTrade {
        raw_input: Some(path_swap_calldata()),
        ..make_observed(Chain::Evm, "0xe2e2", WALLET)
    };
    observed_repo::insert_observed(&pool, &trade).await.unwrap();
    let claimed = observed_repo::claim_next_unprocessed(&pool, Chain::Evm)
        .await
        .unwrap()
        .expect("claim");

    let executor = EvmExecutor::new(pool.clone(), Arc::new(config)).unwrap();
    let record = executor.process(&claimed).await;

    assert_eq!(record.status, TradeStatus::Skipped);
    assert!(record
        .error
        .as_deref()
        .is_some_and(|e| e.contains("not allowed by policy")));
    assert!(record.amount_out.is_none());
}

#[tokio::test]
async fn test_undecodable_payload_is_skipped_not_failed() {
    let pool = setup_test_db().await;

    let trade = NewObservedTrade {
        method: None,
        raw_input: Some("0xdeadbeef".into()),
        ..make_observed(Chain::Evm, "0xe2e3", WALLET)
    };
    observed_repo::insert_observed(&pool, &trade).await.unwrap();
    let claimed = observed_repo::claim_next_unprocessed(&pool, Chain::Evm)
        .await
        .unwrap()
        .expect("claim");

    let executor = EvmExecutor::new(pool.clone(), Arc::new(offline_config())).unwrap();
    let record = executor.process(&claimed).await;

    assert_eq!(record.status, TradeStatus::Skipped);
    assert!(record
        .error
        .as_deref()
        .is_some_and(|e| e.contains("unsupported method")));
}

#[tokio::test]
async fn test_solana_missing_legs_is_skipped() {
    let pool = setup_test_db().await;

    let trade = NewObservedTrade {
        token_out: None,
        ..make_observed(Chain::Solana, "sig-e2e1", "walletS")
    };
    observed_repo::insert_observed(&pool, &trade).await.unwrap();
    let claimed = observed_repo::claim_next_unprocessed(&pool, Chain::Solana)
        .await
        .unwrap()
        .expect("claim");

    let executor = SolanaExecutor::new(pool.clone(), Arc::new(offline_config())).unwrap();
    let record = executor.process(&claimed).await;

    assert_eq!(record.status, TradeStatus::Skipped);
    assert!(record
        .error
        .as_deref()
        .is_some_and(|e| e.contains("insufficient data")));
}

#[tokio::test]
async fn test_solana_unreachable_quote_is_failed() {
    let pool = setup_test_db().await;

    let trade = NewObservedTrade {
        token_in: Some("So11111111111111111111111111111111111111112".into()),
        token_out: Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into()),
        amount_in: Some("1000000".into()),
        ..make_observed(Chain::Solana, "sig-e2e2", "walletS")
    };
    observed_repo::insert_observed(&pool, &trade).await.unwrap();
    let claimed = observed_repo::claim_next_unprocessed(&pool, Chain::Solana)
        .await
        .unwrap()
        .expect("claim");

    let executor = SolanaExecutor::new(pool.clone(), Arc::new(offline_config())).unwrap();
    let record = executor.process(&claimed).await;

    // No route was ever committed, so this is failed rather than skipped.
    assert_eq!(record.status, TradeStatus::Failed);
    assert!(record.error.is_some());
}
