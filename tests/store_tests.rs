mod common;

use mirrortrade::db::{executed_repo, observed_repo};
use mirrortrade::db::observed_repo::Inserted;
use mirrortrade::models::{Chain, ExecutionRecord, TradeStatus};

use common::{make_observed, setup_test_db};

#[tokio::test]
async fn test_duplicate_insert_is_a_no_op() {
    let pool = setup_test_db().await;

    let trade = make_observed(Chain::Evm, "0xaaa1", "0xwallet1");
    let first = observed_repo::insert_observed(&pool, &trade).await.unwrap();
    assert!(matches!(first, Inserted::Row(_)));

    // Poll/backfill overlap re-observes the same transaction.
    let second = observed_repo::insert_observed(&pool, &trade).await.unwrap();
    assert_eq!(second, Inserted::Duplicate);

    // Same hash on the other chain is a distinct observation.
    let other_chain = make_observed(Chain::Solana, "0xaaa1", "walletS");
    let third = observed_repo::insert_observed(&pool, &other_chain).await.unwrap();
    assert!(matches!(third, Inserted::Row(_)));
}

#[tokio::test]
async fn test_claim_is_fifo_and_marks_processed() {
    let pool = setup_test_db().await;

    for i in 0..3 {
        let trade = make_observed(Chain::Evm, &format!("0xbbb{i}"), "0xwallet1");
        observed_repo::insert_observed(&pool, &trade).await.unwrap();
    }

    let first = observed_repo::claim_next_unprocessed(&pool, Chain::Evm)
        .await
        .unwrap()
        .expect("a row to claim");
    assert_eq!(first.tx_hash, "0xbbb0");
    assert!(first.processed);

    // The claimed row is never handed out again.
    let second = observed_repo::claim_next_unprocessed(&pool, Chain::Evm)
        .await
        .unwrap()
        .expect("a row to claim");
    assert_eq!(second.tx_hash, "0xbbb1");
    assert!(second.id > first.id);

    let stored = observed_repo::get_observed(&pool, first.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.processed);
}

#[tokio::test]
async fn test_claim_respects_chain_filter_and_empty_queue() {
    let pool = setup_test_db().await;

    let trade = make_observed(Chain::Solana, "sig1", "walletS");
    observed_repo::insert_observed(&pool, &trade).await.unwrap();

    assert!(observed_repo::claim_next_unprocessed(&pool, Chain::Evm)
        .await
        .unwrap()
        .is_none());

    let claimed = observed_repo::claim_next_unprocessed(&pool, Chain::Solana)
        .await
        .unwrap();
    assert!(claimed.is_some());

    // Queue drained.
    assert!(observed_repo::claim_next_unprocessed(&pool, Chain::Solana)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_terminal_record_per_observed_trade() {
    let pool = setup_test_db().await;

    let trade = make_observed(Chain::Evm, "0xccc1", "0xwallet1");
    let id = match observed_repo::insert_observed(&pool, &trade).await.unwrap() {
        Inserted::Row(id) => id,
        other => panic!("unexpected: {other:?}"),
    };
    observed_repo::claim_next_unprocessed(&pool, Chain::Evm)
        .await
        .unwrap()
        .expect("claim");

    let mut record = ExecutionRecord::new(id);
    record.status = TradeStatus::Success;
    record.tx_hash = Some("0xdeadbeef".into());
    record.amount_out = Some("970".into());
    let stored = executed_repo::insert_executed(&pool, &record).await.unwrap();
    assert_eq!(stored.status, "success");
    assert_eq!(stored.observed_trade_id, id);

    let rows = executed_repo::get_by_observed(&pool, id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount_out.as_deref(), Some("970"));
}

#[tokio::test]
async fn test_exists_reflects_stored_history() {
    let pool = setup_test_db().await;

    let trade = make_observed(Chain::Solana, "sig-seen", "walletS");
    observed_repo::insert_observed(&pool, &trade).await.unwrap();

    assert!(observed_repo::exists(&pool, Chain::Solana, "sig-seen").await.unwrap());
    assert!(!observed_repo::exists(&pool, Chain::Solana, "sig-unseen").await.unwrap());
    assert!(!observed_repo::exists(&pool, Chain::Evm, "sig-seen").await.unwrap());
}
