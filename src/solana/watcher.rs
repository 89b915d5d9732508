use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::config::AppConfig;
use crate::db::{observed_repo, wallet_repo};
use crate::models::{Chain, NewObservedTrade};
use crate::solana::balances::infer_swap_delta;
use crate::solana::rpc::{SolanaRpc, TxResult};

const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Outcome of observing one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Inserted,
    Duplicate,
    /// Transaction missing, failed, or without a usable swap delta.
    Unusable,
}

/// Fetch one transaction and persist the wallet's swap delta. Shared by
/// backfill and polling; the logs subscription fetches once itself and
/// goes through `observe_transaction`.
pub async fn observe_signature(
    pool: &PgPool,
    rpc: &SolanaRpc,
    wallet: &str,
    signature: &str,
) -> anyhow::Result<Observed> {
    let tx = match rpc.get_transaction(signature).await? {
        Some(tx) => tx,
        None => return Ok(Observed::Unusable),
    };
    observe_transaction(pool, &tx, wallet, signature).await
}

/// Persist the wallet's swap delta from an already-fetched transaction.
pub async fn observe_transaction(
    pool: &PgPool,
    tx: &TxResult,
    wallet: &str,
    signature: &str,
) -> anyhow::Result<Observed> {
    let meta = match &tx.meta {
        Some(meta) => meta,
        None => return Ok(Observed::Unusable),
    };
    if meta.err.as_ref().is_some_and(|e| !e.is_null()) {
        return Ok(Observed::Unusable);
    }
    let account_keys = tx
        .transaction
        .as_ref()
        .and_then(|t| t.message.as_ref())
        .map(|m| m.account_keys.as_slice())
        .unwrap_or(&[]);

    let delta = infer_swap_delta(meta, account_keys, wallet);
    if delta.is_empty() {
        return Ok(Observed::Unusable);
    }

    let trade = NewObservedTrade {
        chain: Chain::Solana,
        tx_hash: signature.to_string(),
        block_number: tx.slot.unwrap_or(0) as i64,
        wallet: wallet.to_string(),
        dex: Some("jupiter".into()),
        method: Some("swap".into()),
        token_in: delta.mint_in,
        token_out: delta.mint_out,
        amount_in: delta.amount_in.map(|v| v.to_string()),
        min_out: delta.amount_out.map(|v| v.to_string()),
        raw_input: None,
    };

    match observed_repo::insert_observed(pool, &trade).await? {
        observed_repo::Inserted::Row(id) => {
            counter!("trades_observed_total", "chain" => "solana").increment(1);
            tracing::info!(
                id,
                wallet = %trade.wallet,
                token_in = trade.token_in.as_deref().unwrap_or(""),
                token_out = trade.token_out.as_deref().unwrap_or(""),
                "observed trade"
            );
            Ok(Observed::Inserted)
        }
        observed_repo::Inserted::Duplicate => {
            counter!("trades_duplicate_total", "chain" => "solana").increment(1);
            Ok(Observed::Duplicate)
        }
    }
}

/// One-shot history import: page backwards per wallet until the page count
/// runs out, a page comes back empty, we hit already-stored history, or
/// shutdown flips.
pub async fn run_backfill(
    pool: &PgPool,
    rpc: &SolanaRpc,
    config: &AppConfig,
    shutdown: &watch::Receiver<bool>,
) -> u64 {
    let wallets = match wallet_repo::list_followed(pool, Chain::Solana).await {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "backfill: failed to load followed wallets");
            return 0;
        }
    };

    let mut inserted = 0u64;
    for wallet in &wallets {
        let mut before: Option<String> = None;
        'pages: for _ in 0..config.sol_backfill_pages {
            if *shutdown.borrow() {
                tracing::info!(inserted, "backfill interrupted by shutdown");
                return inserted;
            }
            let sigs = match rpc
                .get_signatures_for_address(&wallet.address, before.as_deref(), config.sol_backfill_limit)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(error = %e, wallet = %wallet.address, "backfill page failed");
                    break;
                }
            };
            if sigs.is_empty() {
                break;
            }
            before = sigs.last().map(|s| s.signature.clone());

            for sig in &sigs {
                // Already stored: everything older is stored too. The check
                // is cheaper than re-fetching the transaction.
                match observed_repo::exists(pool, Chain::Solana, &sig.signature).await {
                    Ok(true) => break 'pages,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(error = %e, signature = %sig.signature, "backfill lookup failed");
                        break 'pages;
                    }
                }
                match observe_signature(pool, rpc, &wallet.address, &sig.signature).await {
                    Ok(Observed::Inserted) => inserted += 1,
                    Ok(Observed::Duplicate) => break 'pages,
                    Ok(Observed::Unusable) => {}
                    Err(e) => {
                        tracing::error!(error = %e, signature = %sig.signature, "backfill insert failed");
                    }
                }
            }
        }
    }
    inserted
}

/// Poll recent signatures per followed wallet on an interval.
async fn run_polling(
    pool: &PgPool,
    rpc: &SolanaRpc,
    config: &AppConfig,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut seen: HashSet<String> = HashSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(Duration::from_secs(config.sol_poll_interval_secs)) => {}
        }

        let wallets = match wallet_repo::list_followed(pool, Chain::Solana).await {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "failed to load followed wallets");
                continue;
            }
        };

        for wallet in &wallets {
            let sigs = match rpc
                .get_signatures_for_address(&wallet.address, None, 100)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(error = %e, wallet = %wallet.address, "signature poll failed");
                    continue;
                }
            };
            for sig in &sigs {
                if !seen.insert(sig.signature.clone()) {
                    continue;
                }
                if let Err(e) = observe_signature(pool, rpc, &wallet.address, &sig.signature).await
                {
                    tracing::error!(error = %e, signature = %sig.signature, "failed to record observation");
                }
            }
        }

        // The seen-set only needs to cover poll overlap.
        if seen.len() > 10_000 {
            seen.clear();
        }
    }
}

/// logsSubscribe over WSS, one subscription per wallet (or ALL with local
/// filtering). Reconnects with exponential backoff.
async fn run_subscription(
    pool: &PgPool,
    rpc: &SolanaRpc,
    config: &AppConfig,
    shutdown: &mut watch::Receiver<bool>,
) {
    let ws_url = config.sol_ws_endpoint();
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        let wallets: Vec<String> = match wallet_repo::list_followed(pool, Chain::Solana).await {
            Ok(w) => w.into_iter().map(|w| w.address).collect(),
            Err(e) => {
                tracing::error!(error = %e, "failed to load followed wallets");
                sleep(BASE_RECONNECT_DELAY).await;
                continue;
            }
        };
        if wallets.is_empty() {
            tracing::warn!("no Solana wallets followed, subscription idle");
            sleep(MAX_RECONNECT_DELAY).await;
            continue;
        }
        let wallet_set: HashSet<String> = wallets.iter().cloned().collect();

        tracing::info!(url = %ws_url, "connecting Solana logs subscription");
        match connect_async(&ws_url).await {
            Ok((ws_stream, _response)) => {
                attempt = 0;
                let (mut write, mut read) = ws_stream.split();

                let subscriptions: Vec<String> = if config.sol_subscribe_all {
                    vec![json!({
                        "jsonrpc": "2.0", "id": 1, "method": "logsSubscribe",
                        "params": ["all", {"commitment": "confirmed"}]
                    })
                    .to_string()]
                } else {
                    wallets
                        .iter()
                        .enumerate()
                        .map(|(i, w)| {
                            json!({
                                "jsonrpc": "2.0", "id": i + 1, "method": "logsSubscribe",
                                "params": [{"mentions": [w]}, {"commitment": "confirmed"}]
                            })
                            .to_string()
                        })
                        .collect()
                };
                let mut subscribed = true;
                for msg in subscriptions {
                    if let Err(e) = write.send(Message::Text(msg.into())).await {
                        tracing::error!(error = %e, "failed to send subscribe message");
                        subscribed = false;
                        break;
                    }
                }

                if subscribed {
                    tracing::info!(wallet_count = wallet_set.len(), "logs subscription established");
                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => return,
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        handle_log_message(pool, rpc, &wallet_set, text.as_ref()).await;
                                    }
                                    Some(Ok(Message::Ping(data))) => {
                                        if write.send(Message::Pong(data)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) | None => {
                                        tracing::warn!("subscription stream closed");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        tracing::error!(error = %e, "subscription read error");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "subscription connect failed");
            }
        }

        let delay = (BASE_RECONNECT_DELAY * 2u32.saturating_pow(attempt)).min(MAX_RECONNECT_DELAY);
        attempt = attempt.saturating_add(1);
        tracing::info!(delay_secs = delay.as_secs(), attempt, "reconnecting subscription");
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn handle_log_message(
    pool: &PgPool,
    rpc: &SolanaRpc,
    wallets: &HashSet<String>,
    text: &str,
) {
    let msg: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };
    let value = match msg.pointer("/params/result/value") {
        Some(v) => v,
        None => return, // subscription acks etc.
    };
    let signature = match value.get("signature").and_then(Value::as_str) {
        Some(s) => s,
        None => return,
    };
    if value.get("err").is_some_and(|e| !e.is_null()) {
        return;
    }

    // The notification names no wallet, only a signature. Fetch the
    // transaction once and attribute it from its own account list.
    let tx = match rpc.get_transaction(signature).await {
        Ok(Some(tx)) => tx,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(error = %e, signature, "notification transaction fetch failed");
            return;
        }
    };
    let wallet = match attribute_wallet(&tx, wallets) {
        Some(w) => w,
        None => return,
    };
    if let Err(e) = observe_transaction(pool, &tx, &wallet, signature).await {
        tracing::error!(error = %e, signature, "failed to record observation");
    }
}

/// Followed wallet a transaction touches: first match among the account
/// keys, then among token-balance owners (covers delegated token accounts
/// whose owner never appears as a signer key).
fn attribute_wallet(tx: &TxResult, wallets: &HashSet<String>) -> Option<String> {
    let keys = tx
        .transaction
        .as_ref()
        .and_then(|t| t.message.as_ref())
        .map(|m| m.account_keys.as_slice())
        .unwrap_or(&[]);
    if let Some(key) = keys.iter().find(|k| wallets.contains(&k.pubkey)) {
        return Some(key.pubkey.clone());
    }

    let meta = tx.meta.as_ref()?;
    meta.post_token_balances
        .iter()
        .chain(meta.pre_token_balances.iter())
        .filter_map(|b| b.owner.as_ref())
        .find(|owner| wallets.contains(*owner))
        .cloned()
}

/// Entry point: optional backfill, then subscription or polling.
pub async fn run_solana_watcher(
    pool: PgPool,
    config: Arc<AppConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let rpc = SolanaRpc::new(reqwest::Client::new(), config.sol_rpc_url.clone());
    tracing::info!(rpc = %config.sol_rpc_url, "Solana watcher started");

    if config.sol_backfill_pages > 0 {
        let inserted = run_backfill(&pool, &rpc, &config, &shutdown).await;
        tracing::info!(inserted, "backfill completed");
    }

    if config.sol_subscribe_logs {
        run_subscription(&pool, &rpc, &config, &mut shutdown).await;
    } else {
        run_polling(&pool, &rpc, &config, &mut shutdown).await;
    }
}
