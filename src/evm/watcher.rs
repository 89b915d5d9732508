use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use metrics::counter;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::db::{observed_repo, wallet_repo};
use crate::evm::abi::{addr_hex, decode_swap_input};
use crate::evm::rpc::{hex_decode, hex_to_u256, EvmRpc, RpcBlock, RpcTransaction};
use crate::models::{Chain, NewObservedTrade};

/// What the watcher managed to extract from a router transaction. Decode
/// failure still produces a row, with amount_in falling back to tx value.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ObservedFields {
    pub method: Option<String>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: Option<String>,
    pub min_out: Option<String>,
}

pub fn observe_fields(input: &[u8], tx_value: U256) -> ObservedFields {
    let mut fields = ObservedFields::default();

    if let Some(decoded) = decode_swap_input(input) {
        fields.method = Some(decoded.method().to_string());
        fields.token_in = decoded.token_in().map(addr_hex);
        fields.token_out = decoded.token_out().map(addr_hex);
        fields.amount_in = decoded.amount_in().map(|v| v.to_string());
        fields.min_out = Some(decoded.min_out().to_string());
    }

    if fields.amount_in.is_none() && tx_value > U256::ZERO {
        fields.amount_in = Some(tx_value.to_string());
    }

    fields
}

/// Poll new blocks and record every swap a followed wallet sends to a known
/// router. Runs until the shutdown signal flips.
pub async fn run_evm_watcher(
    pool: PgPool,
    config: Arc<AppConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let rpc = EvmRpc::new(reqwest::Client::new(), config.evm_rpc_url.clone());
    let chain_id = config.evm_chain_id;
    tracing::info!(chain_id, rpc = %config.evm_rpc_url, "EVM watcher started");

    let mut last_block = loop {
        match rpc.block_number().await {
            Ok(n) => break n,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch initial block number, retrying");
                sleep(Duration::from_secs(config.block_poll_interval_secs)).await;
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    };
    tracing::info!(block = last_block, "initial block");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("EVM watcher shutting down");
                return;
            }
            _ = sleep(Duration::from_secs(config.block_poll_interval_secs)) => {}
        }

        let latest = match rpc.block_number().await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "block number fetch failed");
                continue;
            }
        };
        if latest <= last_block {
            continue;
        }

        let followed: HashSet<String> = match wallet_repo::list_followed(&pool, Chain::Evm).await {
            Ok(wallets) => wallets.into_iter().map(|w| w.address.to_lowercase()).collect(),
            Err(e) => {
                tracing::error!(error = %e, "failed to load followed wallets");
                continue;
            }
        };
        if followed.is_empty() {
            tracing::warn!("no EVM wallets followed, skipping block range");
            last_block = latest;
            continue;
        }

        for bn in (last_block + 1)..=latest {
            let block = match rpc.get_block_with_txs(bn).await {
                Ok(Some(b)) => b,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, block = bn, "block fetch failed");
                    break;
                }
            };

            if let Err(e) = process_block(&pool, &config, &followed, bn, &block).await {
                tracing::error!(error = %e, block = bn, "block processing failed, retrying height");
                break;
            }
            last_block = bn;
        }
    }
}

/// Record every candidate swap in one block. A store failure aborts the
/// block so the cursor stays put and the height is re-scanned next tick;
/// inserts are idempotent, so repeating a partial pass is safe.
pub async fn process_block(
    pool: &PgPool,
    config: &AppConfig,
    followed: &HashSet<String>,
    block_number: u64,
    block: &RpcBlock,
) -> anyhow::Result<()> {
    for tx in &block.transactions {
        observe_tx(pool, config, followed, block_number, tx).await?;
    }
    Ok(())
}

async fn observe_tx(
    pool: &PgPool,
    config: &AppConfig,
    followed: &HashSet<String>,
    block_number: u64,
    tx: &RpcTransaction,
) -> anyhow::Result<()> {
    let from = tx.from.to_lowercase();
    let to = match &tx.to {
        Some(to) => to.to_lowercase(),
        None => return Ok(()), // contract creation
    };

    if !followed.contains(&from) && !followed.contains(&to) {
        return Ok(());
    }
    // Approvals and plain transfers to followed wallets are not swaps.
    if !config.routers.is_known_router(config.evm_chain_id, &to) {
        return Ok(());
    }

    let input_hex = tx.input.as_deref().unwrap_or("0x");
    let input = hex_decode(input_hex).unwrap_or_default();
    let value = tx
        .value
        .as_deref()
        .and_then(|v| hex_to_u256(v).ok())
        .unwrap_or(U256::ZERO);

    let fields = observe_fields(&input, value);

    let trade = NewObservedTrade {
        chain: Chain::Evm,
        tx_hash: tx.hash.to_lowercase(),
        block_number: block_number as i64,
        wallet: from,
        dex: Some(to),
        method: fields.method,
        token_in: fields.token_in,
        token_out: fields.token_out,
        amount_in: fields.amount_in,
        min_out: fields.min_out,
        raw_input: Some(input_hex.to_string()),
    };

    match observed_repo::insert_observed(pool, &trade).await? {
        observed_repo::Inserted::Row(id) => {
            counter!("trades_observed_total", "chain" => "evm").increment(1);
            tracing::info!(
                id,
                wallet = %trade.wallet,
                dex = trade.dex.as_deref().unwrap_or(""),
                method = trade.method.as_deref().unwrap_or("unknown"),
                token_in = trade.token_in.as_deref().unwrap_or(""),
                token_out = trade.token_out.as_deref().unwrap_or(""),
                "observed trade"
            );
        }
        observed_repo::Inserted::Duplicate => {
            counter!("trades_duplicate_total", "chain" => "evm").increment(1);
        }
    }
    Ok(())
}
