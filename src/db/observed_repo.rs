use sqlx::PgPool;

use crate::models::{Chain, NewObservedTrade, ObservedTrade};

/// Outcome of an observed-trade insert. Re-observing a transaction during
/// poll/backfill overlap is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Row(i64),
    Duplicate,
}

/// Insert an observed trade, deduplicating on (chain, tx_hash).
pub async fn insert_observed(pool: &PgPool, trade: &NewObservedTrade) -> anyhow::Result<Inserted> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO observed_trades
            (chain, tx_hash, block_number, wallet, dex, method,
             token_in, token_out, amount_in, min_out, raw_input)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (chain, tx_hash) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(trade.chain.as_str())
    .bind(&trade.tx_hash)
    .bind(trade.block_number)
    .bind(&trade.wallet)
    .bind(&trade.dex)
    .bind(&trade.method)
    .bind(&trade.token_in)
    .bind(&trade.token_out)
    .bind(&trade.amount_in)
    .bind(&trade.min_out)
    .bind(&trade.raw_input)
    .fetch_optional(pool)
    .await?;

    Ok(match id {
        Some(id) => Inserted::Row(id),
        None => Inserted::Duplicate,
    })
}

/// Atomically claim the oldest unprocessed trade for a chain: a single
/// conditional update that selects the row and flips `processed` in one
/// statement, so concurrent executors can never double-claim and no row lock
/// is held across chain RPC calls. A claimed trade is never reclaimed.
pub async fn claim_next_unprocessed(
    pool: &PgPool,
    chain: Chain,
) -> anyhow::Result<Option<ObservedTrade>> {
    let claimed = sqlx::query_as::<_, ObservedTrade>(
        r#"
        UPDATE observed_trades
        SET processed = TRUE
        WHERE id = (
            SELECT id FROM observed_trades
            WHERE processed = FALSE AND chain = $1
            ORDER BY id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(chain.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(claimed)
}

/// Whether a transaction has already been observed. Used by the backfill to
/// stop once it reaches previously stored history.
pub async fn exists(pool: &PgPool, chain: Chain, tx_hash: &str) -> anyhow::Result<bool> {
    let row: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM observed_trades WHERE chain = $1 AND tx_hash = $2",
    )
    .bind(chain.as_str())
    .bind(tx_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Fetch one observed trade by id.
pub async fn get_observed(pool: &PgPool, id: i64) -> anyhow::Result<Option<ObservedTrade>> {
    let trade = sqlx::query_as::<_, ObservedTrade>("SELECT * FROM observed_trades WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(trade)
}
