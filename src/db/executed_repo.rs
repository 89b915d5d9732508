use sqlx::PgPool;

use crate::models::{ExecutedTrade, ExecutionRecord};

/// Insert the terminal record of one execution attempt. Rows are never
/// mutated afterwards; USD annotation happens before this call.
pub async fn insert_executed(
    pool: &PgPool,
    record: &ExecutionRecord,
) -> anyhow::Result<ExecutedTrade> {
    let executed = sqlx::query_as::<_, ExecutedTrade>(
        r#"
        INSERT INTO executed_trades
            (observed_trade_id, status, tx_hash, fee_spent, error,
             token_in, token_out, amount_in, amount_out,
             amount_in_usd, amount_out_usd, pnl_usd)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(record.observed_trade_id)
    .bind(record.status.as_str())
    .bind(&record.tx_hash)
    .bind(&record.fee_spent)
    .bind(&record.error)
    .bind(&record.token_in)
    .bind(&record.token_out)
    .bind(&record.amount_in)
    .bind(&record.amount_out)
    .bind(record.amount_in_usd)
    .bind(record.amount_out_usd)
    .bind(record.pnl_usd)
    .fetch_one(pool)
    .await?;

    Ok(executed)
}

/// All execution attempts for an observed trade, oldest first.
pub async fn get_by_observed(
    pool: &PgPool,
    observed_trade_id: i64,
) -> anyhow::Result<Vec<ExecutedTrade>> {
    let rows = sqlx::query_as::<_, ExecutedTrade>(
        "SELECT * FROM executed_trades WHERE observed_trade_id = $1 ORDER BY id ASC",
    )
    .bind(observed_trade_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
