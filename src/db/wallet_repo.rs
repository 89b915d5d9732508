use sqlx::PgPool;

use crate::models::{Chain, FollowedWallet};

/// All followed wallets for a chain. The wallet list is owned by the import
/// tooling; the core treats each read as a point-in-time snapshot.
pub async fn list_followed(pool: &PgPool, chain: Chain) -> anyhow::Result<Vec<FollowedWallet>> {
    let wallets = sqlx::query_as::<_, FollowedWallet>(
        "SELECT * FROM followed_wallets WHERE chain = $1 ORDER BY id ASC",
    )
    .bind(chain.as_str())
    .fetch_all(pool)
    .await?;

    Ok(wallets)
}

/// Look up a single followed wallet by canonical address.
pub async fn get_followed(
    pool: &PgPool,
    chain: Chain,
    address: &str,
) -> anyhow::Result<Option<FollowedWallet>> {
    let wallet = sqlx::query_as::<_, FollowedWallet>(
        "SELECT * FROM followed_wallets WHERE chain = $1 AND address = $2",
    )
    .bind(chain.as_str())
    .bind(chain.canonical_address(address))
    .fetch_optional(pool)
    .await?;

    Ok(wallet)
}
