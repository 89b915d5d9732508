use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Protocol family a trade belongs to. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Evm,
    Solana,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Evm => "evm",
            Chain::Solana => "solana",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "evm" => Some(Chain::Evm),
            "solana" => Some(Chain::Solana),
            _ => None,
        }
    }

    /// Canonicalize an address per the chain's case convention:
    /// lowercase hex for EVM, case-preserved base58 for Solana.
    pub fn canonical_address(&self, addr: &str) -> String {
        match self {
            Chain::Evm => addr.to_lowercase(),
            Chain::Solana => addr.to_string(),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TradeStatus
// ---------------------------------------------------------------------------

/// Terminal outcome of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Skipped,
    Success,
    Failed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Skipped => "skipped",
            TradeStatus::Success => "success",
            TradeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FollowedWallet
// ---------------------------------------------------------------------------

/// Database row for followed_wallets. Owned by the wallet-list tooling;
/// read-only to the core and re-read per executor cycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowedWallet {
    pub id: i64,
    pub chain: String,
    pub address: String,
    pub copy_ratio: Option<f64>,
    pub slippage_bps: Option<i32>,
    pub max_native_in: Option<String>,
    pub allowed_tokens: Option<Vec<String>>,
    pub denied_tokens: Option<Vec<String>>,
    pub created_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ObservedTrade
// ---------------------------------------------------------------------------

/// Database row for observed_trades. Immutable after insert apart from the
/// `processed` transition performed by the claim.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ObservedTrade {
    pub id: i64,
    pub chain: String,
    pub tx_hash: String,
    pub block_number: i64,
    pub wallet: String,
    pub dex: Option<String>,
    pub method: Option<String>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: Option<String>,
    pub min_out: Option<String>,
    pub raw_input: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub processed: bool,
}

/// Watcher-side insert payload for an observed trade.
#[derive(Debug, Clone)]
pub struct NewObservedTrade {
    pub chain: Chain,
    pub tx_hash: String,
    pub block_number: i64,
    pub wallet: String,
    pub dex: Option<String>,
    pub method: Option<String>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: Option<String>,
    pub min_out: Option<String>,
    pub raw_input: Option<String>,
}

impl fmt::Display for NewObservedTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observed: chain={} wallet={} tx={} method={} {}->{}",
            self.chain,
            self.wallet,
            &self.tx_hash[..12.min(self.tx_hash.len())],
            self.method.as_deref().unwrap_or("?"),
            self.token_in.as_deref().unwrap_or("?"),
            self.token_out.as_deref().unwrap_or("?"),
        )
    }
}

// ---------------------------------------------------------------------------
// ExecutedTrade
// ---------------------------------------------------------------------------

/// Database row for executed_trades. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutedTrade {
    pub id: i64,
    pub observed_trade_id: i64,
    pub status: String,
    pub tx_hash: Option<String>,
    pub fee_spent: Option<String>,
    pub error: Option<String>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: Option<String>,
    pub amount_out: Option<String>,
    pub amount_in_usd: Option<f64>,
    pub amount_out_usd: Option<f64>,
    pub pnl_usd: Option<f64>,
    pub realized_at: Option<DateTime<Utc>>,
}

/// Executor-side record of one execution attempt, built up through the
/// per-trade state machine and inserted once terminal.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub observed_trade_id: i64,
    pub status: TradeStatus,
    pub tx_hash: Option<String>,
    pub fee_spent: Option<String>,
    pub error: Option<String>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: Option<String>,
    pub amount_out: Option<String>,
    pub amount_in_usd: Option<f64>,
    pub amount_out_usd: Option<f64>,
    pub pnl_usd: Option<f64>,
}

impl ExecutionRecord {
    pub fn new(observed_trade_id: i64) -> Self {
        Self {
            observed_trade_id,
            status: TradeStatus::Skipped,
            tx_hash: None,
            fee_spent: None,
            error: None,
            token_in: None,
            token_out: None,
            amount_in: None,
            amount_out: None,
            amount_in_usd: None,
            amount_out_usd: None,
            pnl_usd: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_roundtrip() {
        assert_eq!(Chain::from_str("evm"), Some(Chain::Evm));
        assert_eq!(Chain::from_str("SOLANA"), Some(Chain::Solana));
        assert_eq!(Chain::from_str("bitcoin"), None);
        assert_eq!(Chain::Evm.as_str(), "evm");
    }

    #[test]
    fn test_canonical_address() {
        assert_eq!(
            Chain::Evm.canonical_address("0xABcD00000000000000000000000000000000EF12"),
            "0xabcd00000000000000000000000000000000ef12"
        );
        // Base58 is case-sensitive; Solana addresses pass through untouched.
        let sol = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
        assert_eq!(Chain::Solana.canonical_address(sol), sol);
    }

    #[test]
    fn test_status_str() {
        assert_eq!(TradeStatus::Skipped.as_str(), "skipped");
        assert_eq!(TradeStatus::Success.as_str(), "success");
        assert_eq!(TradeStatus::Failed.as_str(), "failed");
    }
}
