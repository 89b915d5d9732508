use std::collections::HashMap;
use std::env;

use crate::policy::RiskDefaults;

const DEFAULT_ONEINCH_URL: &str = "https://api.1inch.dev/swap/v5.2";
const DEFAULT_JUPITER_QUOTE_URL: &str = "https://quote-api.jup.ag/v6/quote";
const DEFAULT_JUPITER_SWAP_URL: &str = "https://quote-api.jup.ag/v6/swap";

/// Per-chain registry of known router contracts, V3 quoters and
/// wrapped-native token addresses. All entries are lowercase hex.
#[derive(Debug, Clone)]
pub struct RouterRegistry {
    routers: HashMap<u64, Vec<String>>,
    quoters: HashMap<u64, String>,
    wrapped_native: HashMap<u64, String>,
}

impl Default for RouterRegistry {
    fn default() -> Self {
        let mut routers: HashMap<u64, Vec<String>> = HashMap::new();
        routers.insert(
            1,
            vec![
                // Uniswap V2 and V3 main routers
                "0x7a250d5630b4cf539739df2c5dacb4c659f2488d".into(),
                "0xe592427a0aece92de3edee1f18e0157c05861564".into(),
            ],
        );
        routers.insert(
            137,
            vec![
                "0xe592427a0aece92de3edee1f18e0157c05861564".into(), // Uniswap V3
                "0xa5e0829caced8ffdd4de3c43696c57f7d7a678ff".into(), // QuickSwap V2
                "0x1b02da8cb0d097eb8d57a175b88c7d8b47997506".into(), // SushiSwap V2
            ],
        );
        routers.insert(
            8453,
            vec!["0x2626664c2603336e57b271c5c0b26f421741e481".into()], // Uniswap V3 Base
        );

        let mut quoters = HashMap::new();
        quoters.insert(1u64, "0xb27308f9f90d607463bb33ea1bebb41c27ce5ab6".to_string());
        quoters.insert(137, "0x61ffe014ba17989e743c5f6cb21bf9697530b21e".to_string());
        quoters.insert(8453, "0x61ffe014ba17989e743c5f6cb21bf9697530b21e".to_string());

        let mut wrapped_native = HashMap::new();
        wrapped_native.insert(1u64, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".to_string());
        wrapped_native.insert(137, "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270".to_string());
        wrapped_native.insert(8453, "0x4200000000000000000000000000000000000006".to_string());

        Self {
            routers,
            quoters,
            wrapped_native,
        }
    }
}

impl RouterRegistry {
    pub fn is_known_router(&self, chain_id: u64, addr: &str) -> bool {
        let addr = addr.to_lowercase();
        self.routers
            .get(&chain_id)
            .map(|list| list.iter().any(|r| *r == addr))
            .unwrap_or(false)
    }

    pub fn quoter(&self, chain_id: u64) -> Option<&str> {
        self.quoters.get(&chain_id).map(String::as_str)
    }

    pub fn wrapped_native(&self, chain_id: u64) -> Option<&str> {
        self.wrapped_native.get(&chain_id).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub dry_run: bool,
    pub metrics_listen_addr: Option<String>,

    // Role toggles: one process per (chain, role) pair is the intended deploy
    // shape, but a single process can run any combination.
    pub evm_watcher_enabled: bool,
    pub evm_executor_enabled: bool,
    pub sol_watcher_enabled: bool,
    pub sol_executor_enabled: bool,

    // EVM
    pub evm_rpc_url: String,
    pub evm_chain_id: u64,
    pub evm_private_key: Option<String>,
    pub executor_address: Option<String>,
    pub block_poll_interval_secs: u64,
    pub tx_deadline_secs: u64,
    pub max_fee_gwei: Option<f64>,
    pub max_priority_fee_gwei: Option<f64>,
    pub trace_rpc_url: Option<String>,

    // Solana
    pub sol_rpc_url: String,
    pub sol_ws_url: Option<String>,
    pub sol_private_key: Option<String>,
    pub sol_executor_pubkey: Option<String>,
    pub sol_backfill_pages: u32,
    pub sol_backfill_limit: u32,
    pub sol_subscribe_logs: bool,
    pub sol_subscribe_all: bool,
    pub sol_poll_interval_secs: u64,

    // Risk defaults (per-wallet overrides live in followed_wallets)
    pub risk_defaults: RiskDefaults,

    // Aggregators, in priority order, already resolved for the configured
    // EVM chain (AGGREGATOR_CHAIN_<id> overrides the global AGGREGATORS list).
    pub evm_aggregators: Vec<String>,
    pub oneinch_base_url: String,
    pub oneinch_api_key: Option<String>,
    pub zeroex_base_url: Option<String>,
    pub jupiter_quote_url: String,
    pub jupiter_swap_url: String,

    pub routers: RouterRegistry,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let evm_chain_id: u64 = env::var("EVM_CHAIN_ID")
            .unwrap_or_else(|_| "1".into())
            .parse()?;

        let global_aggregators = csv_list(&env::var("AGGREGATORS").unwrap_or_default());
        let chain_override =
            csv_list(&env::var(format!("AGGREGATOR_CHAIN_{evm_chain_id}")).unwrap_or_default());
        let evm_aggregators = if chain_override.is_empty() {
            global_aggregators
        } else {
            chain_override
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            dry_run: parse_bool("DRY_RUN", true),
            metrics_listen_addr: env::var("METRICS_LISTEN_ADDR").ok(),

            evm_watcher_enabled: parse_bool("EVM_WATCHER_ENABLED", false),
            evm_executor_enabled: parse_bool("EVM_EXECUTOR_ENABLED", false),
            sol_watcher_enabled: parse_bool("SOL_WATCHER_ENABLED", false),
            sol_executor_enabled: parse_bool("SOL_EXECUTOR_ENABLED", false),

            evm_rpc_url: env::var("EVM_RPC_URL")
                .unwrap_or_else(|_| "http://localhost:8545".into()),
            evm_chain_id,
            evm_private_key: non_empty(env::var("EVM_PRIVATE_KEY").ok()),
            executor_address: non_empty(env::var("EXECUTOR_ADDRESS").ok())
                .map(|a| a.to_lowercase()),
            block_poll_interval_secs: parse_u64("BLOCK_POLL_INTERVAL_SECS", 3),
            tx_deadline_secs: parse_u64("TX_DEADLINE_SECS", 600),
            max_fee_gwei: parse_opt_f64("MAX_FEE_GWEI"),
            max_priority_fee_gwei: parse_opt_f64("MAX_PRIORITY_FEE_GWEI"),
            trace_rpc_url: non_empty(env::var("TRACE_RPC_URL").ok()),

            sol_rpc_url: env::var("SOL_RPC_URL")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into()),
            sol_ws_url: non_empty(env::var("SOL_WS_URL").ok()),
            sol_private_key: non_empty(env::var("SOL_PRIVATE_KEY").ok()),
            sol_executor_pubkey: non_empty(env::var("SOL_EXECUTOR_PUBKEY").ok()),
            sol_backfill_pages: parse_u64("SOL_BACKFILL_PAGES", 0) as u32,
            sol_backfill_limit: parse_u64("SOL_BACKFILL_LIMIT", 100).max(1) as u32,
            sol_subscribe_logs: parse_bool("SOL_SUBSCRIBE_LOGS", false),
            sol_subscribe_all: parse_bool("SOL_SUBSCRIBE_ALL", false),
            sol_poll_interval_secs: parse_u64("SOL_POLL_INTERVAL_SECS", 2),

            risk_defaults: RiskDefaults {
                copy_ratio: env::var("COPY_RATIO")
                    .unwrap_or_else(|_| "1.0".into())
                    .parse()
                    .unwrap_or(1.0),
                slippage_bps: parse_u64("SLIPPAGE_BPS", 300) as u32,
                max_native_in: non_empty(env::var("MAX_NATIVE_IN").ok())
                    .and_then(|s| s.parse().ok())
                    .filter(|v: &u128| *v > 0),
                allowed_tokens: csv_list(&env::var("ALLOWED_TOKENS").unwrap_or_default()),
                denied_tokens: csv_list(&env::var("DENIED_TOKENS").unwrap_or_default()),
            },

            evm_aggregators,
            oneinch_base_url: env::var("ONEINCH_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ONEINCH_URL.into()),
            oneinch_api_key: non_empty(env::var("ONEINCH_API_KEY").ok()),
            zeroex_base_url: non_empty(env::var("ZEROEX_BASE_URL").ok()),
            jupiter_quote_url: env::var("JUPITER_QUOTE_URL")
                .unwrap_or_else(|_| DEFAULT_JUPITER_QUOTE_URL.into()),
            jupiter_swap_url: env::var("JUPITER_SWAP_URL")
                .unwrap_or_else(|_| DEFAULT_JUPITER_SWAP_URL.into()),

            routers: RouterRegistry::default(),
        })
    }

    /// 0x API base URL for the configured chain, env override first.
    pub fn zeroex_url_for(&self, chain_id: u64) -> String {
        if let Some(url) = &self.zeroex_base_url {
            return url.clone();
        }
        match chain_id {
            137 => "https://polygon.api.0x.org".into(),
            8453 => "https://base.api.0x.org".into(),
            _ => "https://api.0x.org".into(),
        }
    }

    /// WebSocket endpoint for the Solana logs subscription; derived from the
    /// HTTP RPC URL when not set explicitly.
    pub fn sol_ws_endpoint(&self) -> String {
        if let Some(url) = &self.sol_ws_url {
            return url.clone();
        }
        self.sol_rpc_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_opt_f64(key: &str) -> Option<f64> {
    non_empty(env::var(key).ok()).and_then(|v| v.parse().ok())
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let reg = RouterRegistry::default();
        assert!(reg.is_known_router(1, "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"));
        assert!(!reg.is_known_router(1, "0x0000000000000000000000000000000000000001"));
        assert!(!reg.is_known_router(99999, "0x7a250d5630b4cf539739df2c5dacb4c659f2488d"));
    }

    #[test]
    fn test_registry_quoter_and_wrapped() {
        let reg = RouterRegistry::default();
        assert!(reg.quoter(1).is_some());
        assert!(reg.wrapped_native(8453).is_some());
        assert!(reg.quoter(42).is_none());
    }

    #[test]
    fn test_csv_list() {
        assert_eq!(csv_list("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(csv_list("").is_empty());
    }
}
