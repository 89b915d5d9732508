use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use metrics::counter;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::aggregators::{
    oneinch::OneInchClient, zeroex::ZeroExClient, AggregatorKind, AggregatorQuote, NATIVE_SENTINEL,
};
use crate::config::AppConfig;
use crate::db::{executed_repo, observed_repo, wallet_repo};
use crate::errors::TradeError;
use crate::evm::abi::{addr_hex, allowanceCall, approveCall, decode_swap_input, DecodedSwap, V2Method};
use crate::evm::planner::{
    clamp_native, quote_v2_min_out, quote_v3_min_out, scale_amount, V2SwapPlan, V3SinglePlan,
};
use crate::evm::reconcile;
use crate::evm::rpc::{hex_decode, EvmRpc};
use crate::evm::wallet::EvmWallet;
use crate::models::{Chain, ExecutionRecord, ObservedTrade, TradeStatus};
use crate::policy::{self, RiskPolicy};
use crate::pricing::{annotate_usd, native_scale, PriceClient};

const CLAIM_IDLE: Duration = Duration::from_millis(1500);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Claims observed EVM trades and mirrors them. Holds all chain clients; the
/// wallet is absent in observe-only deployments, which forces dry-run.
pub struct EvmExecutor {
    pool: PgPool,
    config: Arc<AppConfig>,
    rpc: EvmRpc,
    http: reqwest::Client,
    wallet: Option<EvmWallet>,
    price: PriceClient,
    oneinch: OneInchClient,
    zeroex: ZeroExClient,
}

impl EvmExecutor {
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let http = reqwest::Client::new();
        let rpc = EvmRpc::new(http.clone(), config.evm_rpc_url.clone());
        let wallet = match &config.evm_private_key {
            Some(key) => Some(EvmWallet::from_key(
                key,
                config.evm_chain_id,
                config.max_fee_gwei,
                config.max_priority_fee_gwei,
            )?),
            None => None,
        };
        let oneinch = OneInchClient::new(
            http.clone(),
            config.oneinch_base_url.clone(),
            config.oneinch_api_key.clone(),
        );
        let zeroex = ZeroExClient::new(http.clone(), config.zeroex_url_for(config.evm_chain_id));
        Ok(Self {
            pool,
            price: PriceClient::new(http.clone()),
            config,
            rpc,
            http,
            wallet,
            oneinch,
            zeroex,
        })
    }

    /// Claim-execute-record loop. One trade at a time, oldest first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(dry_run = self.config.dry_run, "EVM executor started");
        loop {
            if *shutdown.borrow() {
                info!("EVM executor shutting down");
                return;
            }

            let claimed = match observed_repo::claim_next_unprocessed(&self.pool, Chain::Evm).await
            {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "claim failed");
                    sleep(CLAIM_IDLE).await;
                    continue;
                }
            };

            let trade = match claimed {
                Some(t) => t,
                None => {
                    tokio::select! {
                        _ = shutdown.changed() => continue,
                        _ = sleep(CLAIM_IDLE) => continue,
                    }
                }
            };

            info!(
                id = trade.id,
                method = trade.method.as_deref().unwrap_or("unknown"),
                dex = trade.dex.as_deref().unwrap_or(""),
                "processing observed trade"
            );

            let mut record = self.process(&trade).await;
            self.annotate(&mut record, &trade).await;

            match record.status {
                TradeStatus::Success => {
                    counter!("trades_executed_total", "chain" => "evm").increment(1)
                }
                TradeStatus::Skipped => {
                    counter!("trades_skipped_total", "chain" => "evm").increment(1)
                }
                TradeStatus::Failed => {
                    counter!("trades_failed_total", "chain" => "evm").increment(1)
                }
            }

            if let Err(e) = executed_repo::insert_executed(&self.pool, &record).await {
                tracing::error!(error = %e, id = trade.id, "failed to record execution");
            } else {
                info!(
                    id = trade.id,
                    status = %record.status,
                    tx_hash = record.tx_hash.as_deref().unwrap_or(""),
                    "execution recorded"
                );
            }
        }
    }

    /// Per-trade state machine. Always returns a terminal record; claim
    /// semantics guarantee it runs at most once per observed trade.
    pub async fn process(&self, trade: &ObservedTrade) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(trade.id);
        record.token_in = trade.token_in.clone();
        record.token_out = trade.token_out.clone();
        record.amount_in = trade.amount_in.clone();

        // Re-decode from the raw payload rather than trusting stored columns.
        let input = trade
            .raw_input
            .as_deref()
            .and_then(|raw| hex_decode(raw).ok())
            .unwrap_or_default();
        let decoded = match decode_swap_input(&input) {
            Some(d) => d,
            None => {
                record.error = Some(
                    TradeError::Decode(format!(
                        "unsupported method: {}",
                        trade.method.as_deref().unwrap_or("unknown")
                    ))
                    .to_string(),
                );
                return record;
            }
        };

        let overrides = match wallet_repo::get_followed(&self.pool, Chain::Evm, &trade.wallet).await
        {
            Ok(w) => w,
            Err(e) => {
                record.status = TradeStatus::Failed;
                record.error = Some(format!("policy lookup failed: {e}"));
                return record;
            }
        };
        let policy = policy::resolve(&self.config.risk_defaults, overrides.as_ref());

        let tokens: Vec<String> = match &decoded {
            DecodedSwap::V2 { path, .. } => path.iter().copied().map(addr_hex).collect(),
            DecodedSwap::V3Single(p) => vec![addr_hex(p.tokenIn), addr_hex(p.tokenOut)],
        };
        if !policy.tokens_allowed(&tokens) {
            record.error = Some(TradeError::Policy("tokens not allowed by policy".into()).to_string());
            return record;
        }

        let observed_amount_in = decoded.amount_in().or_else(|| {
            trade
                .amount_in
                .as_deref()
                .and_then(|s| U256::from_str_radix(s, 10).ok())
        });
        let observed_amount_in = match observed_amount_in {
            Some(v) if v > U256::ZERO => v,
            _ => {
                record.error = Some("no observed input amount".into());
                return record;
            }
        };

        let native_in = is_native_input(
            &decoded,
            self.config.routers.wrapped_native(self.config.evm_chain_id),
        );

        let mut use_amount_in = scale_amount(observed_amount_in, policy.copy_ratio);
        // The native cap applies to every decoded shape whose input is native.
        if native_in {
            use_amount_in = clamp_native(use_amount_in, policy.max_native_in);
        }
        if use_amount_in == U256::ZERO {
            record.error = Some("scaled input amount is zero".into());
            return record;
        }

        self.execute_swap(record, trade, &decoded, &policy, use_amount_in, native_in)
            .await
    }

    async fn execute_swap(
        &self,
        mut record: ExecutionRecord,
        trade: &ObservedTrade,
        decoded: &DecodedSwap,
        policy: &RiskPolicy,
        use_amount_in: U256,
        native_in: bool,
    ) -> ExecutionRecord {
        let router: Address = match trade.dex.as_deref().and_then(|d| d.parse().ok()) {
            Some(r) => r,
            None => {
                record.error = Some("observed dex address unparseable".into());
                return record;
            }
        };

        let recipient = match (&self.wallet, &self.config.executor_address) {
            (Some(w), _) => w.address,
            (None, Some(addr)) => addr.parse().unwrap_or(Address::ZERO),
            (None, None) => Address::ZERO,
        };
        let deadline = now_unix() + self.config.tx_deadline_secs;

        // Slippage-bounded minimum, degrading to zero on quote failure.
        let min_out = match decoded {
            DecodedSwap::V2 { path, .. } => {
                quote_v2_min_out(&self.rpc, router, use_amount_in, path, policy.slippage_bps).await
            }
            DecodedSwap::V3Single(p) => {
                let quoter: Option<Address> = self
                    .config
                    .routers
                    .quoter(self.config.evm_chain_id)
                    .and_then(|q| q.parse().ok());
                match quoter {
                    Some(quoter) => {
                        quote_v3_min_out(
                            &self.rpc,
                            quoter,
                            p.tokenIn,
                            p.tokenOut,
                            p.fee.to::<u32>(),
                            use_amount_in,
                            policy.slippage_bps,
                        )
                        .await
                    }
                    None => {
                        record.error = Some("no V3 quoter configured for chain".into());
                        return record;
                    }
                }
            }
        };

        if min_out == U256::ZERO {
            // Degraded quote removes slippage protection; flag it rather
            // than accepting it silently.
            record.error = Some("quote unavailable, min_out degraded to zero".into());
        }

        let (token_in, token_out) = match (decoded.token_in(), decoded.token_out()) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                record.error = Some("decoded swap lacks token endpoints".into());
                return record;
            }
        };

        // Aggregators take priority over direct router execution.
        for name in &self.config.evm_aggregators {
            let Some(kind) = AggregatorKind::parse(name) else {
                warn!(aggregator = %name, "unknown aggregator name, skipping");
                continue;
            };
            match self
                .aggregator_quote(kind, token_in, token_out, use_amount_in, native_in, policy)
                .await
            {
                Ok(quote) => {
                    return self
                        .settle_aggregator(record, quote, token_in, use_amount_in, native_in)
                        .await;
                }
                Err(e) => {
                    warn!(aggregator = %name, error = %e, "aggregator failed, trying next");
                }
            }
        }

        // Router fallback.
        let (calldata, value) = match decoded {
            DecodedSwap::V2 { method, path, .. } => {
                let plan = V2SwapPlan {
                    method: *method,
                    router,
                    path: path.clone(),
                    amount_in: use_amount_in,
                    min_out,
                    recipient,
                    deadline,
                    value: if native_in { use_amount_in } else { U256::ZERO },
                };
                (plan.calldata(), plan.value)
            }
            DecodedSwap::V3Single(p) => {
                let plan = V3SinglePlan {
                    router,
                    token_in: p.tokenIn,
                    token_out: p.tokenOut,
                    fee: p.fee.to::<u32>(),
                    amount_in: use_amount_in,
                    min_out,
                    recipient,
                    deadline,
                    value: if native_in { use_amount_in } else { U256::ZERO },
                };
                (plan.calldata(), plan.value)
            }
        };

        let wallet = match (&self.wallet, self.config.dry_run) {
            (Some(w), false) => w,
            _ => {
                // Dry run records the plan's estimate without submitting.
                record.amount_out = Some(min_out.to_string());
                return record;
            }
        };

        if !native_in {
            if let Err(e) = self
                .ensure_allowance(wallet, token_in, router, use_amount_in)
                .await
            {
                record.status = TradeStatus::Failed;
                record.error = Some(format!("allowance setup failed: {e}"));
                return record;
            }
        }

        let tx_hash = match wallet.send(&self.rpc, router, value, calldata).await {
            Ok(h) => h,
            Err(e) => {
                record.status = TradeStatus::Failed;
                record.error = Some(TradeError::Submission(e.to_string()).to_string());
                return record;
            }
        };
        record.tx_hash = Some(tx_hash.clone());

        match self.rpc.wait_for_receipt(&tx_hash, RECEIPT_TIMEOUT).await {
            Ok(Some(rcpt)) => {
                record.fee_spent = reconcile::fee_spent(&rcpt).map(|f| f.to_string());
                if rcpt.status.as_deref() == Some("0x1") {
                    record.status = TradeStatus::Success;
                    let executor = addr_hex(wallet.address);
                    let realized = reconcile::realized_output(
                        &self.rpc,
                        &self.http,
                        &rcpt,
                        &tx_hash,
                        &executor,
                        trade.token_out.as_deref(),
                        self.config
                            .routers
                            .wrapped_native(self.config.evm_chain_id),
                        self.config.trace_rpc_url.as_deref(),
                        min_out,
                    )
                    .await;
                    record.amount_out = Some(realized.to_string());
                } else {
                    record.status = TradeStatus::Failed;
                    record.error = Some("transaction reverted".into());
                }
            }
            Ok(None) => {
                // Submitted but unconfirmed within the window; keep the
                // estimate rather than guessing at the realized amount.
                record.status = TradeStatus::Success;
                record.amount_out = Some(min_out.to_string());
            }
            Err(e) => {
                record.status = TradeStatus::Success;
                record.amount_out = Some(min_out.to_string());
                record.error = Some(TradeError::Reconciliation(e.to_string()).to_string());
                warn!(error = %e, tx_hash = %tx_hash, "receipt lookup failed");
            }
        }

        record
    }

    async fn aggregator_quote(
        &self,
        kind: AggregatorKind,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        native_in: bool,
        policy: &RiskPolicy,
    ) -> anyhow::Result<AggregatorQuote> {
        let taker = match (&self.wallet, &self.config.executor_address) {
            (Some(w), _) => addr_hex(w.address),
            (None, Some(addr)) => addr.clone(),
            (None, None) => anyhow::bail!("no executor address configured"),
        };
        let quote = match kind {
            AggregatorKind::OneInch => {
                let src = if native_in {
                    NATIVE_SENTINEL.to_string()
                } else {
                    addr_hex(token_in)
                };
                self.oneinch
                    .swap_quote(
                        self.config.evm_chain_id,
                        &src,
                        &addr_hex(token_out),
                        amount_in,
                        &taker,
                        policy.slippage_bps,
                    )
                    .await?
            }
            AggregatorKind::ZeroEx => {
                let sell = if native_in {
                    "ETH".to_string()
                } else {
                    addr_hex(token_in)
                };
                self.zeroex
                    .swap_quote(
                        &sell,
                        &addr_hex(token_out),
                        amount_in,
                        &taker,
                        policy.slippage_bps,
                    )
                    .await?
            }
        };
        Ok(quote)
    }

    async fn settle_aggregator(
        &self,
        mut record: ExecutionRecord,
        quote: AggregatorQuote,
        token_in: Address,
        amount_in: U256,
        native_in: bool,
    ) -> ExecutionRecord {
        record.amount_out = Some(quote.buy_amount.to_string());

        let wallet = match (&self.wallet, self.config.dry_run) {
            (Some(w), false) => w,
            _ => return record, // dry-run estimate, stays skipped
        };

        if !native_in {
            if let Some(spender) = quote.allowance_target.as_deref().and_then(|s| s.parse().ok())
            {
                if let Err(e) = self
                    .ensure_allowance(wallet, token_in, spender, amount_in)
                    .await
                {
                    record.status = TradeStatus::Failed;
                    record.error = Some(format!("allowance setup failed: {e}"));
                    return record;
                }
            }
        }

        let to: Address = match quote.to.parse() {
            Ok(a) => a,
            Err(_) => {
                record.status = TradeStatus::Failed;
                record.error = Some("aggregator returned unparseable target".into());
                return record;
            }
        };

        match wallet.send(&self.rpc, to, quote.value, quote.call_data).await {
            Ok(tx_hash) => {
                record.tx_hash = Some(tx_hash);
                record.status = TradeStatus::Success;
            }
            Err(e) => {
                record.status = TradeStatus::Failed;
                record.error = Some(TradeError::Submission(e.to_string()).to_string());
            }
        }
        record
    }

    /// ERC-20 allowance precondition: approve exactly the needed amount when
    /// the current allowance is short.
    async fn ensure_allowance(
        &self,
        wallet: &EvmWallet,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> anyhow::Result<()> {
        let call = allowanceCall {
            owner: wallet.address,
            spender,
        };
        let ret = self.rpc.call(token, &call.abi_encode()).await?;
        let current = allowanceCall::abi_decode_returns(&ret).unwrap_or(U256::ZERO);
        if current >= amount {
            return Ok(());
        }

        info!(
            token = %addr_hex(token),
            spender = %addr_hex(spender),
            amount = %amount,
            "approving spender"
        );
        let data = approveCall { spender, amount }.abi_encode();
        let tx_hash = wallet.send(&self.rpc, token, U256::ZERO, data.into()).await?;
        self.rpc
            .wait_for_receipt(&tx_hash, Duration::from_secs(60))
            .await?;
        Ok(())
    }

    async fn annotate(&self, record: &mut ExecutionRecord, trade: &ObservedTrade) {
        if record.status == TradeStatus::Failed {
            return;
        }
        let chain_id = self.config.evm_chain_id;
        let wrapped = self.config.routers.wrapped_native(chain_id);
        // Wrapped native prices as the native asset.
        let token_in = trade.token_in.as_deref().filter(|t| Some(*t) != wrapped);
        let token_out = trade.token_out.as_deref().filter(|t| Some(*t) != wrapped);
        let price_in = self.price.spot_price_usd(Chain::Evm, chain_id, token_in).await;
        let price_out = self.price.spot_price_usd(Chain::Evm, chain_id, token_out).await;
        annotate_usd(record, price_in, price_out, native_scale(Chain::Evm));
    }
}

/// Whether the swap spends the chain's native asset, either directly
/// (value-carrying V2 swap) or as the wrapped-native token. Drives the
/// native-input cap for every decoded shape.
fn is_native_input(decoded: &DecodedSwap, wrapped_native: Option<&str>) -> bool {
    let is_wrapped = |addr: Address| wrapped_native.is_some_and(|w| addr_hex(addr) == w);
    match decoded {
        DecodedSwap::V2 { method, path, .. } => {
            *method == V2Method::EthForTokens || path.first().copied().is_some_and(is_wrapped)
        }
        DecodedSwap::V3Single(p) => is_wrapped(p.tokenIn),
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::abi::ExactInputSingleParams;
    use alloy::primitives::address;
    use alloy::primitives::aliases::{U160, U24};

    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn v2(method: V2Method, path: Vec<Address>) -> DecodedSwap {
        DecodedSwap::V2 {
            method,
            amount_in: Some(U256::from(1_000u64)),
            min_out: U256::from(900u64),
            path,
        }
    }

    #[test]
    fn test_wrapped_native_v2_input_counts_as_native() {
        let weth = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        let dai = address!("6b175474e89094c44da98b954eedeac495271d0f");

        let decoded = v2(V2Method::TokensForTokens, vec![weth, dai]);
        assert!(is_native_input(&decoded, Some(WETH)));

        // Reverse direction spends the token side.
        let decoded = v2(V2Method::TokensForTokens, vec![dai, weth]);
        assert!(!is_native_input(&decoded, Some(WETH)));
    }

    #[test]
    fn test_eth_for_tokens_is_native_without_registry_entry() {
        let weth = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        let dai = address!("6b175474e89094c44da98b954eedeac495271d0f");
        let decoded = v2(V2Method::EthForTokens, vec![weth, dai]);
        assert!(is_native_input(&decoded, None));
    }

    #[test]
    fn test_v3_native_input_by_token_in() {
        let params = ExactInputSingleParams {
            tokenIn: address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            tokenOut: address!("6b175474e89094c44da98b954eedeac495271d0f"),
            fee: U24::from(3000u32),
            recipient: address!("1111111111111111111111111111111111111111"),
            deadline: U256::from(1_700_000_000u64),
            amountIn: U256::from(5_000u64),
            amountOutMinimum: U256::from(4_500u64),
            sqrtPriceLimitX96: U160::ZERO,
        };
        assert!(is_native_input(&DecodedSwap::V3Single(params.clone()), Some(WETH)));
        assert!(!is_native_input(&DecodedSwap::V3Single(params), None));
    }
}
