use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use metrics::counter;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::aggregators::jupiter::JupiterClient;
use crate::aggregators::AggregatorError;
use crate::config::AppConfig;
use crate::db::{executed_repo, observed_repo, wallet_repo};
use crate::errors::TradeError;
use crate::models::{Chain, ExecutionRecord, ObservedTrade, TradeStatus};
use crate::policy;
use crate::pricing::{annotate_usd, native_scale, PriceClient};
use crate::solana::balances::{infer_swap_delta, WRAPPED_SOL_MINT};
use crate::solana::rpc::SolanaRpc;

const CLAIM_IDLE: Duration = Duration::from_millis(1500);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(90);

/// Claims observed Solana trades and mirrors them through Jupiter.
pub struct SolanaExecutor {
    pool: PgPool,
    config: Arc<AppConfig>,
    rpc: SolanaRpc,
    jupiter: JupiterClient,
    price: PriceClient,
    keypair: Option<Keypair>,
    pubkey: Option<Pubkey>,
}

impl SolanaExecutor {
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let http = reqwest::Client::new();
        let rpc = SolanaRpc::new(http.clone(), config.sol_rpc_url.clone());
        let jupiter = JupiterClient::new(
            http.clone(),
            config.jupiter_quote_url.clone(),
            config.jupiter_swap_url.clone(),
        );

        let keypair = match &config.sol_private_key {
            Some(encoded) => {
                let bytes = bs58::decode(encoded.trim())
                    .into_vec()
                    .map_err(|e| anyhow::anyhow!("invalid Solana private key encoding: {e}"))?;
                Some(
                    Keypair::from_bytes(&bytes)
                        .map_err(|e| anyhow::anyhow!("invalid Solana keypair: {e}"))?,
                )
            }
            None => None,
        };
        let pubkey = match (&keypair, &config.sol_executor_pubkey) {
            (Some(kp), _) => Some(kp.pubkey()),
            (None, Some(pk)) => Some(
                pk.parse()
                    .map_err(|e| anyhow::anyhow!("invalid SOL_EXECUTOR_PUBKEY: {e}"))?,
            ),
            (None, None) => None,
        };

        Ok(Self {
            pool,
            price: PriceClient::new(http),
            config,
            rpc,
            jupiter,
            keypair,
            pubkey,
        })
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(dry_run = self.config.dry_run, "Solana executor started");
        loop {
            if *shutdown.borrow() {
                info!("Solana executor shutting down");
                return;
            }

            let claimed =
                match observed_repo::claim_next_unprocessed(&self.pool, Chain::Solana).await {
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

            info!(id = trade.id, wallet = %trade.wallet, "processing observed trade");

            let mut record = self.process(&trade).await;
            self.annotate(&mut record, &trade).await;

            match record.status {
                TradeStatus::Success => {
                    counter!("trades_executed_total", "chain" => "solana").increment(1)
                }
                TradeStatus::Skipped => {
                    counter!("trades_skipped_total", "chain" => "solana").increment(1)
                }
                TradeStatus::Failed => {
                    counter!("trades_failed_total", "chain" => "solana").increment(1)
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

    /// Single-hop state machine: quote, then sign-and-submit unless dry-run.
    pub async fn process(&self, trade: &ObservedTrade) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(trade.id);
        record.token_in = trade.token_in.clone();
        record.token_out = trade.token_out.clone();
        record.amount_in = trade.amount_in.clone();

        // Missing legs mean the watcher could not infer a swap; skip, never retry.
        let (token_in, token_out, amount_in) = match (
            trade.token_in.as_deref(),
            trade.token_out.as_deref(),
            trade.amount_in.as_deref().and_then(|s| s.parse::<u64>().ok()),
        ) {
            (Some(i), Some(o), Some(a)) if a > 0 => (i, o, a),
            _ => {
                record.error =
                    Some(TradeError::Decode("insufficient data for quote".into()).to_string());
                return record;
            }
        };

        let overrides =
            match wallet_repo::get_followed(&self.pool, Chain::Solana, &trade.wallet).await {
                Ok(w) => w,
                Err(e) => {
                    record.status = TradeStatus::Failed;
                    record.error = Some(format!("policy lookup failed: {e}"));
                    return record;
                }
            };
        let policy = policy::resolve(&self.config.risk_defaults, overrides.as_ref());

        let route = match self
            .jupiter
            .quote(token_in, token_out, amount_in, policy.slippage_bps)
            .await
        {
            Ok(route) => route,
            Err(AggregatorError::NoRoute) => {
                record.status = TradeStatus::Failed;
                record.error = Some(TradeError::Quote("no Jupiter route".into()).to_string());
                return record;
            }
            Err(e) => {
                record.status = TradeStatus::Failed;
                record.error = Some(TradeError::Quote(e.to_string()).to_string());
                return record;
            }
        };
        record.amount_out = Some(route.out_amount.to_string());

        let (keypair, pubkey) = match (&self.keypair, self.pubkey) {
            (Some(kp), Some(pk)) if !self.config.dry_run => (kp, pk),
            _ => return record, // dry-run or observe-only, stays skipped
        };

        let swap_b64 = match self.jupiter.swap_transaction(&route, &pubkey.to_string()).await {
            Ok(tx) => tx,
            Err(e) => {
                record.status = TradeStatus::Failed;
                record.error = Some(format!("swap transaction fetch failed: {e}"));
                return record;
            }
        };

        let signed = match sign_swap(&swap_b64, keypair) {
            Ok(raw) => raw,
            Err(e) => {
                record.status = TradeStatus::Failed;
                record.error = Some(format!("signing failed: {e}"));
                return record;
            }
        };

        let signature = match self.rpc.send_transaction(&signed).await {
            Ok(sig) => sig,
            Err(e) => {
                record.status = TradeStatus::Failed;
                record.error = Some(TradeError::Submission(e.to_string()).to_string());
                return record;
            }
        };
        record.tx_hash = Some(signature.clone());

        match self.rpc.wait_for_confirmation(&signature, CONFIRM_TIMEOUT).await {
            Ok(true) => {
                record.status = TradeStatus::Success;
                self.reconcile(&mut record, &signature, &pubkey.to_string())
                    .await;
            }
            Ok(false) => {
                record.status = TradeStatus::Failed;
                record.error = Some("transaction not confirmed".into());
            }
            Err(e) => {
                // Submitted; absence of a status readout is not failure.
                record.status = TradeStatus::Success;
                record.error = Some(TradeError::Reconciliation(e.to_string()).to_string());
                warn!(error = %e, signature = %signature, "confirmation lookup failed");
            }
        }

        record
    }

    /// Realized output from the operator's own balance deltas; the quoted
    /// amount stays in place when the transaction cannot be re-read.
    async fn reconcile(&self, record: &mut ExecutionRecord, signature: &str, operator: &str) {
        let tx = match self.rpc.get_transaction(signature).await {
            Ok(Some(tx)) => tx,
            _ => return,
        };
        let meta = match &tx.meta {
            Some(meta) => meta,
            None => return,
        };
        record.fee_spent = meta.fee.map(|f| f.to_string());

        let account_keys = tx
            .transaction
            .as_ref()
            .and_then(|t| t.message.as_ref())
            .map(|m| m.account_keys.as_slice())
            .unwrap_or(&[]);
        let delta = infer_swap_delta(meta, account_keys, operator);
        if let Some(out) = delta.amount_out {
            record.amount_out = Some(out.to_string());
        }
    }

    async fn annotate(&self, record: &mut ExecutionRecord, trade: &ObservedTrade) {
        if record.status == TradeStatus::Failed {
            return;
        }
        // Wrapped SOL prices as the native asset.
        let mint_in = trade.token_in.as_deref().filter(|m| *m != WRAPPED_SOL_MINT);
        let mint_out = trade.token_out.as_deref().filter(|m| *m != WRAPPED_SOL_MINT);
        let price_in = self.price.spot_price_usd(Chain::Solana, 0, mint_in).await;
        let price_out = self.price.spot_price_usd(Chain::Solana, 0, mint_out).await;
        annotate_usd(record, price_in, price_out, native_scale(Chain::Solana));
    }
}

/// Deserialize a Jupiter-provided transaction and re-sign it with the
/// operator keypair.
fn sign_swap(swap_b64: &str, keypair: &Keypair) -> anyhow::Result<Vec<u8>> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(swap_b64)
        .map_err(|e| anyhow::anyhow!("bad base64 transaction: {e}"))?;
    let unsigned: VersionedTransaction = bincode::deserialize(&raw)
        .map_err(|e| anyhow::anyhow!("bad transaction encoding: {e}"))?;
    let signed = VersionedTransaction::try_new(unsigned.message, &[keypair])
        .map_err(|e| anyhow::anyhow!("signing failed: {e}"))?;
    bincode::serialize(&signed).map_err(|e| anyhow::anyhow!("serialization failed: {e}"))
}
