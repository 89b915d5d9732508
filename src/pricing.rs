use reqwest::Client;
use serde_json::Value;

use crate::models::{Chain, ExecutionRecord};

const COINGECKO_BASE: &str = "https://api.coingecko.com/api/v3";

/// Spot USD price lookups used only to annotate realized PnL, never to gate
/// execution. Every failure is swallowed; the USD fields stay null.
#[derive(Debug, Clone)]
pub struct PriceClient {
    http: Client,
    base_url: String,
}

impl PriceClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: COINGECKO_BASE.into(),
        }
    }

    /// USD price for a token, or the chain's native asset when `token` is None.
    pub async fn spot_price_usd(
        &self,
        chain: Chain,
        evm_chain_id: u64,
        token: Option<&str>,
    ) -> Option<f64> {
        match token {
            None => {
                let id = match chain {
                    Chain::Solana => "solana",
                    // Base native is ETH as well.
                    Chain::Evm if evm_chain_id == 1 || evm_chain_id == 8453 => "ethereum",
                    Chain::Evm if evm_chain_id == 137 => "matic-network",
                    Chain::Evm => return None,
                };
                self.simple_price(id).await
            }
            Some(addr) => {
                let platform = match chain {
                    Chain::Solana => "solana",
                    Chain::Evm => match evm_chain_id {
                        1 => "ethereum",
                        137 => "polygon-pos",
                        8453 => "base",
                        _ => return None,
                    },
                };
                self.token_price(platform, addr).await
            }
        }
    }

    async fn simple_price(&self, id: &str) -> Option<f64> {
        let url = format!("{}/simple/price", self.base_url);
        let body: Value = self
            .http
            .get(&url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .await
            .ok()?;
        body.get(id)?.get("usd")?.as_f64()
    }

    async fn token_price(&self, platform: &str, token: &str) -> Option<f64> {
        let url = format!("{}/simple/token_price/{}", self.base_url, platform);
        let body: Value = self
            .http
            .get(&url)
            .query(&[("contract_addresses", token), ("vs_currencies", "usd")])
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .await
            .ok()?;
        // Responses key by lowercase address, occasionally checksummed.
        let rec = body
            .get(token.to_lowercase())
            .or_else(|| body.as_object().and_then(|o| o.values().next()))?;
        rec.get("usd")?.as_f64()
    }
}

/// Native smallest-unit scale per chain, used for USD annotation.
pub fn native_scale(chain: Chain) -> f64 {
    match chain {
        Chain::Evm => 1e18,
        Chain::Solana => 1e9,
    }
}

/// Fill amount_in_usd / amount_out_usd / pnl_usd from spot prices where
/// amounts and prices are both available. Missing inputs leave fields null.
pub fn annotate_usd(
    record: &mut ExecutionRecord,
    price_in: Option<f64>,
    price_out: Option<f64>,
    scale: f64,
) {
    if let (Some(amount), Some(price)) = (parse_amount(record.amount_in.as_deref()), price_in) {
        record.amount_in_usd = Some(amount / scale * price);
    }
    if let (Some(amount), Some(price)) = (parse_amount(record.amount_out.as_deref()), price_out) {
        record.amount_out_usd = Some(amount / scale * price);
    }
    if let (Some(usd_in), Some(usd_out)) = (record.amount_in_usd, record.amount_out_usd) {
        record.pnl_usd = Some(usd_out - usd_in);
    }
}

fn parse_amount(s: Option<&str>) -> Option<f64> {
    s.and_then(|v| v.parse::<u128>().ok()).map(|v| v as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_fills_pnl_when_both_priced() {
        let mut rec = ExecutionRecord::new(1);
        rec.amount_in = Some("2000000000000000000".into()); // 2 native units
        rec.amount_out = Some("1000000000000000000".into());
        annotate_usd(&mut rec, Some(100.0), Some(250.0), 1e18);
        assert_eq!(rec.amount_in_usd, Some(200.0));
        assert_eq!(rec.amount_out_usd, Some(250.0));
        assert_eq!(rec.pnl_usd, Some(50.0));
    }

    #[test]
    fn test_annotate_leaves_nulls_on_missing_price() {
        let mut rec = ExecutionRecord::new(1);
        rec.amount_in = Some("1000".into());
        annotate_usd(&mut rec, None, None, 1e18);
        assert!(rec.amount_in_usd.is_none());
        assert!(rec.pnl_usd.is_none());
    }

    #[test]
    fn test_native_scale() {
        assert_eq!(native_scale(Chain::Evm), 1e18);
        assert_eq!(native_scale(Chain::Solana), 1e9);
    }
}
