use alloy::primitives::U256;
use reqwest::Client;
use serde_json::Value;

use super::{json_str, json_u256, AggregatorError, AggregatorQuote};

/// 1inch swap API client. One instance per process, cheap to clone.
#[derive(Debug, Clone)]
pub struct OneInchClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OneInchClient {
    pub fn new(http: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    /// Fetch a ready-to-send swap transaction. Use [`super::NATIVE_SENTINEL`]
    /// as `src_token` when selling native.
    pub async fn swap_quote(
        &self,
        chain_id: u64,
        src_token: &str,
        dst_token: &str,
        amount_in: U256,
        from_address: &str,
        slippage_bps: u32,
    ) -> Result<AggregatorQuote, AggregatorError> {
        // The API takes slippage in percent.
        let slippage = (slippage_bps as f64 / 100.0).to_string();
        let amount = amount_in.to_string();
        let url = format!("{}/{}/swap", self.base_url, chain_id);

        let mut req = self.http.get(&url).query(&[
            ("fromTokenAddress", src_token),
            ("toTokenAddress", dst_token),
            ("amount", amount.as_str()),
            ("fromAddress", from_address),
            ("slippage", slippage.as_str()),
            ("disableEstimate", "false"),
        ]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let body: Value = req.send().await?.error_for_status()?.json().await?;
        let tx = body
            .get("tx")
            .ok_or_else(|| AggregatorError::BadResponse("missing tx".into()))?;

        let call_data = json_str(tx, "data")?
            .parse()
            .map_err(|e| AggregatorError::BadResponse(format!("bad calldata: {e}")))?;

        // Spender field name varies by API version.
        let allowance_target = body
            .get("router")
            .or_else(|| body.get("spender"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(AggregatorQuote {
            to: json_str(tx, "to")?.to_string(),
            call_data,
            value: json_u256(tx.get("value")),
            allowance_target,
            buy_amount: json_u256(body.get("toTokenAmount")),
        })
    }
}
