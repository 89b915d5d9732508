use alloy::primitives::U256;
use reqwest::Client;
use serde_json::Value;

use super::{json_str, json_u256, AggregatorError, AggregatorQuote};

/// 0x swap API client. The base URL is chain-specific
/// (api.0x.org, polygon.api.0x.org, base.api.0x.org).
#[derive(Debug, Clone)]
pub struct ZeroExClient {
    http: Client,
    base_url: String,
}

impl ZeroExClient {
    pub fn new(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Fetch a ready-to-send swap transaction. Pass `"ETH"` as `sell_token`
    /// when selling native.
    pub async fn swap_quote(
        &self,
        sell_token: &str,
        buy_token: &str,
        sell_amount: U256,
        taker_address: &str,
        slippage_bps: u32,
    ) -> Result<AggregatorQuote, AggregatorError> {
        // The API takes slippage as a fraction.
        let slippage = (slippage_bps as f64 / 10_000.0).to_string();
        let amount = sell_amount.to_string();
        let url = format!("{}/swap/v1/quote", self.base_url);

        let body: Value = self
            .http
            .get(&url)
            .query(&[
                ("sellToken", sell_token),
                ("buyToken", buy_token),
                ("sellAmount", amount.as_str()),
                ("takerAddress", taker_address),
                ("slippagePercentage", slippage.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let call_data = json_str(&body, "data")?
            .parse()
            .map_err(|e| AggregatorError::BadResponse(format!("bad calldata: {e}")))?;

        Ok(AggregatorQuote {
            to: json_str(&body, "to")?.to_string(),
            call_data,
            value: json_u256(body.get("value")),
            allowance_target: body
                .get("allowanceTarget")
                .and_then(Value::as_str)
                .map(str::to_string),
            buy_amount: json_u256(body.get("buyAmount")),
        })
    }
}
