use reqwest::Client;
use serde_json::{json, Value};

use super::AggregatorError;

/// A Jupiter v6 quote. The raw response is kept verbatim because the swap
/// endpoint wants it echoed back unchanged.
#[derive(Debug, Clone)]
pub struct JupiterRoute {
    pub out_amount: u64,
    pub raw: Value,
}

/// Jupiter v6 quote/swap client.
#[derive(Debug, Clone)]
pub struct JupiterClient {
    http: Client,
    quote_url: String,
    swap_url: String,
}

impl JupiterClient {
    pub fn new(http: Client, quote_url: String, swap_url: String) -> Self {
        Self {
            http,
            quote_url,
            swap_url,
        }
    }

    /// Best route for swapping `amount` of `input_mint` into `output_mint`.
    /// Returns `NoRoute` when Jupiter cannot route the pair.
    pub async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<JupiterRoute, AggregatorError> {
        let amount = amount.to_string();
        let slippage = slippage_bps.to_string();

        let resp = self
            .http
            .get(&self.quote_url)
            .query(&[
                ("inputMint", input_mint),
                ("outputMint", output_mint),
                ("amount", amount.as_str()),
                ("slippageBps", slippage.as_str()),
                ("onlyDirectRoutes", "false"),
            ])
            .send()
            .await?;

        if resp.status().as_u16() == 400 {
            return Err(AggregatorError::NoRoute);
        }
        let raw: Value = resp.error_for_status()?.json().await?;

        let out_amount = raw
            .get("outAmount")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or(AggregatorError::NoRoute)?;

        Ok(JupiterRoute { out_amount, raw })
    }

    /// Build the signed-transaction payload for a previously fetched route.
    /// Returns the unsigned transaction as base64.
    pub async fn swap_transaction(
        &self,
        route: &JupiterRoute,
        user_public_key: &str,
    ) -> Result<String, AggregatorError> {
        let payload = json!({
            "quoteResponse": route.raw,
            "userPublicKey": user_public_key,
            "wrapAndUnwrapSol": true,
            "useSharedAccounts": true,
            "asLegacyTransaction": false,
        });

        let body: Value = self
            .http
            .post(&self.swap_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.get("swapTransaction")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AggregatorError::BadResponse("missing swapTransaction".into()))
    }
}
