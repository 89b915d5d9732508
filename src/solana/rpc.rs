use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("rpc response malformed: {0}")]
    Malformed(String),
}

/// Minimal Solana JSON-RPC client. Transactions are fetched jsonParsed so
/// token balances and account keys come back structured.
#[derive(Debug, Clone)]
pub struct SolanaRpc {
    http: Client,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub slot: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResult {
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub meta: Option<TxMeta>,
    #[serde(default)]
    pub transaction: Option<TxPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxPayload {
    #[serde(default)]
    pub message: Option<TxMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMessage {
    #[serde(default)]
    pub account_keys: Vec<AccountKey>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    pub pubkey: String,
    #[serde(default)]
    pub signer: bool,
}

impl SolanaRpc {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let body: Value = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = body.get("error") {
            return Err(RpcError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        serde_json::from_value(body.get("result").cloned().unwrap_or(Value::Null))
            .map_err(|e| RpcError::Malformed(format!("{method}: {e}")))
    }

    /// Recent signatures touching an address, newest first. `before` pages
    /// further into history.
    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let mut opts = json!({"limit": limit});
        if let Some(cursor) = before {
            opts["before"] = json!(cursor);
        }
        self.request("getSignaturesForAddress", json!([address, opts]))
            .await
    }

    pub async fn get_transaction(&self, signature: &str) -> Result<Option<TxResult>, RpcError> {
        self.request(
            "getTransaction",
            json!([signature, {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}]),
        )
        .await
    }

    /// Submit a signed transaction, base64-encoded. Returns the signature.
    pub async fn send_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        self.request(
            "sendTransaction",
            json!([encoded, {"encoding": "base64", "skipPreflight": false, "maxRetries": 0}]),
        )
        .await
    }

    /// Poll signature status until confirmed or `timeout` elapses. Returns
    /// false on timeout or on-chain error.
    pub async fn wait_for_confirmation(
        &self,
        signature: &str,
        timeout: std::time::Duration,
    ) -> Result<bool, RpcError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let result: Value = self
                .request(
                    "getSignatureStatuses",
                    json!([[signature], {"searchTransactionHistory": true}]),
                )
                .await?;
            if let Some(status) = result.get("value").and_then(|v| v.get(0)).filter(|s| !s.is_null())
            {
                if status.get("err").is_some_and(|e| !e.is_null()) {
                    return Ok(false);
                }
                let confirmation = status
                    .get("confirmationStatus")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if confirmation == "confirmed" || confirmation == "finalized" {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    }
}
