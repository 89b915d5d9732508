use alloy::primitives::{Address, U256};
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

/// Minimal JSON-RPC client for the EVM endpoints the engine needs. All hex
/// quantities stay as strings at the wire boundary and are parsed by the
/// helpers below.
#[derive(Debug, Clone)]
pub struct EvmRpc {
    http: Client,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: String,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub status: Option<String>,
    pub block_number: Option<String>,
    pub gas_used: Option<String>,
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl EvmRpc {
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

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let hex: String = self.request("eth_blockNumber", json!([])).await?;
        hex_to_u64(&hex).map_err(RpcError::Malformed)
    }

    /// Full block with transaction objects, or None past the chain head.
    pub async fn get_block_with_txs(&self, number: u64) -> Result<Option<RpcBlock>, RpcError> {
        self.request(
            "eth_getBlockByNumber",
            json!([format!("{number:#x}"), true]),
        )
        .await
    }

    pub async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let hex: String = self
            .request(
                "eth_call",
                json!([{"to": format!("{to:#x}"), "data": format!("0x{}", hex_encode(data))}, "latest"]),
            )
            .await?;
        hex_decode(&hex).map_err(RpcError::Malformed)
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
        self.request(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex_encode(raw))]),
        )
        .await
    }

    pub async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<RpcReceipt>, RpcError> {
        self.request("eth_getTransactionReceipt", json!([hash])).await
    }

    /// Poll for a receipt until it lands or `timeout` elapses.
    pub async fn wait_for_receipt(
        &self,
        hash: &str,
        timeout: std::time::Duration,
    ) -> Result<Option<RpcReceipt>, RpcError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(rcpt) = self.get_transaction_receipt(hash).await? {
                return Ok(Some(rcpt));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    }

    /// Account balance at a specific block, or latest when None.
    pub async fn get_balance(&self, addr: &str, block: Option<u64>) -> Result<U256, RpcError> {
        let tag = match block {
            Some(n) => format!("{n:#x}"),
            None => "latest".into(),
        };
        let hex: String = self.request("eth_getBalance", json!([addr, tag])).await?;
        hex_to_u256(&hex).map_err(RpcError::Malformed)
    }

    pub async fn transaction_count(&self, addr: Address) -> Result<u64, RpcError> {
        let hex: String = self
            .request(
                "eth_getTransactionCount",
                json!([format!("{addr:#x}"), "pending"]),
            )
            .await?;
        hex_to_u64(&hex).map_err(RpcError::Malformed)
    }

    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        let hex: String = self.request("eth_gasPrice", json!([])).await?;
        hex_to_u128(&hex).map_err(RpcError::Malformed)
    }

    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        value: U256,
        data: &[u8],
    ) -> Result<u64, RpcError> {
        let hex: String = self
            .request(
                "eth_estimateGas",
                json!([{
                    "from": format!("{from:#x}"),
                    "to": format!("{to:#x}"),
                    "value": format!("{value:#x}"),
                    "data": format!("0x{}", hex_encode(data)),
                }]),
            )
            .await?;
        hex_to_u64(&hex).map_err(RpcError::Malformed)
    }
}

/// Sum internal value transfers to `to_address` using `trace_transaction`.
/// Needs an archive/trace capable endpoint; any failure reads as None.
pub async fn trace_native_received(
    http: &Client,
    trace_url: &str,
    tx_hash: &str,
    to_address: &str,
) -> Option<U256> {
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "trace_transaction",
        "params": [tx_hash],
    });
    let body: Value = http
        .post(trace_url)
        .json(&payload)
        .send()
        .await
        .ok()?
        .error_for_status()
        .ok()?
        .json()
        .await
        .ok()?;

    let traces = body.get("result")?.as_array()?;
    let want = to_address.to_lowercase();
    let mut total = U256::ZERO;
    for tr in traces {
        let action = tr.get("action")?;
        let to = action.get("to").and_then(Value::as_str).unwrap_or("");
        if to.to_lowercase() != want {
            continue;
        }
        if let Some(val) = action.get("value").and_then(Value::as_str) {
            if let Ok(v) = hex_to_u256(val) {
                total += v;
            }
        }
    }
    (total > U256::ZERO).then_some(total)
}

pub fn hex_to_u64(s: &str) -> Result<u64, String> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16).map_err(|e| format!("bad hex quantity {s:?}: {e}"))
}

pub fn hex_to_u128(s: &str) -> Result<u128, String> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(stripped, 16).map_err(|e| format!("bad hex quantity {s:?}: {e}"))
}

pub fn hex_to_u256(s: &str) -> Result<U256, String> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    U256::from_str_radix(stripped, 16).map_err(|e| format!("bad hex quantity {s:?}: {e}"))
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    if stripped.len() % 2 != 0 {
        return Err(format!("odd-length hex string {s:?}"));
    }
    (0..stripped.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&stripped[i..i + 2], 16)
                .map_err(|e| format!("bad hex byte in {s:?}: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_quantity_parsing() {
        assert_eq!(hex_to_u64("0x10").unwrap(), 16);
        assert_eq!(hex_to_u64("ff").unwrap(), 255);
        assert!(hex_to_u64("0xzz").is_err());
        assert_eq!(hex_to_u256("0xde0b6b3a7640000").unwrap(), U256::from(10u64.pow(18)));
    }

    #[test]
    fn test_hex_bytes_round_trip() {
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];
        let enc = hex_encode(&bytes);
        assert_eq!(enc, "deadbeef");
        assert_eq!(hex_decode("0xdeadbeef").unwrap(), bytes);
        assert!(hex_decode("0xabc").is_err());
    }

    #[test]
    fn test_receipt_deserializes_wire_shape() {
        let raw = serde_json::json!({
            "status": "0x1",
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "logs": [{"address": "0xabc", "topics": ["0x1"], "data": "0x0"}]
        });
        let rcpt: RpcReceipt = serde_json::from_value(raw).unwrap();
        assert_eq!(rcpt.status.as_deref(), Some("0x1"));
        assert_eq!(rcpt.logs.len(), 1);
    }
}
