pub mod jupiter;
pub mod oneinch;
pub mod zeroex;

use alloy::primitives::{Bytes, U256};
use serde_json::Value;
use thiserror::Error;

/// Sentinel address aggregator APIs use for native input on EVM chains.
pub const NATIVE_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("aggregator http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("aggregator response malformed: {0}")]
    BadResponse(String),
    #[error("no route for requested pair")]
    NoRoute,
}

/// A ready-to-send swap transaction returned by an EVM aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorQuote {
    pub to: String,
    pub call_data: Bytes,
    pub value: U256,
    /// Spender that must hold an ERC-20 allowance before submission.
    /// None when selling native.
    pub allowance_target: Option<String>,
    pub buy_amount: U256,
}

/// Supported EVM aggregators, tried in configured priority order before
/// falling back to direct router execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorKind {
    OneInch,
    ZeroEx,
}

impl AggregatorKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "1inch" | "oneinch" => Some(Self::OneInch),
            "0x" | "zeroex" => Some(Self::ZeroEx),
            _ => None,
        }
    }
}

/// Amount fields come back as decimal strings, hex strings or plain numbers
/// depending on the API version. Anything unparseable reads as zero.
pub(crate) fn json_u256(v: Option<&Value>) -> U256 {
    match v {
        Some(Value::String(s)) => match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).unwrap_or(U256::ZERO),
            None => U256::from_str_radix(s, 10).unwrap_or(U256::ZERO),
        },
        Some(Value::Number(n)) => n.as_u64().map(U256::from).unwrap_or(U256::ZERO),
        _ => U256::ZERO,
    }
}

pub(crate) fn json_str<'a>(v: &'a Value, key: &str) -> Result<&'a str, AggregatorError> {
    v.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AggregatorError::BadResponse(format!("missing field {key}")))
}
