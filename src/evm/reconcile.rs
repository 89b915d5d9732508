use alloy::primitives::U256;
use reqwest::Client;
use tracing::debug;

use super::rpc::{self, hex_to_u256, EvmRpc, RpcReceipt};

/// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
/// keccak256("Withdrawal(address,uint256)"), emitted by wrapped-native tokens.
const WITHDRAWAL_TOPIC: &str = "0x7fcf532c15f0a6db0bd6d0e038bea71d30d808c7d98cb3bf7268a95bf5081b65";

/// ERC-20 amount transferred to `recipient` by `token` within the receipt.
pub fn erc20_received(receipt: &RpcReceipt, token: &str, recipient: &str) -> Option<U256> {
    let token = token.to_lowercase();
    let recipient = recipient.to_lowercase();
    for log in &receipt.logs {
        if log.address.to_lowercase() != token || log.topics.len() < 3 {
            continue;
        }
        if !log.topics[0].eq_ignore_ascii_case(TRANSFER_TOPIC) {
            continue;
        }
        if topic_address(&log.topics[2]) != recipient {
            continue;
        }
        if let Some(data) = &log.data {
            if let Ok(v) = hex_to_u256(data) {
                return Some(v);
            }
        }
    }
    None
}

/// Native output unwrapped via the wrapped-native token's Withdrawal event
/// attributed to `recipient`.
pub fn wrapped_withdrawal(receipt: &RpcReceipt, wrapped: &str, recipient: &str) -> Option<U256> {
    let wrapped = wrapped.to_lowercase();
    let recipient = recipient.to_lowercase();
    for log in &receipt.logs {
        if log.address.to_lowercase() != wrapped || log.topics.len() < 2 {
            continue;
        }
        if !log.topics[0].eq_ignore_ascii_case(WITHDRAWAL_TOPIC) {
            continue;
        }
        if topic_address(&log.topics[1]) != recipient {
            continue;
        }
        if let Some(data) = &log.data {
            if let Ok(v) = hex_to_u256(data) {
                return Some(v);
            }
        }
    }
    None
}

/// Fee paid for the transaction, from gasUsed * effectiveGasPrice.
pub fn fee_spent(receipt: &RpcReceipt) -> Option<U256> {
    let gas_used = hex_to_u256(receipt.gas_used.as_deref()?).ok()?;
    let price = hex_to_u256(receipt.effective_gas_price.as_deref()?).ok()?;
    Some(gas_used * price)
}

/// Native received across the receipt's block inferred from the executor's
/// balance delta with the fee added back.
pub async fn native_balance_delta(
    rpc: &EvmRpc,
    address: &str,
    receipt: &RpcReceipt,
) -> Option<U256> {
    let block = hex_to_u256(receipt.block_number.as_deref()?).ok()?.to::<u64>();
    if block == 0 {
        return None;
    }
    let before = rpc.get_balance(address, Some(block - 1)).await.ok()?;
    let after = rpc.get_balance(address, Some(block)).await.ok()?;
    let fee = fee_spent(receipt).unwrap_or(U256::ZERO);
    let received = (after + fee).checked_sub(before)?;
    (received > U256::ZERO).then_some(received)
}

/// Resolve the realized output amount of a confirmed swap. Strategies are
/// ordered from cheapest to most expensive; `min_out` is the last resort so
/// the stored amount is always populated.
#[allow(clippy::too_many_arguments)]
pub async fn realized_output(
    rpc: &EvmRpc,
    http: &Client,
    receipt: &RpcReceipt,
    tx_hash: &str,
    executor: &str,
    token_out: Option<&str>,
    wrapped_native: Option<&str>,
    trace_rpc_url: Option<&str>,
    min_out: U256,
) -> U256 {
    if let Some(token) = token_out {
        if let Some(v) = erc20_received(receipt, token, executor) {
            return v;
        }
    }
    if let Some(wrapped) = wrapped_native {
        if let Some(v) = wrapped_withdrawal(receipt, wrapped, executor) {
            return v;
        }
    }
    if let Some(v) = native_balance_delta(rpc, executor, receipt).await {
        return v;
    }
    if let Some(url) = trace_rpc_url {
        if let Some(v) = rpc::trace_native_received(http, url, tx_hash, executor).await {
            return v;
        }
    }
    debug!(tx_hash, "realized output not observable, falling back to min_out");
    min_out
}

fn topic_address(topic: &str) -> String {
    let stripped = topic.strip_prefix("0x").unwrap_or(topic);
    if stripped.len() < 40 {
        return String::new();
    }
    format!("0x{}", &stripped[stripped.len() - 40..].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::rpc::RpcLog;

    const EXECUTOR: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn receipt_with(logs: Vec<RpcLog>) -> RpcReceipt {
        RpcReceipt {
            status: Some("0x1".into()),
            block_number: Some("0x10".into()),
            gas_used: Some("0x5208".into()),
            effective_gas_price: Some("0x3b9aca00".into()),
            logs,
        }
    }

    fn padded(addr: &str) -> String {
        format!("0x{:0>64}", addr.trim_start_matches("0x"))
    }

    #[test]
    fn test_erc20_received_matches_token_and_recipient() {
        let rcpt = receipt_with(vec![RpcLog {
            address: TOKEN.into(),
            topics: vec![
                TRANSFER_TOPIC.into(),
                padded("0x2222222222222222222222222222222222222222"),
                padded(EXECUTOR),
            ],
            data: Some("0x3e8".into()),
        }]);
        assert_eq!(
            erc20_received(&rcpt, TOKEN, EXECUTOR),
            Some(U256::from(1000u64))
        );
    }

    #[test]
    fn test_erc20_received_ignores_other_recipient() {
        let rcpt = receipt_with(vec![RpcLog {
            address: TOKEN.into(),
            topics: vec![
                TRANSFER_TOPIC.into(),
                padded(EXECUTOR),
                padded("0x3333333333333333333333333333333333333333"),
            ],
            data: Some("0x3e8".into()),
        }]);
        assert!(erc20_received(&rcpt, TOKEN, EXECUTOR).is_none());
    }

    #[test]
    fn test_wrapped_withdrawal() {
        let rcpt = receipt_with(vec![RpcLog {
            address: WETH.into(),
            topics: vec![WITHDRAWAL_TOPIC.into(), padded(EXECUTOR)],
            data: Some("0xde0b6b3a7640000".into()),
        }]);
        assert_eq!(
            wrapped_withdrawal(&rcpt, WETH, EXECUTOR),
            Some(U256::from(10u64.pow(18)))
        );
    }

    #[test]
    fn test_fee_spent() {
        let rcpt = receipt_with(vec![]);
        // 21000 gas at 1 gwei
        assert_eq!(fee_spent(&rcpt), Some(U256::from(21_000_000_000_000u64)));
    }

    #[tokio::test]
    async fn test_realized_output_tries_strategies_in_order() {
        // Balance delta and trace cannot answer against a closed port, so
        // only the receipt-based strategies and the fallback remain.
        let rpc = EvmRpc::new(Client::new(), "http://127.0.0.1:1".into());
        let http = Client::new();
        let min_out = U256::from(7u64);

        // Both a Transfer and a Withdrawal present: the Transfer wins.
        let rcpt = receipt_with(vec![
            RpcLog {
                address: TOKEN.into(),
                topics: vec![
                    TRANSFER_TOPIC.into(),
                    padded("0x2222222222222222222222222222222222222222"),
                    padded(EXECUTOR),
                ],
                data: Some("0x3e8".into()),
            },
            RpcLog {
                address: WETH.into(),
                topics: vec![WITHDRAWAL_TOPIC.into(), padded(EXECUTOR)],
                data: Some("0x5".into()),
            },
        ]);
        let got = realized_output(
            &rpc,
            &http,
            &rcpt,
            "0xaaaa",
            EXECUTOR,
            Some(TOKEN),
            Some(WETH),
            Some("http://127.0.0.1:1"),
            min_out,
        )
        .await;
        assert_eq!(got, U256::from(1000u64));

        // No matching Transfer: the Withdrawal is next in line.
        let rcpt = receipt_with(vec![RpcLog {
            address: WETH.into(),
            topics: vec![WITHDRAWAL_TOPIC.into(), padded(EXECUTOR)],
            data: Some("0x5".into()),
        }]);
        let got = realized_output(
            &rpc,
            &http,
            &rcpt,
            "0xaaaa",
            EXECUTOR,
            Some(TOKEN),
            Some(WETH),
            Some("http://127.0.0.1:1"),
            min_out,
        )
        .await;
        assert_eq!(got, U256::from(5u64));

        // Nothing observable at all: min_out is the last resort.
        let rcpt = receipt_with(vec![]);
        let got = realized_output(
            &rpc,
            &http,
            &rcpt,
            "0xaaaa",
            EXECUTOR,
            Some(TOKEN),
            Some(WETH),
            Some("http://127.0.0.1:1"),
            min_out,
        )
        .await;
        assert_eq!(got, min_out);
    }
}
