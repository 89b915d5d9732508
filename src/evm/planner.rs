use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use tracing::warn;

use super::abi::{
    exactInputSingleCall, getAmountsOutCall, quoteExactInputSingleCall, swapExactETHForTokensCall,
    swapExactTokensForETHCall, swapExactTokensForTokensCall, ExactInputSingleParams, V2Method,
};
use super::rpc::EvmRpc;

/// Scale factor used to carry the copy ratio into integer math.
const RATIO_SCALE: u64 = 1_000_000;

/// A fully resolved V2 router swap ready to encode. `value` is the native
/// amount to attach, zero for token-in methods.
#[derive(Debug, Clone)]
pub struct V2SwapPlan {
    pub method: V2Method,
    pub router: Address,
    pub path: Vec<Address>,
    pub amount_in: U256,
    pub min_out: U256,
    pub recipient: Address,
    pub deadline: u64,
    pub value: U256,
}

impl V2SwapPlan {
    pub fn calldata(&self) -> Bytes {
        let deadline = U256::from(self.deadline);
        let encoded = match self.method {
            V2Method::EthForTokens => swapExactETHForTokensCall {
                amountOutMin: self.min_out,
                path: self.path.clone(),
                to: self.recipient,
                deadline,
            }
            .abi_encode(),
            V2Method::TokensForEth => swapExactTokensForETHCall {
                amountIn: self.amount_in,
                amountOutMin: self.min_out,
                path: self.path.clone(),
                to: self.recipient,
                deadline,
            }
            .abi_encode(),
            V2Method::TokensForTokens => swapExactTokensForTokensCall {
                amountIn: self.amount_in,
                amountOutMin: self.min_out,
                path: self.path.clone(),
                to: self.recipient,
                deadline,
            }
            .abi_encode(),
        };
        encoded.into()
    }
}

/// A fully resolved V3 single-hop swap ready to encode.
#[derive(Debug, Clone)]
pub struct V3SinglePlan {
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub amount_in: U256,
    pub min_out: U256,
    pub recipient: Address,
    pub deadline: u64,
    pub value: U256,
}

impl V3SinglePlan {
    pub fn calldata(&self) -> Bytes {
        exactInputSingleCall {
            params: ExactInputSingleParams {
                tokenIn: self.token_in,
                tokenOut: self.token_out,
                fee: U24::from(self.fee),
                recipient: self.recipient,
                deadline: U256::from(self.deadline),
                amountIn: self.amount_in,
                amountOutMinimum: self.min_out,
                sqrtPriceLimitX96: U160::ZERO,
            },
        }
        .abi_encode()
        .into()
    }
}

/// floor(amount * ratio). Negative ratios read as zero.
pub fn scale_amount(amount: U256, ratio: f64) -> U256 {
    let ratio = ratio.max(0.0);
    let scaled = (ratio * RATIO_SCALE as f64) as u128;
    amount * U256::from(scaled) / U256::from(RATIO_SCALE)
}

/// Cap a native input amount when a cap is configured.
pub fn clamp_native(amount: U256, cap: Option<u128>) -> U256 {
    match cap {
        Some(cap) => amount.min(U256::from(cap)),
        None => amount,
    }
}

/// quoted minus the slippage haircut, floored at zero.
pub fn apply_slippage(quoted: U256, slippage_bps: u32) -> U256 {
    let slip = quoted * U256::from(slippage_bps) / U256::from(10_000u64);
    quoted.saturating_sub(slip)
}

/// Quote a V2 path via getAmountsOut and apply slippage. Any failure
/// degrades to a zero minimum rather than blocking execution.
pub async fn quote_v2_min_out(
    rpc: &EvmRpc,
    router: Address,
    amount_in: U256,
    path: &[Address],
    slippage_bps: u32,
) -> U256 {
    let call = getAmountsOutCall {
        amountIn: amount_in,
        path: path.to_vec(),
    };
    let quoted = match rpc.call(router, &call.abi_encode()).await {
        Ok(ret) => getAmountsOutCall::abi_decode_returns(&ret)
            .ok()
            .and_then(|amounts| amounts.last().copied()),
        Err(e) => {
            warn!(error = %e, "getAmountsOut failed, falling back to zero min_out");
            None
        }
    };
    quoted
        .map(|q| apply_slippage(q, slippage_bps))
        .unwrap_or(U256::ZERO)
}

/// Quote a V3 single hop via the quoter contract and apply slippage.
pub async fn quote_v3_min_out(
    rpc: &EvmRpc,
    quoter: Address,
    token_in: Address,
    token_out: Address,
    fee: u32,
    amount_in: U256,
    slippage_bps: u32,
) -> U256 {
    let call = quoteExactInputSingleCall {
        tokenIn: token_in,
        tokenOut: token_out,
        fee: U24::from(fee),
        amountIn: amount_in,
        sqrtPriceLimitX96: U160::ZERO,
    };
    let quoted = match rpc.call(quoter, &call.abi_encode()).await {
        Ok(ret) => quoteExactInputSingleCall::abi_decode_returns(&ret).ok(),
        Err(e) => {
            warn!(error = %e, "quoteExactInputSingle failed, falling back to zero min_out");
            None
        }
    };
    quoted
        .map(|q| apply_slippage(q, slippage_bps))
        .unwrap_or(U256::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_scale_amount_floors() {
        assert_eq!(scale_amount(U256::from(10_000u64), 0.25), U256::from(2_500u64));
        assert_eq!(scale_amount(U256::from(10_000u64), 1.0), U256::from(10_000u64));
        assert_eq!(scale_amount(U256::from(3u64), 0.5), U256::from(1u64));
        assert_eq!(scale_amount(U256::from(10_000u64), 0.0), U256::ZERO);
        assert_eq!(scale_amount(U256::from(10_000u64), -1.0), U256::ZERO);
    }

    #[test]
    fn test_clamp_native() {
        assert_eq!(
            clamp_native(U256::from(2_500u64), Some(2_000)),
            U256::from(2_000u64)
        );
        assert_eq!(
            clamp_native(U256::from(2_500u64), Some(5_000)),
            U256::from(2_500u64)
        );
        assert_eq!(clamp_native(U256::from(2_500u64), None), U256::from(2_500u64));
    }

    #[test]
    fn test_apply_slippage() {
        assert_eq!(apply_slippage(U256::from(1_000u64), 300), U256::from(970u64));
        assert_eq!(apply_slippage(U256::from(1_000u64), 0), U256::from(1_000u64));
        assert_eq!(apply_slippage(U256::from(1_000u64), 10_000), U256::ZERO);
        assert_eq!(apply_slippage(U256::ZERO, 300), U256::ZERO);
    }

    #[test]
    fn test_v2_calldata_round_trips() {
        let plan = V2SwapPlan {
            method: V2Method::TokensForTokens,
            router: address!("7a250d5630b4cf539739df2c5dacb4c659f2488d"),
            path: vec![
                address!("6b175474e89094c44da98b954eedeac495271d0f"),
                address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            ],
            amount_in: U256::from(2_500u64),
            min_out: U256::from(970u64),
            recipient: address!("1111111111111111111111111111111111111111"),
            deadline: 1_700_000_600,
            value: U256::ZERO,
        };
        let decoded = super::super::abi::decode_swap_input(&plan.calldata()).expect("decodes");
        assert_eq!(decoded.method(), "swapExactTokensForTokens");
        assert_eq!(decoded.amount_in(), Some(U256::from(2_500u64)));
        assert_eq!(decoded.min_out(), U256::from(970u64));
    }

    #[test]
    fn test_v3_calldata_round_trips() {
        let plan = V3SinglePlan {
            router: address!("e592427a0aece92de3edee1f18e0157c05861564"),
            token_in: address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            token_out: address!("6b175474e89094c44da98b954eedeac495271d0f"),
            fee: 3000,
            amount_in: U256::from(5_000u64),
            min_out: U256::from(4_850u64),
            recipient: address!("1111111111111111111111111111111111111111"),
            deadline: 1_700_000_600,
            value: U256::ZERO,
        };
        let decoded = super::super::abi::decode_swap_input(&plan.calldata()).expect("decodes");
        assert_eq!(decoded.method(), "exactInputSingle");
        assert_eq!(decoded.min_out(), U256::from(4_850u64));
    }
}
