use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Uniswap V2 router surface the engine follows.
    function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) returns (uint256[] amounts);
    function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) returns (uint256[] amounts);
    function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) returns (uint256[] amounts);
    function getAmountsOut(uint256 amountIn, address[] path) returns (uint256[] amounts);

    /// Uniswap V3 single-hop surface.
    #[derive(Debug)]
    struct ExactInputSingleParams {
        address tokenIn;
        address tokenOut;
        uint24 fee;
        address recipient;
        uint256 deadline;
        uint256 amountIn;
        uint256 amountOutMinimum;
        uint160 sqrtPriceLimitX96;
    }
    function exactInputSingle(ExactInputSingleParams params) returns (uint256 amountOut);
    function quoteExactInputSingle(address tokenIn, address tokenOut, uint24 fee, uint256 amountIn, uint160 sqrtPriceLimitX96) returns (uint256 amountOut);

    /// ERC-20 surface for the allowance precondition.
    function approve(address spender, uint256 amount) returns (bool);
    function allowance(address owner, address spender) returns (uint256);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V2Method {
    EthForTokens,
    TokensForEth,
    TokensForTokens,
}

impl V2Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            V2Method::EthForTokens => "swapExactETHForTokens",
            V2Method::TokensForEth => "swapExactTokensForETH",
            V2Method::TokensForTokens => "swapExactTokensForTokens",
        }
    }
}

/// A recognized swap call decoded from raw transaction input. `amount_in`
/// is None for native-in V2 swaps, where the amount rides in tx value.
#[derive(Debug, Clone)]
pub enum DecodedSwap {
    V2 {
        method: V2Method,
        amount_in: Option<U256>,
        min_out: U256,
        path: Vec<Address>,
    },
    V3Single(ExactInputSingleParams),
}

impl DecodedSwap {
    pub fn method(&self) -> &'static str {
        match self {
            DecodedSwap::V2 { method, .. } => method.as_str(),
            DecodedSwap::V3Single(_) => "exactInputSingle",
        }
    }

    pub fn token_in(&self) -> Option<Address> {
        match self {
            DecodedSwap::V2 { path, .. } => path.first().copied(),
            DecodedSwap::V3Single(p) => Some(p.tokenIn),
        }
    }

    pub fn token_out(&self) -> Option<Address> {
        match self {
            DecodedSwap::V2 { path, .. } => path.last().copied(),
            DecodedSwap::V3Single(p) => Some(p.tokenOut),
        }
    }

    pub fn amount_in(&self) -> Option<U256> {
        match self {
            DecodedSwap::V2 { amount_in, .. } => *amount_in,
            DecodedSwap::V3Single(p) => Some(p.amountIn),
        }
    }

    pub fn min_out(&self) -> U256 {
        match self {
            DecodedSwap::V2 { min_out, .. } => *min_out,
            DecodedSwap::V3Single(p) => p.amountOutMinimum,
        }
    }
}

/// Try each known swap shape in turn. Unknown selectors and malformed
/// argument data both read as None; the caller records a degraded
/// observation instead of dropping the transaction.
pub fn decode_swap_input(input: &[u8]) -> Option<DecodedSwap> {
    if input.len() < 4 {
        return None;
    }

    if let Ok(c) = swapExactETHForTokensCall::abi_decode(input) {
        return Some(DecodedSwap::V2 {
            method: V2Method::EthForTokens,
            amount_in: None,
            min_out: c.amountOutMin,
            path: c.path,
        });
    }
    if let Ok(c) = swapExactTokensForETHCall::abi_decode(input) {
        return Some(DecodedSwap::V2 {
            method: V2Method::TokensForEth,
            amount_in: Some(c.amountIn),
            min_out: c.amountOutMin,
            path: c.path,
        });
    }
    if let Ok(c) = swapExactTokensForTokensCall::abi_decode(input) {
        return Some(DecodedSwap::V2 {
            method: V2Method::TokensForTokens,
            amount_in: Some(c.amountIn),
            min_out: c.amountOutMin,
            path: c.path,
        });
    }
    if let Ok(c) = exactInputSingleCall::abi_decode(input) {
        return Some(DecodedSwap::V3Single(c.params));
    }

    None
}

/// Lowercase 0x-prefixed rendering used for storage and comparisons.
pub fn addr_hex(addr: Address) -> String {
    format!("{addr:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::aliases::{U160, U24};
    use alloy::primitives::address;

    #[test]
    fn test_decode_v2_path_swap() {
        let path = vec![
            address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            address!("6b175474e89094c44da98b954eedeac495271d0f"),
        ];
        let call = swapExactETHForTokensCall {
            amountOutMin: U256::from(970u64),
            path: path.clone(),
            to: address!("1111111111111111111111111111111111111111"),
            deadline: U256::from(1_700_000_000u64),
        };
        let input = call.abi_encode();

        let decoded = decode_swap_input(&input).expect("should decode");
        match decoded {
            DecodedSwap::V2 {
                method,
                amount_in,
                min_out,
                path: p,
            } => {
                assert_eq!(method, V2Method::EthForTokens);
                assert!(amount_in.is_none());
                assert_eq!(min_out, U256::from(970u64));
                assert_eq!(p, path);
            }
            other => panic!("wrong shape: {other:?}"),
        }
    }

    #[test]
    fn test_decode_v2_token_swap_has_amount_in() {
        let call = swapExactTokensForTokensCall {
            amountIn: U256::from(10_000u64),
            amountOutMin: U256::from(1u64),
            path: vec![
                address!("6b175474e89094c44da98b954eedeac495271d0f"),
                address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            ],
            to: address!("1111111111111111111111111111111111111111"),
            deadline: U256::from(1_700_000_000u64),
        };
        let decoded = decode_swap_input(&call.abi_encode()).expect("should decode");
        assert_eq!(decoded.method(), "swapExactTokensForTokens");
        assert_eq!(decoded.amount_in(), Some(U256::from(10_000u64)));
    }

    #[test]
    fn test_decode_v3_exact_input_single() {
        let params = ExactInputSingleParams {
            tokenIn: address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            tokenOut: address!("6b175474e89094c44da98b954eedeac495271d0f"),
            fee: U24::from(3000u32),
            recipient: address!("1111111111111111111111111111111111111111"),
            deadline: U256::from(1_700_000_000u64),
            amountIn: U256::from(5_000u64),
            amountOutMinimum: U256::from(4_500u64),
            sqrtPriceLimitX96: U160::ZERO,
        };
        let input = exactInputSingleCall { params }.abi_encode();

        let decoded = decode_swap_input(&input).expect("should decode");
        assert_eq!(decoded.method(), "exactInputSingle");
        assert_eq!(decoded.amount_in(), Some(U256::from(5_000u64)));
        assert_eq!(decoded.min_out(), U256::from(4_500u64));
    }

    #[test]
    fn test_unknown_selector_is_none() {
        assert!(decode_swap_input(&[0xde, 0xad, 0xbe, 0xef, 0x00]).is_none());
        assert!(decode_swap_input(&[]).is_none());
    }

    #[test]
    fn test_addr_hex_is_lowercase() {
        let a = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
        assert_eq!(addr_hex(a), "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    }
}
