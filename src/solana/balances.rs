use std::collections::HashMap;

use super::rpc::{AccountKey, TxMeta};

/// Wrapped-SOL mint, used as a synthetic pseudo-token for native lamport
/// deltas so the store has one vocabulary for token and native legs.
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Net effect of a transaction on one wallet: which mint it spent and which
/// it received, in smallest units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapDelta {
    pub mint_in: Option<String>,
    pub amount_in: Option<u64>,
    pub mint_out: Option<String>,
    pub amount_out: Option<u64>,
}

impl SwapDelta {
    pub fn is_empty(&self) -> bool {
        self.amount_in.is_none() && self.amount_out.is_none()
    }
}

/// Infer a wallet's swap legs from pre/post balances. Token entries are
/// matched by account index, never by list position, since the RPC does not
/// guarantee the two lists line up. When several mints move in the same
/// direction the largest magnitude wins. Native lamport movement (with the
/// fee added back for the payer) fills whichever leg tokens left empty,
/// attributed to the wrapped-SOL mint.
pub fn infer_swap_delta(meta: &TxMeta, account_keys: &[AccountKey], wallet: &str) -> SwapDelta {
    let mut delta = SwapDelta::default();

    // account_index -> (mint, amount) for entries owned by the wallet.
    let collect = |balances: &[super::rpc::TokenBalance]| -> HashMap<usize, (String, u64)> {
        balances
            .iter()
            .filter(|b| b.owner.as_deref() == Some(wallet))
            .map(|b| {
                let amount = b.ui_token_amount.amount.parse().unwrap_or(0u64);
                (b.account_index, (b.mint.clone(), amount))
            })
            .collect()
    };
    let pre = collect(&meta.pre_token_balances);
    let post = collect(&meta.post_token_balances);

    let mut best_in: Option<(String, u64)> = None;
    let mut best_out: Option<(String, u64)> = None;
    let indices: std::collections::HashSet<usize> = pre.keys().chain(post.keys()).copied().collect();
    for idx in indices {
        let (mint, pre_amount) = match (pre.get(&idx), post.get(&idx)) {
            (Some((m, a)), _) => (m.clone(), *a),
            (None, Some((m, _))) => (m.clone(), 0),
            (None, None) => continue,
        };
        let post_amount = post.get(&idx).map(|(_, a)| *a).unwrap_or(0);

        if pre_amount > post_amount {
            let spent = pre_amount - post_amount;
            if best_in.as_ref().is_none_or(|(_, a)| spent > *a) {
                best_in = Some((mint, spent));
            }
        } else if post_amount > pre_amount {
            let received = post_amount - pre_amount;
            if best_out.as_ref().is_none_or(|(_, a)| received > *a) {
                best_out = Some((mint, received));
            }
        }
    }

    if let Some((mint, amount)) = best_in {
        delta.mint_in = Some(mint);
        delta.amount_in = Some(amount);
    }
    if let Some((mint, amount)) = best_out {
        delta.mint_out = Some(mint);
        delta.amount_out = Some(amount);
    }

    // Native leg: lamport delta at the wallet's account slot. The fee payer
    // is the first signer; its delta gets the fee added back so a pure fee
    // payment does not read as a swap input.
    if let Some(idx) = account_keys.iter().position(|k| k.pubkey == wallet) {
        if let (Some(&pre_lamports), Some(&post_lamports)) =
            (meta.pre_balances.get(idx), meta.post_balances.get(idx))
        {
            let is_payer = account_keys.first().is_some_and(|k| k.pubkey == wallet);
            let fee = if is_payer { meta.fee.unwrap_or(0) } else { 0 };
            let adjusted_post = post_lamports.saturating_add(fee);
            if adjusted_post < pre_lamports && delta.amount_in.is_none() {
                delta.mint_in = Some(WRAPPED_SOL_MINT.to_string());
                delta.amount_in = Some(pre_lamports - adjusted_post);
            } else if adjusted_post > pre_lamports && delta.amount_out.is_none() {
                delta.mint_out = Some(WRAPPED_SOL_MINT.to_string());
                delta.amount_out = Some(adjusted_post - pre_lamports);
            }
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solana::rpc::{TokenBalance, UiTokenAmount};

    const WALLET: &str = "WalletX11111111111111111111111111111111111111";

    fn balance(account_index: usize, mint: &str, owner: &str, amount: &str) -> TokenBalance {
        TokenBalance {
            account_index,
            mint: mint.into(),
            owner: Some(owner.into()),
            ui_token_amount: UiTokenAmount {
                amount: amount.into(),
            },
        }
    }

    fn keys(wallet_first: bool) -> Vec<AccountKey> {
        let mut keys = vec![
            AccountKey {
                pubkey: WALLET.into(),
                signer: true,
            },
            AccountKey {
                pubkey: "Other1111111111111111111111111111111111111111".into(),
                signer: false,
            },
        ];
        if !wallet_first {
            keys.reverse();
        }
        keys
    }

    #[test]
    fn test_decrease_is_input_increase_is_output() {
        let meta = TxMeta {
            pre_token_balances: vec![
                balance(1, "MintX", WALLET, "200"),
                balance(2, "MintY", WALLET, "100"),
            ],
            post_token_balances: vec![
                balance(1, "MintX", WALLET, "100"),
                balance(2, "MintY", WALLET, "220"),
            ],
            ..TxMeta::default()
        };
        let delta = infer_swap_delta(&meta, &[], WALLET);
        assert_eq!(delta.mint_in.as_deref(), Some("MintX"));
        assert_eq!(delta.amount_in, Some(100));
        assert_eq!(delta.mint_out.as_deref(), Some("MintY"));
        assert_eq!(delta.amount_out, Some(120));
    }

    #[test]
    fn test_entries_match_by_account_index_not_position() {
        // Post list is reordered and has an extra entry for another owner.
        let meta = TxMeta {
            pre_token_balances: vec![
                balance(3, "MintX", WALLET, "500"),
                balance(7, "MintY", WALLET, "0"),
            ],
            post_token_balances: vec![
                balance(7, "MintY", WALLET, "40"),
                balance(5, "MintZ", "SomeoneElse", "999"),
                balance(3, "MintX", WALLET, "450"),
            ],
            ..TxMeta::default()
        };
        let delta = infer_swap_delta(&meta, &[], WALLET);
        assert_eq!(delta.mint_in.as_deref(), Some("MintX"));
        assert_eq!(delta.amount_in, Some(50));
        assert_eq!(delta.mint_out.as_deref(), Some("MintY"));
        assert_eq!(delta.amount_out, Some(40));
    }

    #[test]
    fn test_other_owners_ignored() {
        let meta = TxMeta {
            pre_token_balances: vec![balance(1, "MintX", "SomeoneElse", "200")],
            post_token_balances: vec![balance(1, "MintX", "SomeoneElse", "100")],
            ..TxMeta::default()
        };
        assert!(infer_swap_delta(&meta, &[], WALLET).is_empty());
    }

    #[test]
    fn test_native_spend_maps_to_wrapped_sol_fee_adjusted() {
        // Payer spends 1_000_000 lamports on the swap plus a 5_000 fee,
        // receiving MintY tokens.
        let meta = TxMeta {
            fee: Some(5_000),
            pre_balances: vec![2_000_000, 0],
            post_balances: vec![995_000, 0],
            pre_token_balances: vec![balance(1, "MintY", WALLET, "0")],
            post_token_balances: vec![balance(1, "MintY", WALLET, "777")],
            ..TxMeta::default()
        };
        let delta = infer_swap_delta(&meta, &keys(true), WALLET);
        assert_eq!(delta.mint_in.as_deref(), Some(WRAPPED_SOL_MINT));
        assert_eq!(delta.amount_in, Some(1_000_000));
        assert_eq!(delta.mint_out.as_deref(), Some("MintY"));
        assert_eq!(delta.amount_out, Some(777));
    }

    #[test]
    fn test_fee_only_transaction_is_not_a_swap() {
        let meta = TxMeta {
            fee: Some(5_000),
            pre_balances: vec![1_000_000, 0],
            post_balances: vec![995_000, 0],
            ..TxMeta::default()
        };
        assert!(infer_swap_delta(&meta, &keys(true), WALLET).is_empty());
    }

    #[test]
    fn test_native_receive_for_non_payer() {
        let meta = TxMeta {
            fee: Some(5_000),
            pre_balances: vec![0, 1_000_000],
            post_balances: vec![0, 1_500_000],
            pre_token_balances: vec![balance(0, "MintX", WALLET, "300")],
            post_token_balances: vec![balance(0, "MintX", WALLET, "0")],
            ..TxMeta::default()
        };
        // Wallet is the second account, not the payer: no fee adjustment.
        let delta = infer_swap_delta(&meta, &keys(false), WALLET);
        assert_eq!(delta.amount_in, Some(300));
        assert_eq!(delta.mint_out.as_deref(), Some(WRAPPED_SOL_MINT));
        assert_eq!(delta.amount_out, Some(500_000));
    }
}
