use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use tracing::info;

use super::abi::addr_hex;
use super::rpc::EvmRpc;

/// Local EIP-1559 signer plus the fee policy applied to every outgoing
/// transaction. Nonce, gas and fees are filled at send time.
#[derive(Debug)]
pub struct EvmWallet {
    signer: PrivateKeySigner,
    pub address: Address,
    chain_id: u64,
    max_fee_gwei: Option<f64>,
    max_priority_fee_gwei: Option<f64>,
}

impl EvmWallet {
    pub fn from_key(
        private_key: &str,
        chain_id: u64,
        max_fee_gwei: Option<f64>,
        max_priority_fee_gwei: Option<f64>,
    ) -> anyhow::Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid EVM private key: {e}"))?;
        let address = signer.address();
        info!(address = %addr_hex(address), chain_id, "EVM wallet ready");
        Ok(Self {
            signer,
            address,
            chain_id,
            max_fee_gwei,
            max_priority_fee_gwei,
        })
    }

    /// Fill nonce/gas/fees, sign and broadcast. Returns the tx hash.
    pub async fn send(
        &self,
        rpc: &EvmRpc,
        to: Address,
        value: U256,
        input: Bytes,
    ) -> anyhow::Result<String> {
        let nonce = rpc.transaction_count(self.address).await?;
        let gas_limit = rpc.estimate_gas(self.address, to, value, &input).await?;

        let max_fee_per_gas = match self.max_fee_gwei {
            Some(gwei) => gwei_to_wei(gwei),
            None => rpc.gas_price().await?.saturating_mul(2),
        };
        let max_priority_fee_per_gas = self
            .max_priority_fee_gwei
            .map(gwei_to_wei)
            .unwrap_or(2_000_000_000);

        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            to: TxKind::Call(to),
            value,
            access_list: Default::default(),
            input,
        };

        let signature = self.signer.sign_transaction_sync(&mut tx)?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let raw = envelope.encoded_2718();

        let tx_hash = rpc.send_raw_transaction(&raw).await?;
        info!(tx_hash = %tx_hash, nonce, gas_limit, "submitted transaction");
        Ok(tx_hash)
    }
}

fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei.max(0.0) * 1e9) as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(2.0), 2_000_000_000);
        assert_eq!(gwei_to_wei(0.5), 500_000_000);
        assert_eq!(gwei_to_wei(-1.0), 0);
    }

    #[test]
    fn test_wallet_derives_address_from_key() {
        // Well-known test vector: key 0x01 derives this address.
        let wallet = EvmWallet::from_key(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
            1,
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            addr_hex(wallet.address),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }
}
