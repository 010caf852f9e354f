//! On-chain adapters for the prover and vault seams.
//!
//! These back [`EventProver`] and [`VaultWithdraw`] with deployed
//! contracts over an RPC provider. The in-process implementations in
//! [`crate::vault`] cover tests and single-node deployments; these cover
//! the deployments where vault balances and event verification live on
//! chain.

use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::DynProvider;
use alloy_sol_types::sol;
use async_trait::async_trait;

use crate::vault::{VaultError, VaultWithdraw};
use crate::verifier::EventProver;

sol! {
    #[sol(rpc)]
    contract ICrossChainEventProver {
        function verifyEvent(
            uint64 receiptIndex,
            bytes calldata receiptEncoding,
            uint64 logIndex,
            bytes calldata logEncoding,
            bytes calldata proof
        ) external view returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    contract IInvoiceVault {
        function withdrawSponsorToken(
            address account,
            address[] calldata vaults,
            uint256[] calldata amounts,
            address recipient
        ) external;
    }
}

/// An [`EventProver`] backed by a deployed prover contract.
///
/// RPC failures are reported as unverified, matching the seam's contract
/// that the oracle never errors. The failure is logged; the caller only
/// sees `false`.
#[derive(Debug, Clone)]
pub struct OnchainEventProver {
    address: Address,
    provider: DynProvider,
}

impl OnchainEventProver {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self { address, provider }
    }
}

#[async_trait]
impl EventProver for OnchainEventProver {
    async fn verify_event(
        &self,
        receipt_index: u64,
        receipt_encoding: &[u8],
        log_index: u64,
        log_encoding: &[u8],
        proof: &[u8],
    ) -> bool {
        let contract = ICrossChainEventProver::new(self.address, &self.provider);
        let call = contract.verifyEvent(
            receipt_index,
            Bytes::copy_from_slice(receipt_encoding),
            log_index,
            Bytes::copy_from_slice(log_encoding),
            Bytes::copy_from_slice(proof),
        );
        match call.call().await {
            Ok(verified) => verified,
            Err(err) => {
                tracing::warn!(
                    prover = %self.address,
                    %err,
                    "event prover call failed, treating event as unverified"
                );
                false
            }
        }
    }
}

/// A [`VaultWithdraw`] backed by a deployed vault contract.
///
/// Sends `withdrawSponsorToken` and waits for the receipt. A transaction
/// that lands but reverts is a [`VaultError::Rejected`]; anything that
/// keeps the transaction from landing is [`VaultError::Transport`].
#[derive(Debug, Clone)]
pub struct OnchainVault {
    address: Address,
    provider: DynProvider,
}

impl OnchainVault {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self { address, provider }
    }
}

#[async_trait]
impl VaultWithdraw for OnchainVault {
    async fn withdraw_sponsor_token(
        &self,
        account: Address,
        vaults: &[Address],
        amounts: &[U256],
        recipient: Address,
    ) -> Result<(), VaultError> {
        let contract = IInvoiceVault::new(self.address, &self.provider);
        let pending = contract
            .withdrawSponsorToken(account, vaults.to_vec(), amounts.to_vec(), recipient)
            .send()
            .await
            .map_err(|err| VaultError::Transport(err.to_string()))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|err| VaultError::Transport(err.to_string()))?;
        if !receipt.status() {
            return Err(VaultError::Rejected(format!(
                "withdrawal transaction {} reverted",
                receipt.transaction_hash
            )));
        }
        tracing::info!(
            tx_hash = %receipt.transaction_hash,
            %account,
            %recipient,
            "vault withdrawal confirmed"
        );
        Ok(())
    }
}
