//! The vault layer seam.
//!
//! Vault accounting itself (deposits, yield routing) belongs to a
//! collaborator; the ledger only needs the ability to move settled amounts
//! out of an account's vault balances, and it trusts the layer to fail
//! loudly rather than silently drop funds.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure surfaced by a vault backend. Always loud: a withdrawal either
/// moves every requested amount or returns one of these.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The backend refused the withdrawal (insufficient balance, reverted
    /// transaction, malformed request).
    #[error("vault rejected withdrawal: {0}")]
    Rejected(String),
    /// The backend could not be reached or the transaction never landed.
    #[error("vault transport failure: {0}")]
    Transport(String),
}

/// Moves settled amounts out of an account's vault balances.
#[async_trait]
pub trait VaultWithdraw: Send + Sync {
    /// Transfers `amounts[i]` from `account`'s balance in `vaults[i]` to
    /// `recipient`, for every index, atomically per call.
    async fn withdraw_sponsor_token(
        &self,
        account: Address,
        vaults: &[Address],
        amounts: &[U256],
        recipient: Address,
    ) -> Result<(), VaultError>;
}

#[async_trait]
impl<T: VaultWithdraw + ?Sized> VaultWithdraw for Arc<T> {
    async fn withdraw_sponsor_token(
        &self,
        account: Address,
        vaults: &[Address],
        amounts: &[U256],
        recipient: Address,
    ) -> Result<(), VaultError> {
        self.as_ref()
            .withdraw_sponsor_token(account, vaults, amounts, recipient)
            .await
    }
}

/// Process-local vault backend: `(owner, vault) -> balance`.
///
/// Backs tests and the settlement node's local mode. The on-chain
/// counterpart lives in [`crate::onchain`].
#[derive(Debug, Default)]
pub struct InMemoryVault {
    balances: DashMap<(Address, Address), U256>,
    // Withdrawals check every debit before applying any; the lock makes
    // that check-then-apply atomic across tasks.
    withdraw_lock: tokio::sync::Mutex<()>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `owner`'s balance in `vault`.
    pub fn deposit(&self, owner: Address, vault: Address, amount: U256) {
        let mut balance = self.balances.entry((owner, vault)).or_insert(U256::ZERO);
        *balance += amount;
    }

    /// Current balance of `owner` in `vault`.
    pub fn balance(&self, owner: Address, vault: Address) -> U256 {
        self.balances
            .get(&(owner, vault))
            .map(|balance| *balance)
            .unwrap_or(U256::ZERO)
    }
}

#[async_trait]
impl VaultWithdraw for InMemoryVault {
    async fn withdraw_sponsor_token(
        &self,
        account: Address,
        vaults: &[Address],
        amounts: &[U256],
        recipient: Address,
    ) -> Result<(), VaultError> {
        if vaults.len() != amounts.len() {
            return Err(VaultError::Rejected(format!(
                "{} vaults against {} amounts",
                vaults.len(),
                amounts.len()
            )));
        }
        let _guard = self.withdraw_lock.lock().await;
        // Check every debit before applying any, so a rejection leaves
        // balances untouched.
        for (vault, amount) in vaults.iter().zip(amounts) {
            if self.balance(account, *vault) < *amount {
                return Err(VaultError::Rejected(format!(
                    "insufficient balance of {account} in vault {vault}"
                )));
            }
        }
        for (vault, amount) in vaults.iter().zip(amounts) {
            let mut balance = self
                .balances
                .entry((account, *vault))
                .or_insert(U256::ZERO);
            *balance -= *amount;
            drop(balance);
            self.deposit(recipient, *vault, *amount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const TEST_ACCOUNT: Address = address!("0x4444444444444444444444444444444444444444");
    const TEST_RECIPIENT: Address = address!("0x5555555555555555555555555555555555555555");
    const TEST_VAULT: Address = address!("0x6666666666666666666666666666666666666666");

    #[tokio::test]
    async fn test_withdraw_moves_balances() {
        let vault = InMemoryVault::new();
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(500u64));

        vault
            .withdraw_sponsor_token(
                TEST_ACCOUNT,
                &[TEST_VAULT],
                &[U256::from(300u64)],
                TEST_RECIPIENT,
            )
            .await
            .unwrap();

        assert_eq!(vault.balance(TEST_ACCOUNT, TEST_VAULT), U256::from(200u64));
        assert_eq!(
            vault.balance(TEST_RECIPIENT, TEST_VAULT),
            U256::from(300u64)
        );
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejects_whole_batch() {
        let vault = InMemoryVault::new();
        let other_vault = address!("0x7777777777777777777777777777777777777777");
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(500u64));

        let result = vault
            .withdraw_sponsor_token(
                TEST_ACCOUNT,
                &[TEST_VAULT, other_vault],
                &[U256::from(100u64), U256::from(1u64)],
                TEST_RECIPIENT,
            )
            .await;

        assert!(matches!(result, Err(VaultError::Rejected(_))));
        assert_eq!(vault.balance(TEST_ACCOUNT, TEST_VAULT), U256::from(500u64));
        assert_eq!(vault.balance(TEST_RECIPIENT, TEST_VAULT), U256::ZERO);
    }

    #[tokio::test]
    async fn test_mismatched_lengths_rejected() {
        let vault = InMemoryVault::new();
        let result = vault
            .withdraw_sponsor_token(TEST_ACCOUNT, &[TEST_VAULT], &[], TEST_RECIPIENT)
            .await;
        assert!(matches!(result, Err(VaultError::Rejected(_))));
    }
}
