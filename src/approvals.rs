//! Scoped sponsor-token approvals.
//!
//! The validation engine installs an approval per sponsor-token entry when
//! it grants a sponsorship, and every approval is revoked when the grant is
//! dropped. Nothing else writes here; executors only read allowances while
//! the sponsored operation runs.

use alloy_primitives::{Address, U256};
use dashmap::DashMap;

/// Concurrent `(token, spender) -> allowance` store.
///
/// An approval is an overwrite, not an accumulation: granting the same
/// pair twice leaves the later amount, mirroring ERC-20 approval
/// semantics.
#[derive(Debug, Default)]
pub struct ApprovalStore {
    entries: DashMap<(Address, Address), U256>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `spender` to pull up to `amount` of `token`.
    pub fn approve(&self, token: Address, spender: Address, amount: U256) {
        self.entries.insert((token, spender), amount);
    }

    /// Clears the allowance for the pair.
    pub fn revoke(&self, token: Address, spender: Address) {
        self.entries.remove(&(token, spender));
    }

    /// Remaining allowance for the pair, zero if none.
    pub fn allowance(&self, token: Address, spender: Address) -> U256 {
        self.entries
            .get(&(token, spender))
            .map(|amount| *amount)
            .unwrap_or(U256::ZERO)
    }
}
