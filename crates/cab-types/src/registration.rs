//! Per-account paymaster registrations.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::timestamp::UnixTimestamp;

/// An account's binding of an authorized paymaster, the verifier that
/// vouches for that paymaster's invoices, and an expiry.
///
/// At most one registration is live per account. The expiry gates when the
/// binding may be revoked, not whether invoices can settle: obligations
/// created under a registration outlive its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// The paymaster authorized to sponsor for this account.
    pub paymaster: Address,
    /// The verifier consulted when this account's invoices are repaid.
    pub verifier: Address,
    /// When the binding becomes revocable.
    pub expiry: UnixTimestamp,
}

impl Registration {
    /// Whether the registration has expired at `now`. A registration with
    /// `expiry == now` counts as expired, matching the creation-side rule
    /// that a fresh registration's expiry must lie strictly in the future.
    pub fn expired(&self, now: UnixTimestamp) -> bool {
        now >= self.expiry
    }
}
