//! Invoice identity and repayment obligations.
//!
//! An invoice is a content-addressed repayment obligation: its id is the
//! keccak-256 hash of the Solidity ABI encoding of `(account, paymaster,
//! nonce, sponsorChainId, repayTokenInfos[])`. Identity is derived, never
//! assigned, so the same obligation always maps to the same id on every
//! chain that computes it.

use alloy_primitives::{Address, B256, U256, hex, keccak256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::timestamp::UnixTimestamp;

/// Content-derived invoice identifier.
///
/// Serialized as a 0x-prefixed 32-byte hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub B256);

impl Display for InvoiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InvoiceId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(B256::from_str(s)?))
    }
}

impl From<B256> for InvoiceId {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

/// A declared obligation to repay `amount` from a specific `vault` on a
/// specific chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayTokenInfo {
    /// The vault holding the account balance the repayment draws from.
    pub vault: Address,
    /// The amount owed.
    #[serde(with = "crate::util::decimal_u256")]
    pub amount: U256,
    /// The chain the vault lives on.
    pub chain_id: u64,
}

/// The full preimage of an invoice id: who owes whom, for which operation,
/// sponsored on which chain, repayable from which vaults.
///
/// This is also the `invoiceDetails` argument of `repay`: settlement
/// recomputes the id from these fields and refuses details that do not
/// hash to the claimed id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetails {
    /// The account that owes the repayment.
    pub account: Address,
    /// The paymaster owed.
    pub paymaster: Address,
    /// The sponsored operation's nonce.
    #[serde(with = "crate::util::decimal_u256")]
    pub nonce: U256,
    /// The chain the sponsorship happened on.
    pub sponsor_chain_id: u64,
    /// The declared repayment obligations, order-significant.
    pub repay_token_infos: Vec<RepayTokenInfo>,
}

impl InvoiceDetails {
    /// Derives the invoice id: keccak-256 over the Solidity ABI encoding
    /// of the fields. Chain ids widen to `uint256` words, and the repay
    /// list encodes as a dynamic array of `(address, uint256, uint256)`
    /// tuples, so the digest matches `keccak256(abi.encode(...))` of the
    /// equivalent on-chain structs bit-for-bit.
    pub fn id(&self) -> InvoiceId {
        let repays: Vec<(Address, U256, U256)> = self
            .repay_token_infos
            .iter()
            .map(|repay| (repay.vault, repay.amount, U256::from(repay.chain_id)))
            .collect();
        let preimage = (
            self.account,
            self.paymaster,
            self.nonce,
            U256::from(self.sponsor_chain_id),
            repays,
        )
            .abi_encode();
        InvoiceId(keccak256(preimage))
    }
}

/// The ledger's stored record for a created invoice.
///
/// Create-once, mutate-once: a record is inserted exactly once per id, and
/// the only mutation it ever sees is the `repaid` flag flipping true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// The account the invoice was created for.
    pub account: Address,
    /// The sponsored operation's nonce.
    #[serde(with = "crate::util::decimal_u256")]
    pub nonce: U256,
    /// The paymaster owed.
    pub paymaster: Address,
    /// The chain this record was created on.
    pub created_on_chain_id: u64,
    /// Whether the obligation has been settled.
    pub repaid: bool,
}

/// The commitment a paymaster emits on the sponsor chain once a sponsored
/// operation has succeeded. Settlement proofs attest that this commitment
/// appeared in the sponsor chain's logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCommitment {
    /// The paymaster that emitted the commitment.
    pub paymaster: Address,
    /// The committed invoice id.
    pub invoice_id: InvoiceId,
}

impl InvoiceCommitment {
    /// Canonical ABI bytes of the commitment as it appears in the sponsor
    /// chain's log data: `abi.encode(paymaster, invoiceId)`.
    pub fn abi_bytes(&self) -> Vec<u8> {
        (self.paymaster, self.invoice_id.0).abi_encode()
    }
}

/// The validity window attached to a sponsorship request, echoed back by
/// validation outcomes so callers can price an operation even when the
/// grant is declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    pub valid_after: UnixTimestamp,
    pub valid_until: UnixTimestamp,
}

impl ValidityWindow {
    /// Whether `now` falls inside the window. Bounds are inclusive: the
    /// request is out of range exactly when `now < validAfter` or
    /// `now > validUntil`.
    pub fn contains(&self, now: UnixTimestamp) -> bool {
        !(now < self.valid_after || now > self.valid_until)
    }
}
