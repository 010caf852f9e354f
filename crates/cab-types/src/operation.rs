//! The signed operation bundle submitted for sponsorship.

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A bundled user action: account identity, replay nonce, opaque payloads,
/// packed gas fields, and the paymaster blob.
///
/// The engine hashes `init_code` and `call_data` without inspecting them;
/// the packed gas fields enter the commitment hash as opaque 32-byte words.
/// Only `paymaster_and_data` is parsed, by [`crate::codec::PaymasterData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// The account the operation acts for.
    pub sender: Address,
    /// Monotonic per-account replay guard. Carried into the invoice
    /// preimage; monotonicity itself is the execution environment's to
    /// enforce.
    #[serde(with = "crate::util::decimal_u256")]
    pub nonce: U256,
    /// Account deployment payload, hashed not inspected.
    pub init_code: Bytes,
    /// The action payload, hashed not inspected.
    pub call_data: Bytes,
    /// Packed verification and call gas limits (16 + 16 bytes).
    pub account_gas_limits: B256,
    /// Gas charged ahead of verification.
    #[serde(with = "crate::util::decimal_u256")]
    pub pre_verification_gas: U256,
    /// Packed max priority fee and max fee (16 + 16 bytes).
    pub gas_fees: B256,
    /// Paymaster address, gas limits, validity window, and the
    /// sponsor-token section, byte-packed per [`crate::codec`].
    pub paymaster_and_data: Bytes,
}
