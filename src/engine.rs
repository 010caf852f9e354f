//! Sponsorship validation engine.
//!
//! [`CabPaymaster`] is the sponsor-chain half of settlement: it decides
//! whether to sponsor an operation, scopes token approvals to the
//! operation's execution, and on success emits the [`InvoiceCommitment`]
//! that the home chain will later demand proof of.
//!
//! Validation distinguishes two failure shapes. Structural problems with
//! the request bytes are hard [`SponsorshipError`]s. A well-formed request
//! the paymaster chooses not to honor (wrong signer, window not open,
//! window closed) is a [`Sponsorship::Declined`], reported with the window
//! so callers can tell a too-early request from a dead one.

use alloy_primitives::{Address, B256, Signature, U256, keccak256, utils::eip191_hash_message};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use cab_types::codec::{PaymasterData, SponsorTokenData, WireFormatError};
use cab_types::invoice::{InvoiceCommitment, InvoiceDetails, RepayTokenInfo, ValidityWindow};
use cab_types::operation::Operation;
use cab_types::timestamp::UnixTimestamp;

use crate::approvals::ApprovalStore;

/// Hard failures of [`CabPaymaster::validate`].
///
/// These mean the request itself is unusable. A usable request the
/// paymaster merely refuses comes back as [`Sponsorship::Declined`]
/// instead.
#[derive(Debug, thiserror::Error)]
pub enum SponsorshipError {
    /// The `paymasterAndData` bytes do not match the wire layout.
    #[error(transparent)]
    Format(#[from] WireFormatError),
    /// A sponsor token has no configured repayment route.
    #[error("no repay route configured for sponsor token {0}")]
    NoRepayRoute(Address),
}

/// Why a well-formed sponsorship request was declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclineReason {
    /// The signature does not recover to the trusted sponsor signer.
    UntrustedSigner,
    /// The validity window has not opened yet.
    NotYetValid,
    /// The validity window has already closed.
    Expired,
}

/// Outcome of validating a sponsorship request.
#[derive(Debug)]
pub enum Sponsorship {
    /// The request is sponsored. Approvals are live until the grant is
    /// finished or dropped.
    Granted(SponsorGrant),
    /// The request is well-formed but not honored.
    Declined {
        reason: DeclineReason,
        window: ValidityWindow,
    },
}

/// How a sponsored operation's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded,
    Reverted,
}

/// Where a sponsor token is repaid: the vault obligated on the home chain
/// and the chain that vault lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayRoute {
    pub vault: Address,
    pub chain_id: u64,
}

/// The paymaster engine for one sponsor chain.
///
/// Holds the trusted signer whose signature authorizes sponsorships, the
/// token-to-vault routing table that turns sponsor tokens into repayment
/// obligations, and the approval store scoped grants live in.
#[derive(Debug)]
pub struct CabPaymaster {
    address: Address,
    chain_id: u64,
    trusted_signer: Address,
    routes: HashMap<Address, RepayRoute>,
    approvals: Arc<ApprovalStore>,
}

impl CabPaymaster {
    pub fn new(
        address: Address,
        chain_id: u64,
        trusted_signer: Address,
        routes: HashMap<Address, RepayRoute>,
    ) -> Self {
        Self {
            address,
            chain_id,
            trusted_signer,
            routes,
            approvals: Arc::new(ApprovalStore::new()),
        }
    }

    /// The paymaster's own address, as committed into signing digests and
    /// invoice details.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The approval store scoped grants write into. Exposed so execution
    /// environments can consult live allowances.
    pub fn approvals(&self) -> &Arc<ApprovalStore> {
        &self.approvals
    }

    /// Validates a sponsorship request against the wire format, the
    /// trusted signer, the validity window, and the routing table.
    ///
    /// On success every sponsor token's allowance is installed in the
    /// approval store and a [`SponsorGrant`] is returned; the allowances
    /// stay live exactly as long as the grant does. Route resolution runs
    /// before any allowance is installed, so a failed request leaves the
    /// store untouched.
    #[instrument(skip_all, err)]
    pub fn validate(
        &self,
        operation: &Operation,
        now: UnixTimestamp,
    ) -> Result<Sponsorship, SponsorshipError> {
        let data = PaymasterData::parse(&operation.paymaster_and_data)?;
        let section = SponsorTokenData::decode(&data.signature)?;
        let window = ValidityWindow {
            valid_after: data.valid_after,
            valid_until: data.valid_until,
        };

        let digest = commitment_digest(operation, self.address, self.chain_id, &data, &section);
        let recovered = Signature::from_raw_array(&section.signature.0)
            .ok()
            .and_then(|signature| signature.recover_address_from_prehash(&digest).ok());
        if recovered != Some(self.trusted_signer) {
            tracing::warn!(
                sender = %operation.sender,
                recovered = ?recovered,
                "declining sponsorship: signature does not recover to the trusted signer"
            );
            return Ok(Sponsorship::Declined {
                reason: DeclineReason::UntrustedSigner,
                window,
            });
        }
        if now < window.valid_after {
            return Ok(Sponsorship::Declined {
                reason: DeclineReason::NotYetValid,
                window,
            });
        }
        if now > window.valid_until {
            return Ok(Sponsorship::Declined {
                reason: DeclineReason::Expired,
                window,
            });
        }

        let mut repay_token_infos = Vec::with_capacity(section.tokens.len());
        for entry in &section.tokens {
            let route = self
                .routes
                .get(&entry.token)
                .ok_or(SponsorshipError::NoRepayRoute(entry.token))?;
            repay_token_infos.push(RepayTokenInfo {
                vault: route.vault,
                amount: entry.amount,
                chain_id: route.chain_id,
            });
        }

        let mut approved = Vec::with_capacity(section.tokens.len());
        for entry in &section.tokens {
            self.approvals.approve(entry.token, entry.spender, entry.amount);
            approved.push((entry.token, entry.spender));
        }
        tracing::info!(
            sender = %operation.sender,
            tokens = approved.len(),
            "sponsorship granted"
        );

        let details = InvoiceDetails {
            account: operation.sender,
            paymaster: self.address,
            nonce: operation.nonce,
            sponsor_chain_id: self.chain_id,
            repay_token_infos,
        };
        Ok(Sponsorship::Granted(SponsorGrant {
            approvals: Arc::clone(&self.approvals),
            approved,
            details,
            window,
        }))
    }
}

/// A live sponsorship: scoped approvals plus the invoice the paymaster
/// will be owed if execution succeeds.
///
/// The grant owns its allowances. Dropping it revokes them, so an
/// execution path that panics or bails early cannot leak spending
/// permission past the operation it was granted for.
#[derive(Debug)]
pub struct SponsorGrant {
    approvals: Arc<ApprovalStore>,
    approved: Vec<(Address, Address)>,
    details: InvoiceDetails,
    window: ValidityWindow,
}

impl SponsorGrant {
    /// The invoice this grant will commit to on success.
    pub fn details(&self) -> &InvoiceDetails {
        &self.details
    }

    /// The validity window the sponsorship was granted under.
    pub fn window(&self) -> ValidityWindow {
        self.window
    }

    /// Concludes the sponsored operation, revoking all approvals either
    /// way.
    ///
    /// A successful execution yields the [`InvoiceCommitment`] to emit on
    /// the sponsor chain; the id is derived from the grant's details at
    /// this point, not cached from validation. A reverted execution yields
    /// nothing: no commitment, no invoice, no obligation.
    pub fn finish(mut self, outcome: ExecutionOutcome) -> Option<InvoiceCommitment> {
        self.release();
        match outcome {
            ExecutionOutcome::Succeeded => Some(InvoiceCommitment {
                paymaster: self.details.paymaster,
                invoice_id: self.details.id(),
            }),
            ExecutionOutcome::Reverted => None,
        }
    }

    fn release(&mut self) {
        for (token, spender) in self.approved.drain(..) {
            self.approvals.revoke(token, spender);
        }
    }
}

impl Drop for SponsorGrant {
    fn drop(&mut self) {
        self.release();
    }
}

/// The digest a sponsor signer signs to authorize an operation: an EIP-191
/// prefixed keccak over the operation's identity fields, the chain id, the
/// paymaster address, the validity window, and the sponsor-token entries.
///
/// The trailing 65-byte signature is excluded from its own coverage, so
/// clients can assemble the request with a placeholder signature, sign
/// this digest, and splice the real signature in without changing it.
pub fn signing_digest(
    operation: &Operation,
    paymaster: Address,
    chain_id: u64,
) -> Result<B256, WireFormatError> {
    let data = PaymasterData::parse(&operation.paymaster_and_data)?;
    let section = SponsorTokenData::decode(&data.signature)?;
    Ok(commitment_digest(operation, paymaster, chain_id, &data, &section))
}

fn commitment_digest(
    operation: &Operation,
    paymaster: Address,
    chain_id: u64,
    data: &PaymasterData,
    section: &SponsorTokenData,
) -> B256 {
    let preimage = (
        operation.sender,
        operation.nonce,
        keccak256(&operation.init_code),
        keccak256(&operation.call_data),
        keccak256(section.signed_bytes()),
        operation.account_gas_limits,
        operation.pre_verification_gas,
        operation.gas_fees,
        U256::from(chain_id),
        paymaster,
        U256::from(data.valid_until.as_secs()),
        U256::from(data.valid_after.as_secs()),
    )
        .abi_encode();
    eip191_hash_message(keccak256(preimage))
}
