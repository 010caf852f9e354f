//! Proof verification seams.
//!
//! Two capability boundaries live here. [`EventProver`] is the external
//! cross-chain oracle: given opaque proof bytes, it answers whether a
//! claimed log appeared on a claimed remote chain, and answers `false` for
//! anything it cannot confirm. [`InvoiceVerifier`] sits above it: one
//! implementation per supported proof system, each deciding whether a
//! proof attests the sponsor-chain commitment for a specific invoice.
//!
//! Both seams share the oracle contract: `false`, never an error, for
//! malformed or non-matching input. Callers cannot distinguish "wrong"
//! from "unavailable", and must not try.

use alloy_primitives::{Address, Signature, utils::eip191_hash_message};
use alloy_sol_types::{SolValue, sol};
use async_trait::async_trait;
use std::sync::Arc;

use cab_types::invoice::{InvoiceCommitment, InvoiceDetails, InvoiceId};

sol! {
    /// The ABI container event-proof submissions ride in: the receipt and
    /// log position being claimed, their encodings, and the oracle's own
    /// opaque proof material.
    struct EventProofBundle {
        uint64 receiptIndex;
        bytes receiptEncoding;
        uint64 logIndex;
        bytes logEncoding;
        bytes proverProof;
    }
}

/// External cross-chain event oracle.
///
/// The core does not verify consensus itself; it only defines this call
/// contract and how the answer gates settlement.
#[async_trait]
pub trait EventProver: Send + Sync {
    /// Whether the log at `log_index` of the receipt at `receipt_index`,
    /// with the given encodings, was emitted on the counterpart chain.
    async fn verify_event(
        &self,
        receipt_index: u64,
        receipt_encoding: &[u8],
        log_index: u64,
        log_encoding: &[u8],
        proof: &[u8],
    ) -> bool;
}

#[async_trait]
impl<T: EventProver + ?Sized> EventProver for Arc<T> {
    async fn verify_event(
        &self,
        receipt_index: u64,
        receipt_encoding: &[u8],
        log_index: u64,
        log_encoding: &[u8],
        proof: &[u8],
    ) -> bool {
        self.as_ref()
            .verify_event(receipt_index, receipt_encoding, log_index, log_encoding, proof)
            .await
    }
}

/// Per-proof-system invoice verification.
///
/// The ledger depends only on this interface; which implementation speaks
/// for an account is decided by the account's registration.
#[async_trait]
pub trait InvoiceVerifier: Send + Sync {
    /// Whether `proof` attests that the commitment for `invoice_id` was
    /// emitted on the sponsor chain, and that `details` really hash to
    /// that id.
    async fn verify_invoice(
        &self,
        invoice_id: InvoiceId,
        details: &InvoiceDetails,
        proof: &[u8],
    ) -> bool;
}

#[async_trait]
impl<T: InvoiceVerifier + ?Sized> InvoiceVerifier for Arc<T> {
    async fn verify_invoice(
        &self,
        invoice_id: InvoiceId,
        details: &InvoiceDetails,
        proof: &[u8],
    ) -> bool {
        self.as_ref().verify_invoice(invoice_id, details, proof).await
    }
}

/// Verifies invoices against cross-chain event proofs.
///
/// The proof bytes must be an ABI-encoded [`EventProofBundle`] whose log
/// encoding is exactly the expected commitment: `abi.encode(paymaster,
/// invoiceId)` for the paymaster named in the details. Position and
/// inclusion are the oracle's to confirm.
#[derive(Debug)]
pub struct EventProofVerifier<P> {
    prover: P,
}

impl<P> EventProofVerifier<P> {
    pub fn new(prover: P) -> Self {
        Self { prover }
    }
}

#[async_trait]
impl<P: EventProver> InvoiceVerifier for EventProofVerifier<P> {
    async fn verify_invoice(
        &self,
        invoice_id: InvoiceId,
        details: &InvoiceDetails,
        proof: &[u8],
    ) -> bool {
        if details.id() != invoice_id {
            tracing::debug!(%invoice_id, "invoice details do not hash to the claimed id");
            return false;
        }
        let Ok(bundle) = EventProofBundle::abi_decode(proof) else {
            tracing::debug!(%invoice_id, "event proof bundle failed to decode");
            return false;
        };
        let expected = InvoiceCommitment {
            paymaster: details.paymaster,
            invoice_id,
        }
        .abi_bytes();
        if bundle.logEncoding.as_ref() != expected.as_slice() {
            tracing::debug!(%invoice_id, "claimed log is not the expected commitment");
            return false;
        }
        self.prover
            .verify_event(
                bundle.receiptIndex,
                &bundle.receiptEncoding,
                bundle.logIndex,
                &bundle.logEncoding,
                &bundle.proverProof,
            )
            .await
    }
}

/// Verifies invoices against attestor signatures.
///
/// The proof is a 65-byte secp256k1 signature over the invoice id (EIP-191
/// prefixed) from the configured attestor.
#[derive(Debug, Clone, Copy)]
pub struct AttestationVerifier {
    attestor: Address,
}

impl AttestationVerifier {
    pub fn new(attestor: Address) -> Self {
        Self { attestor }
    }
}

#[async_trait]
impl InvoiceVerifier for AttestationVerifier {
    async fn verify_invoice(
        &self,
        invoice_id: InvoiceId,
        details: &InvoiceDetails,
        proof: &[u8],
    ) -> bool {
        if details.id() != invoice_id {
            return false;
        }
        let Ok(raw) = <&[u8; 65]>::try_from(proof) else {
            return false;
        };
        let Ok(signature) = Signature::from_raw_array(raw) else {
            return false;
        };
        let digest = eip191_hash_message(invoice_id.0);
        signature
            .recover_address_from_prehash(&digest)
            .map(|recovered| recovered == self.attestor)
            .unwrap_or(false)
    }
}
