//! Cross-chain invoice settlement for sponsored operations.
//!
//! A paymaster fronts tokens for a user operation on one chain (the
//! sponsor chain) in exchange for a repayment obligation settled on
//! another (the home chain). This crate implements both halves and the
//! seams between them.
//!
//! # Overview
//!
//! On the sponsor chain, [`engine::CabPaymaster`] validates signed
//! sponsorship requests, installs execution-scoped token approvals, and on
//! success commits to an invoice id derived from the obligation itself.
//! On the home chain, [`ledger::InvoiceLedger`] records invoices, checks
//! settlement proofs through pluggable verifiers, and pulls repayment out
//! of vaults exactly once per invoice.
//!
//! Identity ties the two halves together: an invoice id is the keccak-256
//! hash of its own details, so both chains derive the same id without
//! coordination, and forged details fail settlement by construction.
//!
//! # Modules
//!
//! - [`approvals`] - Execution-scoped token approvals held by live grants.
//! - [`engine`] - The paymaster engine: validation, grants, commitments.
//! - [`ledger`] - Home-chain invoice records and at-most-once settlement.
//! - [`onchain`] - RPC-backed adapters for the prover and vault seams.
//! - [`registry`] - Account registrations naming paymaster and verifier.
//! - [`vault`] - The withdrawal seam and an in-memory reference vault.
//! - [`verifier`] - Proof systems: cross-chain event proofs and attestations.
//!
//! Wire-format and identity types live in the [`cab_types`] crate.

pub mod approvals;
pub mod engine;
pub mod ledger;
pub mod onchain;
pub mod registry;
pub mod vault;
pub mod verifier;
