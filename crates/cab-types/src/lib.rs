//! Core protocol types for chain-abstracted balance settlement.
//!
//! This crate carries the data model shared by the validation engine, the
//! invoice ledger, and the settlement node: the byte-packed sponsorship wire
//! format ([`codec`]), invoice identity and repayment obligations
//! ([`invoice`]), the signed operation bundle ([`operation`]), per-account
//! paymaster registrations ([`registration`]), and seconds-precision
//! timestamps for validity windows ([`timestamp`]).
//!
//! Everything here is pure data: no chain access, no state, no policy.

pub mod codec;
pub mod invoice;
pub mod operation;
pub mod registration;
pub mod timestamp;
pub mod util;
