//! Byte-packed wire format for sponsorship requests.
//!
//! A sponsored operation carries a `paymasterAndData` blob with this layout:
//!
//! ```text
//! [0..20)   paymaster address
//! [20..36)  paymaster verification gas limit (16 bytes)
//! [36..52)  paymaster post-op gas limit (16 bytes)
//! [52..58)  validUntil, 48-bit unsigned big-endian seconds
//! [58..64)  validAfter, 48-bit unsigned big-endian seconds
//! [64..)    sponsor-token section
//! ```
//!
//! The sponsor-token section is a 1-byte entry count, then `count` packed
//! 72-byte entries (`token ‖ spender ‖ amount`), then a trailing 65-byte
//! signer signature. Its total length must equal `1 + 72·count + 65`
//! exactly; any other length is malformed. The layout is a
//! compatibility-critical external interface, so offsets and the length law
//! must not drift.
//!
//! Every read here is bounds-checked and fails with [`WireFormatError`]
//! rather than panicking; no field is interpreted beyond its byte layout.

use alloy_primitives::{Address, Bytes, U256, hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use thiserror::Error;

use crate::timestamp::UnixTimestamp;

/// Offset of the paymaster-specific data within `paymasterAndData`: the
/// 20-byte paymaster address plus two 16-byte gas limit fields.
pub const PAYMASTER_DATA_OFFSET: usize = 52;

/// Width of one packed sponsor-token entry: token (20) + spender (20) +
/// amount (32).
pub const SPONSOR_TOKEN_BYTES: usize = 72;

/// Width of the trailing secp256k1 signature.
pub const SIGNATURE_BYTES: usize = 65;

/// Most sponsor-token entries a single request may carry.
pub const MAX_SPONSOR_TOKENS: usize = 2;

/// Width of a packed validity-window timestamp.
const TIMESTAMP_BYTES: usize = 6;

/// Largest value representable in a 48-bit wire timestamp.
const MAX_TIMESTAMP: u64 = (1 << 48) - 1;

/// Rejection raised by the codec for bytes that do not match the wire
/// layout. Decoding never partially applies: the first violated check
/// rejects the whole blob.
#[derive(Debug, Error)]
pub enum WireFormatError {
    /// The blob is shorter than the fixed offsets being read.
    #[error("data truncated: {actual} bytes, need at least {needed}")]
    Truncated { actual: usize, needed: usize },
    /// The sponsor-token section length does not match `1 + 72·count + 65`
    /// for its declared count.
    #[error(
        "sponsor token section of {actual} bytes does not match declared count {count} (expected {expected})"
    )]
    LengthMismatch {
        count: u8,
        expected: usize,
        actual: usize,
    },
    /// The declared entry count exceeds the supported maximum.
    #[error("sponsor token count {count} exceeds the supported maximum {MAX_SPONSOR_TOKENS}")]
    TooManySponsorTokens { count: u8 },
    /// A validity-window timestamp does not fit the 48-bit wire field.
    #[error("timestamp {0} exceeds 48 bits")]
    TimestampOverflow(u64),
}

/// A 65-byte secp256k1 signature as it rides the wire.
///
/// Serialized as a 0x-prefixed hex string. The codec does not interpret it;
/// recovery happens in the validation engine.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SponsorSignature(pub [u8; SIGNATURE_BYTES]);

impl fmt::Debug for SponsorSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SponsorSignature({})", hex::encode_prefixed(self.0))
    }
}

impl Display for SponsorSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_prefixed(self.0))
    }
}

impl From<[u8; SIGNATURE_BYTES]> for SponsorSignature {
    fn from(bytes: [u8; SIGNATURE_BYTES]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SponsorSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for SponsorSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_prefixed(self.0))
    }
}

impl<'de> Deserialize<'de> for SponsorSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let raw: [u8; SIGNATURE_BYTES] = bytes.as_slice().try_into().map_err(|_| {
            serde::de::Error::custom(format!(
                "signature must be {SIGNATURE_BYTES} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }
}

/// One sponsor-token entry: a scoped permission for `spender` to pull up to
/// `amount` of `token` while the sponsored operation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorToken {
    /// The ERC-20 token being sponsored.
    pub token: Address,
    /// The address allowed to pull the token during execution.
    pub spender: Address,
    /// The maximum amount the spender may pull.
    #[serde(with = "crate::util::decimal_u256")]
    pub amount: U256,
}

/// The decoded sponsor-token section: the entry list plus the signer
/// signature that vouches for the whole request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorTokenData {
    pub tokens: Vec<SponsorToken>,
    pub signature: SponsorSignature,
}

impl SponsorTokenData {
    /// Exact encoded length of a section carrying `count` entries.
    pub const fn encoded_len(count: usize) -> usize {
        1 + SPONSOR_TOKEN_BYTES * count + SIGNATURE_BYTES
    }

    /// Decodes a sponsor-token section.
    ///
    /// The blob must be `1 + 72·count + 65` bytes for its declared count,
    /// and the count must not exceed [`MAX_SPONSOR_TOKENS`]. Anything else
    /// is a [`WireFormatError`].
    pub fn decode(data: &[u8]) -> Result<Self, WireFormatError> {
        let count = *data.first().ok_or(WireFormatError::Truncated {
            actual: 0,
            needed: Self::encoded_len(0),
        })? as usize;
        let expected = Self::encoded_len(count);
        if data.len() != expected {
            return Err(WireFormatError::LengthMismatch {
                count: count as u8,
                expected,
                actual: data.len(),
            });
        }
        if count > MAX_SPONSOR_TOKENS {
            return Err(WireFormatError::TooManySponsorTokens { count: count as u8 });
        }
        let mut tokens = Vec::with_capacity(count);
        let entries = &data[1..1 + SPONSOR_TOKEN_BYTES * count];
        for entry in entries.chunks_exact(SPONSOR_TOKEN_BYTES) {
            tokens.push(SponsorToken {
                token: Address::from_slice(&entry[..20]),
                spender: Address::from_slice(&entry[20..40]),
                amount: U256::from_be_slice(&entry[40..]),
            });
        }
        let mut signature = [0u8; SIGNATURE_BYTES];
        signature.copy_from_slice(&data[1 + SPONSOR_TOKEN_BYTES * count..]);
        Ok(Self {
            tokens,
            signature: SponsorSignature(signature),
        })
    }

    /// Encodes the section back into its wire form.
    ///
    /// Fails with [`WireFormatError::TooManySponsorTokens`] if the list is
    /// over the supported maximum; the 1-byte count field could carry more,
    /// but the format does not.
    pub fn encode(&self) -> Result<Vec<u8>, WireFormatError> {
        if self.tokens.len() > MAX_SPONSOR_TOKENS {
            return Err(WireFormatError::TooManySponsorTokens {
                count: self.tokens.len() as u8,
            });
        }
        let mut out = self.signed_bytes();
        out.extend_from_slice(&self.signature.0);
        Ok(out)
    }

    /// The portion of the section covered by the signer signature: the
    /// count byte and the packed entries, without the trailing signature
    /// itself.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + SPONSOR_TOKEN_BYTES * self.tokens.len());
        out.push(self.tokens.len() as u8);
        for entry in &self.tokens {
            out.extend_from_slice(entry.token.as_slice());
            out.extend_from_slice(entry.spender.as_slice());
            out.extend_from_slice(&entry.amount.to_be_bytes::<32>());
        }
        out
    }
}

/// The paymaster-specific fields parsed out of `paymasterAndData`: the
/// validity window and the uninterpreted sponsor-token section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterData {
    /// Latest time the sponsorship authorization remains valid.
    pub valid_until: UnixTimestamp,
    /// Earliest time the sponsorship authorization becomes valid.
    pub valid_after: UnixTimestamp,
    /// The sponsor-token section, left opaque here. [`SponsorTokenData::decode`]
    /// interprets it.
    pub signature: Bytes,
}

impl PaymasterData {
    /// Splits a full `paymasterAndData` blob at the fixed offsets.
    ///
    /// Reads `validUntil` and `validAfter` as 48-bit big-endian values
    /// starting at [`PAYMASTER_DATA_OFFSET`] and takes everything after
    /// them as the signature blob. Fails with
    /// [`WireFormatError::Truncated`] if the blob is shorter than the
    /// offsets require.
    pub fn parse(paymaster_and_data: &[u8]) -> Result<Self, WireFormatError> {
        let needed = PAYMASTER_DATA_OFFSET + 2 * TIMESTAMP_BYTES;
        if paymaster_and_data.len() < needed {
            return Err(WireFormatError::Truncated {
                actual: paymaster_and_data.len(),
                needed,
            });
        }
        let data = &paymaster_and_data[PAYMASTER_DATA_OFFSET..];
        let valid_until = read_u48(&data[..TIMESTAMP_BYTES]);
        let valid_after = read_u48(&data[TIMESTAMP_BYTES..2 * TIMESTAMP_BYTES]);
        Ok(Self {
            valid_until: UnixTimestamp::from_secs(valid_until),
            valid_after: UnixTimestamp::from_secs(valid_after),
            signature: Bytes::copy_from_slice(&data[2 * TIMESTAMP_BYTES..]),
        })
    }
}

/// Builds a full `paymasterAndData` blob: paymaster address, gas limit
/// fields, packed validity window, then the sponsor-token section.
///
/// This is the producer-side counterpart of [`PaymasterData::parse`], used
/// by clients assembling sponsorship requests. Fails with
/// [`WireFormatError::TimestampOverflow`] if either window bound exceeds
/// 48 bits.
pub fn encode_paymaster_and_data(
    paymaster: Address,
    verification_gas_limit: u128,
    post_op_gas_limit: u128,
    valid_until: UnixTimestamp,
    valid_after: UnixTimestamp,
    sponsor_section: &[u8],
) -> Result<Vec<u8>, WireFormatError> {
    let mut out = Vec::with_capacity(PAYMASTER_DATA_OFFSET + 2 * TIMESTAMP_BYTES + sponsor_section.len());
    out.extend_from_slice(paymaster.as_slice());
    out.extend_from_slice(&verification_gas_limit.to_be_bytes());
    out.extend_from_slice(&post_op_gas_limit.to_be_bytes());
    out.extend_from_slice(&write_u48(valid_until.as_secs())?);
    out.extend_from_slice(&write_u48(valid_after.as_secs())?);
    out.extend_from_slice(sponsor_section);
    Ok(out)
}

/// Reads a 48-bit big-endian value. The caller guarantees `bytes` is
/// exactly six bytes.
fn read_u48(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

fn write_u48(value: u64) -> Result<[u8; TIMESTAMP_BYTES], WireFormatError> {
    if value > MAX_TIMESTAMP {
        return Err(WireFormatError::TimestampOverflow(value));
    }
    let be = value.to_be_bytes();
    let mut out = [0u8; TIMESTAMP_BYTES];
    out.copy_from_slice(&be[2..]);
    Ok(out)
}
