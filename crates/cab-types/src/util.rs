//! Small serialization helpers shared across the protocol types.

/// Serde adapter that carries a [`U256`] as a decimal string.
///
/// Token amounts and nonces ride JSON as decimal strings (`"500"`) rather
/// than the default hex form, matching how amounts appear in settlement
/// requests and responses.
///
/// [`U256`]: alloy_primitives::U256
pub mod decimal_u256 {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a U256 as a decimal string.
    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserialize a decimal string into a U256.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }
}
