// address.rs — 20-byte account/contract addresses.
//
// Addresses are stored as raw bytes, so equality is case-insensitive by
// construction: "0xABCD…" and "0xabcd…" parse to the same value. Display is
// always lowercase, 0x-prefixed hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// An on-chain address (module, validator, owner, endpoint, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address. Routing reads treat it as "no submodule".
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Build an address from the first 20 bytes of a digest.
    ///
    /// Used by content-addressed factories; `digest` must be at least 20 bytes.
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; 20];
        let n = digest.len().min(20);
        bytes[..n].copy_from_slice(&digest[..n]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidAddress {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        if hex.len() != 40 {
            return Err(invalid("expected 40 hex characters"));
        }

        let mut bytes = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| invalid("non-ascii character"))?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid("non-hex character"))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    #[test]
    fn parse_is_case_insensitive() {
        let upper: Address = MIXED.to_uppercase().replacen("0X", "0x", 1).parse().unwrap();
        let lower: Address = MIXED.to_lowercase().parse().unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn display_is_lowercase() {
        let addr: Address = MIXED.parse().unwrap();
        assert_eq!(addr.to_string(), MIXED.to_lowercase());
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = "abcdef0123456789abcdef0123456789abcdef01"
            .parse::<Address>()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAddress { .. }));
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz".parse::<Address>().is_err());
        assert!("0xgggggggggggggggggggggggggggggggggggggggg"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn zero_address() {
        assert!(Address::ZERO.is_zero());
        let parsed: Address = "0x0000000000000000000000000000000000000000".parse().unwrap();
        assert_eq!(parsed, Address::ZERO);
    }

    #[test]
    fn serde_as_string() {
        let addr: Address = MIXED.parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", MIXED.to_lowercase()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
