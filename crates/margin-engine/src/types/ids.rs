use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// 32-byte ledger identifier (object id or account address), held in
/// canonical `0x`-prefixed lowercase hex with full zero padding.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

/// Wallet addresses share the object-id format.
pub type WalletAddress = ObjectId;

const ID_HEX_LEN: usize = 64;

impl ObjectId {
    /// Parse and normalise. Accepts short forms such as `0x2`.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let hex_part = raw
            .trim()
            .strip_prefix("0x")
            .or_else(|| raw.trim().strip_prefix("0X"))
            .unwrap_or(raw.trim());

        if hex_part.is_empty() || hex_part.len() > ID_HEX_LEN {
            return Err(EngineError::invalid(format!("malformed object id: {raw:?}")));
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EngineError::invalid(format!("non-hex object id: {raw:?}")));
        }

        Ok(Self(format!(
            "0x{:0>width$}",
            hex_part.to_lowercase(),
            width = ID_HEX_LEN
        )))
    }

    /// Build from the 32 raw bytes a ledger returns for an id value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() != ID_HEX_LEN / 2 {
            return Err(EngineError::decode(format!(
                "object id needs 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs: `0x1234…cdef`.
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_is_padded() {
        let id = ObjectId::parse("0x2").unwrap();
        assert_eq!(id.as_str().len(), 66);
        assert!(id.as_str().ends_with("02"));
        assert!(id.as_str().starts_with("0x0000"));
    }

    #[test]
    fn case_is_normalised() {
        let a = ObjectId::parse("0xABCDEF").unwrap();
        let b = ObjectId::parse("abcdef").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_hex_and_empty() {
        assert!(ObjectId::parse("0xzz").is_err());
        assert!(ObjectId::parse("0x").is_err());
        assert!(ObjectId::parse(&format!("0x{}", "1".repeat(65))).is_err());
    }

    #[test]
    fn from_bytes_matches_parse() {
        let bytes = [0xabu8; 32];
        let id = ObjectId::from_bytes(&bytes).unwrap();
        assert_eq!(id, ObjectId::parse(&"ab".repeat(32)).unwrap());
        assert!(ObjectId::from_bytes(&bytes[..31]).is_err());
    }

    #[test]
    fn serde_roundtrip_normalises() {
        let id: ObjectId = serde_json::from_str("\"0xA\"").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"0x{:0>64}\"", "a"));
    }
}
