//! Decoding of simulated-call return values.
//!
//! The ledger hands back each return value as base64 text, a byte array, or
//! an index-keyed byte map depending on transport. [`payload_bytes`]
//! collapses all three into a `Vec<u8>`; everything above it works on bytes
//! only. Integers are little-endian and stay `u64` until unit scaling.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::constants::MANAGER_STATE_MIN_VALUES;
use crate::errors::EngineError;
use crate::types::{ObjectId, RawBalances, RawPayload};

/// Canonical bytes of one return value.
pub fn payload_bytes(payload: &RawPayload) -> Result<Vec<u8>, EngineError> {
    match payload {
        RawPayload::Base64(text) => STANDARD
            .decode(text.trim())
            .map_err(|e| EngineError::decode(format!("invalid base64 payload: {e}"))),
        RawPayload::Bytes(bytes) => Ok(bytes.clone()),
        RawPayload::Indexed(map) => {
            let mut entries = map
                .iter()
                .map(|(key, byte)| {
                    key.trim()
                        .parse::<usize>()
                        .map(|index| (index, *byte))
                        .map_err(|_| EngineError::decode(format!("non-numeric payload index {key:?}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            // String keys sort "10" before "2"; order numerically, then
            // require exactly 0..len.
            entries.sort_unstable_by_key(|(index, _)| *index);
            let mut out = Vec::with_capacity(entries.len());
            for (expected, (index, byte)) in entries.into_iter().enumerate() {
                if index != expected {
                    return Err(EngineError::decode(format!(
                        "indexed payload missing byte {expected}"
                    )));
                }
                out.push(byte);
            }
            Ok(out)
        }
    }
}

/// Leading `u8` of a byte sequence.
pub fn read_u8(bytes: &[u8]) -> Result<u8, EngineError> {
    bytes
        .first()
        .copied()
        .ok_or_else(|| EngineError::decode("u8 from empty payload"))
}

/// Leading little-endian `u64` of a byte sequence.
pub fn read_u64(bytes: &[u8]) -> Result<u64, EngineError> {
    let head: [u8; 8] = bytes
        .get(..8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| EngineError::decode(format!("u64 needs 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_le_bytes(head))
}

pub fn decode_u8(payload: &RawPayload) -> Result<u8, EngineError> {
    read_u8(&payload_bytes(payload)?)
}

pub fn decode_u64(payload: &RawPayload) -> Result<u64, EngineError> {
    read_u64(&payload_bytes(payload)?)
}

pub fn decode_object_id(payload: &RawPayload) -> Result<ObjectId, EngineError> {
    ObjectId::from_bytes(&payload_bytes(payload)?)
}

// ---------------------------------------------------------------------------
// Manager state
// ---------------------------------------------------------------------------

/// Raw manager-state snapshot as returned by the state-read call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerState {
    pub container_id: ObjectId,
    pub pool_id: ObjectId,
    /// 1e9 fixed point.
    pub risk_ratio_raw: u64,
    pub balances: RawBalances,
    pub base_price_raw: u64,
    pub base_price_exponent: u8,
    pub quote_price_raw: u64,
    pub quote_price_exponent: u8,
}

impl ManagerState {
    /// Decode the ordered return values of a state read.
    ///
    /// Layout: container id, pool id, risk ratio, base balance, quote
    /// balance, base debt, quote debt, base price, base exponent, quote
    /// price, quote exponent.
    pub fn decode(values: &[RawPayload]) -> Result<Self, EngineError> {
        if values.len() < MANAGER_STATE_MIN_VALUES {
            return Err(EngineError::decode(format!(
                "manager state needs {MANAGER_STATE_MIN_VALUES} values, got {}",
                values.len()
            )));
        }

        Ok(Self {
            container_id: decode_object_id(&values[0])?,
            pool_id: decode_object_id(&values[1])?,
            risk_ratio_raw: decode_u64(&values[2])?,
            balances: RawBalances {
                base_asset: decode_u64(&values[3])?,
                quote_asset: decode_u64(&values[4])?,
                base_debt: decode_u64(&values[5])?,
                quote_debt: decode_u64(&values[6])?,
            },
            base_price_raw: decode_u64(&values[7])?,
            base_price_exponent: decode_u8(&values[8])?,
            quote_price_raw: decode_u64(&values[9])?,
            quote_price_exponent: decode_u8(&values[10])?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn indexed(bytes: &[u8]) -> RawPayload {
        RawPayload::Indexed(
            bytes
                .iter()
                .enumerate()
                .map(|(i, b)| (i.to_string(), *b))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    /// Encode a manager-state response the way the ledger returns it.
    pub(crate) fn manager_state_payloads(
        container: &ObjectId,
        pool: &ObjectId,
        risk_ratio_raw: u64,
        balances: RawBalances,
        base_price: (u64, u8),
        quote_price: (u64, u8),
    ) -> Vec<RawPayload> {
        let id_bytes = |id: &ObjectId| hex::decode(&id.as_str()[2..]).unwrap();
        let u64_b64 = |v: u64| RawPayload::Base64(STANDARD.encode(v.to_le_bytes()));
        vec![
            RawPayload::Bytes(id_bytes(container)),
            RawPayload::Bytes(id_bytes(pool)),
            u64_b64(risk_ratio_raw),
            u64_b64(balances.base_asset),
            u64_b64(balances.quote_asset),
            RawPayload::Bytes(balances.base_debt.to_le_bytes().to_vec()),
            indexed(&balances.quote_debt.to_le_bytes()),
            u64_b64(base_price.0),
            RawPayload::Bytes(vec![base_price.1]),
            u64_b64(quote_price.0),
            indexed(&[quote_price.1]),
        ]
    }

    #[test]
    fn test_u64_round_trip_in_every_shape() {
        let value: u64 = 123_456_789;
        let le = value.to_le_bytes();

        let shapes = [
            RawPayload::Base64(STANDARD.encode(le)),
            RawPayload::Bytes(le.to_vec()),
            indexed(&le),
        ];
        for payload in &shapes {
            assert_eq!(decode_u64(payload).unwrap(), value, "{payload:?}");
        }
    }

    #[test]
    fn test_u64_from_short_payload_fails() {
        let err = decode_u64(&RawPayload::Bytes(vec![1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("8 bytes"), "got: {err}");
    }

    #[test]
    fn test_u8_from_empty_payload_fails() {
        assert!(decode_u8(&RawPayload::Bytes(vec![])).is_err());
        assert!(decode_u8(&RawPayload::Base64(String::new())).is_err());
        assert_eq!(decode_u8(&RawPayload::Bytes(vec![9, 1])).unwrap(), 9);
    }

    #[test]
    fn test_u64_ignores_trailing_bytes() {
        let mut bytes = 42u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xff]);
        assert_eq!(read_u64(&bytes).unwrap(), 42);
    }

    #[test]
    fn test_indexed_payload_with_gap_fails() {
        let map: BTreeMap<String, u8> = [("0".to_string(), 1), ("2".to_string(), 3)]
            .into_iter()
            .collect();
        assert!(payload_bytes(&RawPayload::Indexed(map)).is_err());
    }

    #[test]
    fn test_indexed_payload_orders_keys_numerically() {
        // Keys arrive as JSON strings; "10" must follow "9", not "1".
        let bytes: Vec<u8> = (0u8..12).map(|b| b * 3).collect();
        let json = format!(
            "{{{}}}",
            bytes
                .iter()
                .enumerate()
                .rev()
                .map(|(i, b)| format!("\"{i}\":{b}"))
                .collect::<Vec<_>>()
                .join(",")
        );
        let payload: RawPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload_bytes(&payload).unwrap(), bytes);
    }

    #[test]
    fn test_indexed_payload_with_non_numeric_key_fails() {
        let map: BTreeMap<String, u8> = [("0".to_string(), 1), ("x".to_string(), 3)]
            .into_iter()
            .collect();
        let err = payload_bytes(&RawPayload::Indexed(map)).unwrap_err();
        assert!(err.to_string().contains("non-numeric"), "got: {err}");
    }

    #[test]
    fn test_bad_base64_fails() {
        assert!(payload_bytes(&RawPayload::Base64("not base64!".into())).is_err());
    }

    #[test]
    fn test_manager_state_decodes() {
        let container = ObjectId::parse("0xc1").unwrap();
        let pool = ObjectId::parse("0xa1").unwrap();
        let balances = RawBalances {
            base_asset: 5_000_000_000,
            quote_asset: 0,
            base_debt: 0,
            quote_debt: 7_500_000,
        };
        let payloads = manager_state_payloads(
            &container,
            &pool,
            1_800_000_000,
            balances,
            (350_000_000, 8),
            (100_000_000, 8),
        );

        let state = ManagerState::decode(&payloads).unwrap();
        assert_eq!(state.container_id, container);
        assert_eq!(state.pool_id, pool);
        assert_eq!(state.risk_ratio_raw, 1_800_000_000);
        assert_eq!(state.balances, balances);
        assert_eq!(state.base_price_raw, 350_000_000);
        assert_eq!(state.base_price_exponent, 8);
        assert_eq!(state.quote_price_exponent, 8);
    }

    #[test]
    fn test_manager_state_too_few_values() {
        let payloads = vec![RawPayload::Bytes(vec![0; 8]); 10];
        let err = ManagerState::decode(&payloads).unwrap_err();
        assert!(err.to_string().contains("needs 11"), "got: {err}");
    }
}
