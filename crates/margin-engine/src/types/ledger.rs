use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::ObjectId;

/// A return-value payload exactly as the ledger hands it back.
///
/// Depending on the transport the same bytes arrive as base64 text, a plain
/// byte array, or an object keyed by byte index. `core::decoder` collapses all
/// three into one byte sequence.
///
/// Index keys stay strings here: JSON object keys are always strings, and an
/// untagged enum cannot coerce them to integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    Base64(String),
    Bytes(Vec<u8>),
    Indexed(BTreeMap<String, u8>),
}

/// Result of one call inside a simulated bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The call ran; ordered return values.
    Returned(Vec<RawPayload>),
    /// The call aborted or was rejected.
    Failed(String),
}

impl CallOutcome {
    pub fn return_values(&self) -> Option<&[RawPayload]> {
        match self {
            Self::Returned(values) => Some(values),
            Self::Failed(_) => None,
        }
    }
}

/// Per-step outcomes of a read-only simulation, in plan order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationResult {
    pub outcomes: Vec<CallOutcome>,
    /// Set when the bundle as a whole failed.
    pub error: Option<String>,
}

impl SimulationResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
            && self
                .outcomes
                .iter()
                .all(|o| matches!(o, CallOutcome::Returned(_)))
    }

    /// Return values of the last step, which is where read-state lands.
    pub fn last_return_values(&self) -> Option<&[RawPayload]> {
        self.outcomes.last().and_then(CallOutcome::return_values)
    }
}

/// An object the ledger reports as created by an executed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedObject {
    pub object_id: ObjectId,
    pub object_type: String,
}

/// Effects of an executed plan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionEffects {
    pub digest: String,
    pub created: Vec<CreatedObject>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shapes_deserialize() {
        let b64: RawPayload = serde_json::from_str("\"FQ==\"").unwrap();
        assert_eq!(b64, RawPayload::Base64("FQ==".into()));

        let bytes: RawPayload = serde_json::from_str("[1,2,3]").unwrap();
        assert_eq!(bytes, RawPayload::Bytes(vec![1, 2, 3]));

        let indexed: RawPayload = serde_json::from_str(r#"{"1":7,"0":9}"#).unwrap();
        let expected: BTreeMap<String, u8> = [("0".to_string(), 9), ("1".to_string(), 7)]
            .into_iter()
            .collect();
        assert_eq!(indexed, RawPayload::Indexed(expected));

        // Past ten bytes the keys no longer sort as strings.
        let json = format!(
            "{{{}}}",
            (0..12).map(|i| format!("\"{i}\":{i}")).collect::<Vec<_>>().join(",")
        );
        let wide: RawPayload = serde_json::from_str(&json).unwrap();
        assert!(matches!(wide, RawPayload::Indexed(ref m) if m.len() == 12));
    }

    #[test]
    fn simulation_success_requires_every_call() {
        let ok = SimulationResult {
            outcomes: vec![CallOutcome::Returned(vec![])],
            error: None,
        };
        assert!(ok.succeeded());

        let partial = SimulationResult {
            outcomes: vec![
                CallOutcome::Returned(vec![]),
                CallOutcome::Failed("abort".into()),
            ],
            error: None,
        };
        assert!(!partial.succeeded());
        assert!(partial.last_return_values().is_none());
    }
}
