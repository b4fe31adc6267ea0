//! Ledger service boundary.
//!
//! The engine never talks to a node directly. Reads (registry enumeration and
//! read-only simulation) and writes (signed submission) go through these
//! traits, so a node client, a wallet bridge, or a test double can sit behind
//! them.

use async_trait::async_trait;

use crate::constants::CONTAINER_TYPE_MARKER;
use crate::errors::EngineError;
use crate::types::{ExecutionEffects, ObjectId, SimulationResult, TransactionPlan, WalletAddress};

#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Container ids the registry lists for `owner`. Single read call.
    async fn owned_containers(&self, owner: &WalletAddress) -> Result<Vec<ObjectId>, EngineError>;

    /// Run `plan` read-only as `sender` and report per-step outcomes.
    ///
    /// A step rejected by the ledger shows up as a failed outcome, not `Err`.
    /// `Err` is reserved for transport problems.
    async fn simulate(
        &self,
        sender: &WalletAddress,
        plan: &TransactionPlan,
    ) -> Result<SimulationResult, EngineError>;
}

#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Sign and submit `plan`. The ledger applies it all-or-nothing.
    ///
    /// Remote failures, including a signer declining, come back as
    /// [`EngineError::Execution`] carrying the remote message verbatim.
    async fn execute(
        &self,
        sender: &WalletAddress,
        plan: &TransactionPlan,
    ) -> Result<ExecutionEffects, EngineError>;
}

/// Full read/write ledger access.
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> Ledger for T {}

/// Id of the position container created by an executed plan, if any.
pub fn extract_created_container(effects: &ExecutionEffects) -> Option<ObjectId> {
    effects
        .created
        .iter()
        .find(|obj| obj.object_type.contains(CONTAINER_TYPE_MARKER))
        .map(|obj| obj.object_id.clone())
}

// ---------------------------------------------------------------------------
// In-memory ledger double
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CreatedObject;

    #[test]
    fn test_extract_created_container_matches_type_name() {
        let effects = ExecutionEffects {
            digest: "d".into(),
            created: vec![
                CreatedObject {
                    object_id: ObjectId::parse("0x1").unwrap(),
                    object_type: "0x2::coin::Coin<0x2::sui::SUI>".into(),
                },
                CreatedObject {
                    object_id: ObjectId::parse("0x2").unwrap(),
                    object_type: "0xabc::margin_manager::MarginManager<A, B>".into(),
                },
            ],
        };
        assert_eq!(
            extract_created_container(&effects),
            Some(ObjectId::parse("0x2").unwrap())
        );
    }

    #[test]
    fn test_extract_created_container_absent() {
        let effects = ExecutionEffects::default();
        assert!(extract_created_container(&effects).is_none());
    }
}
