use serde::{Deserialize, Serialize};

use super::ids::{ObjectId, WalletAddress};
use super::position::OrderDirection;

/// Which container a step acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRef {
    /// A container that already exists on-chain.
    Existing(ObjectId),
    /// The container created earlier in the same plan.
    Created,
}

/// One ledger operation. Amounts are native integer units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanStep {
    CreateContainer {
        pool_id: ObjectId,
    },
    /// Publish the created container as an addressable shared object.
    ShareContainer,
    Deposit {
        container: ContainerRef,
        pool_id: ObjectId,
        coin: String,
        amount: u64,
    },
    Borrow {
        container: ContainerRef,
        pool_id: ObjectId,
        coin: String,
        amount: u64,
    },
    PlaceMarketOrder {
        container: ContainerRef,
        pool_id: ObjectId,
        direction: OrderDirection,
        quantity: u64,
        client_order_id: u64,
    },
    /// Move settled order proceeds into the container's balances.
    WithdrawSettled {
        container: ContainerRef,
        pool_id: ObjectId,
    },
    /// `amount: None` repays the full outstanding debt.
    Repay {
        container: ContainerRef,
        pool_id: ObjectId,
        coin: String,
        amount: Option<u64>,
    },
    /// Produces a value object that must be transferred out.
    Withdraw {
        container: ContainerRef,
        pool_id: ObjectId,
        coin: String,
        amount: u64,
    },
    /// Send the value objects produced by the listed steps to `recipient`.
    TransferOut {
        recipient: WalletAddress,
        sources: Vec<usize>,
    },
    ReadState {
        container: ContainerRef,
        pool_id: ObjectId,
    },
}

/// Discriminant of a [`PlanStep`], used for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateContainer,
    ShareContainer,
    Deposit,
    Borrow,
    PlaceMarketOrder,
    WithdrawSettled,
    Repay,
    Withdraw,
    TransferOut,
    ReadState,
}

impl PlanStep {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::CreateContainer { .. } => StepKind::CreateContainer,
            Self::ShareContainer => StepKind::ShareContainer,
            Self::Deposit { .. } => StepKind::Deposit,
            Self::Borrow { .. } => StepKind::Borrow,
            Self::PlaceMarketOrder { .. } => StepKind::PlaceMarketOrder,
            Self::WithdrawSettled { .. } => StepKind::WithdrawSettled,
            Self::Repay { .. } => StepKind::Repay,
            Self::Withdraw { .. } => StepKind::Withdraw,
            Self::TransferOut { .. } => StepKind::TransferOut,
            Self::ReadState { .. } => StepKind::ReadState,
        }
    }
}

/// Ordered, side-effect-free description of ledger operations.
///
/// The remote environment applies a submitted plan all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub steps: Vec<PlanStep>,
}

impl TransactionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, returning its index.
    pub fn push(&mut self, step: PlanStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(PlanStep::kind).collect()
    }

    pub fn count(&self, kind: StepKind) -> usize {
        self.steps.iter().filter(|s| s.kind() == kind).count()
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.count(kind) > 0
    }
}
