pub mod ids;
pub mod ledger;
pub mod plan;
pub mod position;
pub mod price;

pub use ids::{ObjectId, WalletAddress};
pub use ledger::{CallOutcome, CreatedObject, ExecutionEffects, RawPayload, SimulationResult};
pub use plan::{ContainerRef, PlanStep, StepKind, TransactionPlan};
pub use position::{
    HintSource, OrderDirection, Position, PositionMetadataRecord, PositionSide, RawBalances,
};
pub use price::PriceQuote;
