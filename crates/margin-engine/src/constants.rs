use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Risk defaults
// ---------------------------------------------------------------------------

/// Minimum borrow risk ratio used when a pool has no configured entry.
pub const DEFAULT_MIN_BORROW_RISK_RATIO: f64 = 1.25;

/// Liquidation risk ratio used when a pool has no configured entry.
pub const DEFAULT_LIQUIDATION_RISK_RATIO: f64 = 1.1;

/// On-chain risk ratios are 1e9 fixed point.
pub const RISK_RATIO_SCALE: f64 = 1_000_000_000.0;

// ---------------------------------------------------------------------------
// Discovery filters
// ---------------------------------------------------------------------------

/// Balances and debts at or below this (asset units) count as empty.
pub const NEGLIGIBLE_AMOUNT: f64 = 0.0001;

/// Debt-free containers with less equity than this (USD) are not positions.
pub const DUST_EQUITY_USD: f64 = 0.01;

/// Minimum number of return values in a manager-state response.
pub const MANAGER_STATE_MIN_VALUES: usize = 11;

/// Created objects whose type name contains this are position containers.
pub const CONTAINER_TYPE_MARKER: &str = "MarginManager";

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Stable quote symbol pinned to exactly $1 and never fetched.
pub const USDC_SYMBOL: &str = "USDC";

// ---------------------------------------------------------------------------
// Plan building
// ---------------------------------------------------------------------------

/// Extra debt-asset deposited in a direct-repay close to absorb interest
/// accrued between simulation and execution (0.1%).
pub const REPAY_INTEREST_BUFFER: Decimal = dec!(0.001);

// ---------------------------------------------------------------------------
// Error reporting
// ---------------------------------------------------------------------------

/// Execution failure messages are cut to this many characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 120;

/// Failure-message fragments that mean the signer declined the plan.
pub const USER_REJECTION_PATTERNS: &[&str] = &[
    "rejected",
    "reject",
    "denied",
    "declined",
    "cancelled",
    "canceled",
];

// ---------------------------------------------------------------------------
// Local metadata
// ---------------------------------------------------------------------------

/// Well-known key under which every position metadata record is stored.
pub const POSITION_METADATA_KEY: &str = "margin_positions";
