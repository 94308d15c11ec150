use serde::{Deserialize, Serialize};

use crate::item::PurchaseRecord;

/// Typed result of one purchase attempt.
///
/// Every variant other than `Success` means nothing was written: the attempt
/// was rejected before touching the store or its transaction was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success(PurchaseRecord),
    /// The buyer already holds a purchase record for this item.
    DuplicatePurchase,
    /// Sold out, or the sale window was not open at decrement time.
    SaleClosed,
    /// The token does not match the item's digest.
    InvalidToken,
    /// Infrastructure failure; the cause was logged where it was caught.
    InternalError { detail: String },
}

impl ExecutionOutcome {
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::InternalError {
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    pub fn record(&self) -> Option<&PurchaseRecord> {
        match self {
            ExecutionOutcome::Success(record) => Some(record),
            _ => None,
        }
    }

    /// Stable numeric state code exposed to callers.
    pub fn state_code(&self) -> i8 {
        match self {
            ExecutionOutcome::Success(_) => 1,
            ExecutionOutcome::SaleClosed => 0,
            ExecutionOutcome::DuplicatePurchase => -1,
            ExecutionOutcome::InternalError { .. } => -2,
            ExecutionOutcome::InvalidToken => -3,
        }
    }

    pub fn state_info(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success(_) => "purchase succeeded",
            ExecutionOutcome::SaleClosed => "sale closed",
            ExecutionOutcome::DuplicatePurchase => "duplicate purchase",
            ExecutionOutcome::InternalError { .. } => "internal error",
            ExecutionOutcome::InvalidToken => "token rejected",
        }
    }
}

impl core::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.state_info(), self.state_code())
    }
}
