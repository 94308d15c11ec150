//! Flash-sale domain module.
//!
//! This crate contains the business rules of a time-boxed, limited-inventory
//! sale, implemented purely as deterministic domain logic (no IO, no storage):
//! the sale item and purchase record model, purchase-authorization tokens and
//! the typed outcome of a purchase attempt.

pub mod item;
pub mod outcome;
pub mod token;

pub use item::{PurchaseRecord, SaleItem, SaleListing, SaleWindow};
pub use outcome::ExecutionOutcome;
pub use token::{ExposureToken, TokenIssuer};
