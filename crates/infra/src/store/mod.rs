//! Authoritative sale-item and purchase-record storage.
//!
//! The store is the only shared mutable resource of the system: inventory is
//! decremented here, under the store's own locking, and nowhere else.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemorySaleStore;
pub use postgres::PostgresSaleStore;
pub use r#trait::{InsertOutcome, PurchaseTransaction, SaleStore, StoreError};
