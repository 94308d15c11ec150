use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use flashsale_core::SaleItemId;
use flashsale_sales::{PurchaseRecord, SaleItem};

/// Durable store operation error.
///
/// These are **infrastructure errors** (connectivity, decoding, unexpected
/// constraint failures). Expected admission results such as a duplicate
/// purchase or an exhausted item are reported through `InsertOutcome` and the
/// affected-row count, never through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("unexpected constraint violation: {0}")]
    Constraint(String),

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Result of inserting a purchase record under the `(item, buyer)` uniqueness constraint.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// One atomic unit of work against the store.
///
/// Nothing done through a transaction is visible to other callers until
/// `commit` succeeds. Dropping a transaction without committing rolls it back.
pub trait PurchaseTransaction {
    /// Insert a purchase record, subject to the `(sale_item_id, buyer_id)` uniqueness constraint.
    fn insert_purchase(&mut self, record: &PurchaseRecord) -> Result<InsertOutcome, StoreError>;

    /// `remaining = remaining - 1` guarded by `remaining > 0` and
    /// `start <= at <= end`. Returns the number of rows affected (0 or 1).
    fn decrement_inventory(&mut self, sale_item_id: SaleItemId, at: DateTime<Utc>) -> Result<u64, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Authoritative store for sale items and purchase records.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - enforce the `(sale_item_id, buyer_id)` uniqueness of purchase records
/// - apply the inventory decrement as a single guarded update (never read-then-write
///   outside the transaction's lock)
/// - make `insert_purchase` + `decrement_inventory` atomic within one transaction
pub trait SaleStore: Send + Sync {
    /// Point lookup by id.
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleItem>, StoreError>;

    /// Items whose window has not ended at `at`, ordered by start time.
    fn list_active(&self, at: DateTime<Utc>, limit: usize) -> Result<Vec<SaleItem>, StoreError>;

    fn begin(&self) -> Result<Box<dyn PurchaseTransaction + '_>, StoreError>;
}

impl<S> SaleStore for Arc<S>
where
    S: SaleStore + ?Sized,
{
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleItem>, StoreError> {
        (**self).get(sale_item_id)
    }

    fn list_active(&self, at: DateTime<Utc>, limit: usize) -> Result<Vec<SaleItem>, StoreError> {
        (**self).list_active(at, limit)
    }

    fn begin(&self) -> Result<Box<dyn PurchaseTransaction + '_>, StoreError> {
        (**self).begin()
    }
}
