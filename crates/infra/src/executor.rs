//! Purchase admission.
//!
//! ```text
//! token check ── mismatch ──────────────────────────────► InvalidToken
//!   ↓
//! BEGIN
//!   ↓
//! insert purchase record ── (item, buyer) exists ── ROLLBACK ► DuplicatePurchase
//!   ↓
//! guarded decrement ── 0 rows (sold out / window closed) ── ROLLBACK ► SaleClosed
//!   ↓ 1 row
//! COMMIT ─────────────────────────────────────────────────► Success(record)
//! ```
//!
//! The duplicate check runs before the decrement so a known repeat buyer never
//! spends a decrement attempt. Both writes share one transaction, so a purchase
//! record never exists without its matching decrement.
//!
//! No application-level locking happens here; concurrent executors rely on the
//! store's row lock on the guarded update and its uniqueness constraint.

use std::sync::Arc;

use tracing::{error, info, warn};

use flashsale_core::{BuyerId, Clock, SaleItemId};
use flashsale_sales::{ExecutionOutcome, PurchaseRecord, TokenIssuer};

use crate::store::{InsertOutcome, SaleStore, StoreError};

pub struct PurchaseExecutor<S> {
    store: S,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for PurchaseExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseExecutor")
            .field("store", &self.store)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl<S> PurchaseExecutor<S>
where
    S: SaleStore,
{
    pub fn new(store: S, tokens: TokenIssuer, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            tokens,
            clock,
        }
    }

    pub fn execute(&self, sale_item_id: SaleItemId, buyer_id: BuyerId, candidate_token: &str) -> ExecutionOutcome {
        if !self.tokens.verify(sale_item_id, candidate_token) {
            warn!(%sale_item_id, %buyer_id, "purchase rejected: token mismatch");
            return ExecutionOutcome::InvalidToken;
        }

        match self.admit(sale_item_id, buyer_id) {
            Ok(outcome) => {
                info!(
                    %sale_item_id,
                    %buyer_id,
                    state = outcome.state_code(),
                    "purchase {}",
                    outcome.state_info()
                );
                outcome
            }
            Err(e) => {
                error!(%sale_item_id, %buyer_id, error = %e, "purchase aborted by store failure");
                ExecutionOutcome::internal(e.to_string())
            }
        }
    }

    /// Steps 2–4 inside one transaction. An early `?` drops the transaction,
    /// which rolls it back.
    fn admit(&self, sale_item_id: SaleItemId, buyer_id: BuyerId) -> Result<ExecutionOutcome, StoreError> {
        let now = self.clock.now();
        let record = PurchaseRecord::new(sale_item_id, buyer_id, now);

        let mut tx = self.store.begin()?;

        if tx.insert_purchase(&record)? == InsertOutcome::AlreadyExists {
            tx.rollback()?;
            return Ok(ExecutionOutcome::DuplicatePurchase);
        }

        match tx.decrement_inventory(sale_item_id, now)? {
            0 => {
                tx.rollback()?;
                Ok(ExecutionOutcome::SaleClosed)
            }
            1 => {
                tx.commit()?;
                Ok(ExecutionOutcome::Success(record))
            }
            n => {
                tx.rollback()?;
                Err(StoreError::Constraint(format!(
                    "guarded decrement affected {n} rows for sale item {sale_item_id}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Duration, Utc};
    use flashsale_core::FixedClock;
    use flashsale_sales::{SaleItem, SaleWindow};

    use crate::store::{InMemorySaleStore, PurchaseTransaction};

    fn setup(total: i64) -> (PurchaseExecutor<Arc<InMemorySaleStore>>, Arc<InMemorySaleStore>, Arc<FixedClock>, String) {
        let now = Utc::now();
        let clock = Arc::new(FixedClock::new(now));
        let window = SaleWindow::new(now - Duration::minutes(10), now + Duration::minutes(10)).unwrap();
        let item = SaleItem::new(SaleItemId::new(1000), "flash phone", window, total).unwrap();
        let store = Arc::new(InMemorySaleStore::with_items([item.clone()]));
        let tokens = TokenIssuer::new("salt", clock.clone());
        let token = tokens.issue(&item.listing()).token.unwrap();
        let executor = PurchaseExecutor::new(store.clone(), tokens, clock.clone());
        (executor, store, clock, token)
    }

    fn remaining(store: &InMemorySaleStore) -> i64 {
        store.get(SaleItemId::new(1000)).unwrap().unwrap().remaining_inventory()
    }

    #[test]
    fn success_decrements_and_records() {
        let (executor, store, clock, token) = setup(2);

        let outcome = executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token);
        let record = outcome.record().unwrap();
        assert_eq!(record.buyer_id, BuyerId::new(1));
        assert_eq!(record.purchased_at, clock.now());
        assert_eq!(remaining(&store), 1);
        assert_eq!(store.purchases_for(SaleItemId::new(1000)), vec![record.clone()]);
    }

    #[test]
    fn invalid_token_touches_nothing() {
        let (executor, store, _, _) = setup(1);

        let outcome = executor.execute(SaleItemId::new(1000), BuyerId::new(1), "forged");
        assert_eq!(outcome, ExecutionOutcome::InvalidToken);
        assert_eq!(remaining(&store), 1);
        assert!(store.purchases_for(SaleItemId::new(1000)).is_empty());
    }

    #[test]
    fn second_purchase_by_same_buyer_is_duplicate() {
        let (executor, store, _, token) = setup(5);

        assert!(executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token).is_success());
        assert_eq!(
            executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token),
            ExecutionOutcome::DuplicatePurchase
        );
        assert_eq!(remaining(&store), 4);
        assert_eq!(store.purchases_for(SaleItemId::new(1000)).len(), 1);
    }

    #[test]
    fn exhausted_item_is_closed_and_leaves_no_record() {
        let (executor, store, _, token) = setup(1);

        assert!(executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token).is_success());
        for buyer in 2..6 {
            assert_eq!(
                executor.execute(SaleItemId::new(1000), BuyerId::new(buyer), &token),
                ExecutionOutcome::SaleClosed
            );
        }
        assert_eq!(remaining(&store), 0);
        assert_eq!(store.purchases_for(SaleItemId::new(1000)).len(), 1);
    }

    #[test]
    fn replayed_token_after_window_is_closed() {
        let (executor, store, clock, token) = setup(3);

        clock.advance(Duration::hours(1));
        assert_eq!(
            executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token),
            ExecutionOutcome::SaleClosed
        );
        assert_eq!(remaining(&store), 3);
        assert!(store.purchases_for(SaleItemId::new(1000)).is_empty());
    }

    #[test]
    fn unknown_item_with_valid_digest_is_closed() {
        let (executor, _, clock, _) = setup(1);
        let token = TokenIssuer::new("salt", clock).issue(&{
            let now = Utc::now();
            let window = SaleWindow::new(now - Duration::days(1), now + Duration::days(1)).unwrap();
            SaleItem::new(SaleItemId::new(404), "ghost", window, 1).unwrap().listing()
        });

        assert_eq!(
            executor.execute(SaleItemId::new(404), BuyerId::new(1), &token.token.unwrap()),
            ExecutionOutcome::SaleClosed
        );
    }

    /// Store whose transactions fail on a chosen step.
    struct FlakyStore {
        inner: InMemorySaleStore,
        fail_on: &'static str,
        rollbacks: AtomicUsize,
    }

    struct FlakyTransaction<'a> {
        inner: Box<dyn PurchaseTransaction + 'a>,
        fail_on: &'static str,
        rollbacks: &'a AtomicUsize,
    }

    impl SaleStore for FlakyStore {
        fn get(&self, id: SaleItemId) -> Result<Option<SaleItem>, StoreError> {
            self.inner.get(id)
        }

        fn list_active(&self, at: DateTime<Utc>, limit: usize) -> Result<Vec<SaleItem>, StoreError> {
            self.inner.list_active(at, limit)
        }

        fn begin(&self) -> Result<Box<dyn PurchaseTransaction + '_>, StoreError> {
            if self.fail_on == "begin" {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            Ok(Box::new(FlakyTransaction {
                inner: self.inner.begin()?,
                fail_on: self.fail_on,
                rollbacks: &self.rollbacks,
            }))
        }
    }

    impl PurchaseTransaction for FlakyTransaction<'_> {
        fn insert_purchase(&mut self, record: &PurchaseRecord) -> Result<InsertOutcome, StoreError> {
            if self.fail_on == "insert" {
                return Err(StoreError::Query("statement timeout".to_string()));
            }
            self.inner.insert_purchase(record)
        }

        fn decrement_inventory(&mut self, id: SaleItemId, at: DateTime<Utc>) -> Result<u64, StoreError> {
            if self.fail_on == "decrement" {
                return Err(StoreError::Query("statement timeout".to_string()));
            }
            self.inner.decrement_inventory(id, at)
        }

        fn commit(self: Box<Self>) -> Result<(), StoreError> {
            if self.fail_on == "commit" {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.commit()
        }

        fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.inner.rollback()
        }
    }

    fn flaky(fail_on: &'static str) -> (PurchaseExecutor<Arc<FlakyStore>>, Arc<FlakyStore>, String) {
        let (_, inner_store, clock, token) = setup(1);
        let item = inner_store.get(SaleItemId::new(1000)).unwrap().unwrap();
        let store = Arc::new(FlakyStore {
            inner: InMemorySaleStore::with_items([item]),
            fail_on,
            rollbacks: AtomicUsize::new(0),
        });
        let executor = PurchaseExecutor::new(store.clone(), TokenIssuer::new("salt", clock.clone()), clock);
        (executor, store, token)
    }

    #[test]
    fn store_failures_surface_as_internal_error_without_partial_state() {
        for step in ["begin", "insert", "decrement", "commit"] {
            let (executor, store, token) = flaky(step);

            let outcome = executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token);
            assert!(
                matches!(outcome, ExecutionOutcome::InternalError { .. }),
                "step {step}: {outcome:?}"
            );
            assert_eq!(store.inner.get(SaleItemId::new(1000)).unwrap().unwrap().remaining_inventory(), 1);
            assert!(store.inner.purchases_for(SaleItemId::new(1000)).is_empty());
        }
    }

    #[test]
    fn duplicate_and_closed_paths_roll_back_explicitly() {
        let (executor, store, token) = flaky("none");

        assert!(executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token).is_success());
        assert_eq!(
            executor.execute(SaleItemId::new(1000), BuyerId::new(1), &token),
            ExecutionOutcome::DuplicatePurchase
        );
        assert_eq!(
            executor.execute(SaleItemId::new(1000), BuyerId::new(2), &token),
            ExecutionOutcome::SaleClosed
        );
        assert_eq!(store.rollbacks.load(Ordering::SeqCst), 2);
    }
}
