use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use flashsale_core::{BuyerId, SaleItemId};
use flashsale_sales::{PurchaseRecord, SaleItem};

use super::r#trait::{InsertOutcome, PurchaseTransaction, SaleStore, StoreError};

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<SaleItemId, SaleItem>,
    purchases: HashMap<(SaleItemId, BuyerId), PurchaseRecord>,
}

/// In-memory sale store.
///
/// Intended for tests/dev. A transaction holds the store's mutex for its whole
/// lifetime, which stands in for the row lock a SQL store takes on the guarded
/// update: concurrent purchases serialize, nothing else is shared.
#[derive(Debug, Default)]
pub struct InMemorySaleStore {
    state: Mutex<State>,
}

impl InMemorySaleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = SaleItem>) -> Self {
        let store = Self::new();
        for item in items {
            store.seed_item(item);
        }
        store
    }

    /// Insert or replace an item (seeding happens outside the admission path).
    pub fn seed_item(&self, item: SaleItem) {
        if let Ok(mut state) = self.state.lock() {
            state.items.insert(item.id(), item);
        }
    }

    pub fn purchases_for(&self, sale_item_id: SaleItemId) -> Vec<PurchaseRecord> {
        let Ok(state) = self.state.lock() else {
            return vec![];
        };
        let mut records: Vec<PurchaseRecord> = state
            .purchases
            .values()
            .filter(|r| r.sale_item_id == sale_item_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.purchased_at, r.buyer_id));
        records
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl SaleStore for InMemorySaleStore {
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleItem>, StoreError> {
        Ok(self.lock()?.items.get(&sale_item_id).cloned())
    }

    fn list_active(&self, at: DateTime<Utc>, limit: usize) -> Result<Vec<SaleItem>, StoreError> {
        let state = self.lock()?;
        let mut items: Vec<SaleItem> = state
            .items
            .values()
            .filter(|item| !item.window().has_ended(at))
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.window().start(), item.id()));
        items.truncate(limit);
        Ok(items)
    }

    fn begin(&self) -> Result<Box<dyn PurchaseTransaction + '_>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            state: self.lock()?,
            staged_items: HashMap::new(),
            staged_purchases: Vec::new(),
        }))
    }
}

/// Staged changes over a locked store; applied only on commit.
struct InMemoryTransaction<'a> {
    state: MutexGuard<'a, State>,
    staged_items: HashMap<SaleItemId, SaleItem>,
    staged_purchases: Vec<PurchaseRecord>,
}

impl PurchaseTransaction for InMemoryTransaction<'_> {
    fn insert_purchase(&mut self, record: &PurchaseRecord) -> Result<InsertOutcome, StoreError> {
        let key = record.key();
        let exists = self.state.purchases.contains_key(&key)
            || self.staged_purchases.iter().any(|r| r.key() == key);
        if exists {
            return Ok(InsertOutcome::AlreadyExists);
        }
        self.staged_purchases.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn decrement_inventory(&mut self, sale_item_id: SaleItemId, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut item = match self.staged_items.get(&sale_item_id) {
            Some(staged) => staged.clone(),
            None => match self.state.items.get(&sale_item_id) {
                Some(item) => item.clone(),
                None => return Ok(0),
            },
        };

        if !item.try_decrement_at(at) {
            return Ok(0);
        }
        self.staged_items.insert(sale_item_id, item);
        Ok(1)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            mut state,
            staged_items,
            staged_purchases,
        } = *self;

        for (id, item) in staged_items {
            state.items.insert(id, item);
        }
        for record in staged_purchases {
            state.purchases.insert(record.key(), record);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flashsale_sales::SaleWindow;

    fn open_item(id: i64, total: i64) -> SaleItem {
        let now = Utc::now();
        let window = SaleWindow::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap();
        SaleItem::new(SaleItemId::new(id), format!("item-{id}"), window, total).unwrap()
    }

    fn record(item: i64, buyer: i64) -> PurchaseRecord {
        PurchaseRecord::new(SaleItemId::new(item), BuyerId::new(buyer), Utc::now())
    }

    #[test]
    fn committed_changes_are_visible() {
        let store = InMemorySaleStore::with_items([open_item(1, 2)]);

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.insert_purchase(&record(1, 10)).unwrap(), InsertOutcome::Inserted);
        assert_eq!(tx.decrement_inventory(SaleItemId::new(1), Utc::now()).unwrap(), 1);
        tx.commit().unwrap();

        assert_eq!(store.get(SaleItemId::new(1)).unwrap().unwrap().remaining_inventory(), 1);
        assert_eq!(store.purchases_for(SaleItemId::new(1)).len(), 1);
    }

    #[test]
    fn rollback_discards_insert_and_decrement() {
        let store = InMemorySaleStore::with_items([open_item(1, 2)]);

        let mut tx = store.begin().unwrap();
        tx.insert_purchase(&record(1, 10)).unwrap();
        tx.decrement_inventory(SaleItemId::new(1), Utc::now()).unwrap();
        tx.rollback().unwrap();

        assert_eq!(store.get(SaleItemId::new(1)).unwrap().unwrap().remaining_inventory(), 2);
        assert!(store.purchases_for(SaleItemId::new(1)).is_empty());
    }

    #[test]
    fn dropping_uncommitted_transaction_rolls_back() {
        let store = InMemorySaleStore::with_items([open_item(1, 1)]);
        {
            let mut tx = store.begin().unwrap();
            tx.insert_purchase(&record(1, 10)).unwrap();
        }
        assert!(store.purchases_for(SaleItemId::new(1)).is_empty());
    }

    #[test]
    fn uniqueness_spans_committed_and_staged_records() {
        let store = InMemorySaleStore::with_items([open_item(1, 5)]);

        let mut tx = store.begin().unwrap();
        tx.insert_purchase(&record(1, 10)).unwrap();
        assert_eq!(tx.insert_purchase(&record(1, 10)).unwrap(), InsertOutcome::AlreadyExists);
        tx.decrement_inventory(SaleItemId::new(1), Utc::now()).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.insert_purchase(&record(1, 10)).unwrap(), InsertOutcome::AlreadyExists);
        assert_eq!(tx.insert_purchase(&record(1, 11)).unwrap(), InsertOutcome::Inserted);
    }

    #[test]
    fn guarded_decrement_affects_zero_rows_when_exhausted_or_closed() {
        let store = InMemorySaleStore::with_items([open_item(1, 1)]);
        let now = Utc::now();

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.decrement_inventory(SaleItemId::new(1), now + Duration::hours(2)).unwrap(), 0);
        assert_eq!(tx.decrement_inventory(SaleItemId::new(1), now).unwrap(), 1);
        assert_eq!(tx.decrement_inventory(SaleItemId::new(1), now).unwrap(), 0);
        assert_eq!(tx.decrement_inventory(SaleItemId::new(404), now).unwrap(), 0);
    }

    #[test]
    fn list_active_skips_ended_items_and_respects_limit() {
        let now = Utc::now();
        let ended = SaleItem::new(
            SaleItemId::new(9),
            "ended",
            SaleWindow::new(now - Duration::hours(3), now - Duration::hours(2)).unwrap(),
            1,
        )
        .unwrap();
        let store = InMemorySaleStore::with_items([open_item(1, 1), open_item(2, 1), open_item(3, 1), ended]);

        let active = store.list_active(now, 10).unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|i| i.id() != SaleItemId::new(9)));

        assert_eq!(store.list_active(now, 2).unwrap().len(), 2);
    }
}
