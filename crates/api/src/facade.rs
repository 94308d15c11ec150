//! Caller-facing flash-sale operations.
//!
//! `SaleFacade` only wires components together: metadata reads go through the
//! catalog cache, token requests through the token issuer, purchases through
//! the executor. Store failures on read paths are logged once here and
//! surfaced as `FacadeError::Internal`.

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use flashsale_core::{BuyerId, Clock, SaleItemId};
use flashsale_infra::{CatalogCache, ItemCache, PurchaseExecutor, SaleStore, StoreError};
use flashsale_sales::{ExecutionOutcome, ExposureToken, SaleItem, TokenIssuer};

const DEFAULT_LIST_LIMIT: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FacadeError {
    #[error("internal error: {0}")]
    Internal(String),
}

impl FacadeError {
    fn from_store(operation: &'static str, err: StoreError) -> Self {
        error!(operation, error = %err, "sale store failure");
        FacadeError::Internal(err.to_string())
    }
}

pub struct SaleFacade<S, C> {
    catalog: CatalogCache<S, C>,
    executor: PurchaseExecutor<S>,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
    list_limit: usize,
}

impl<S, C> SaleFacade<S, C>
where
    S: SaleStore + Clone,
    C: ItemCache,
{
    pub fn new(store: S, cache: C, token_salt: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let tokens = TokenIssuer::new(token_salt, clock.clone());
        Self {
            catalog: CatalogCache::new(store.clone(), cache),
            executor: PurchaseExecutor::new(store, tokens.clone(), clock.clone()),
            tokens,
            clock,
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }

    pub fn with_list_limit(mut self, list_limit: usize) -> Self {
        self.list_limit = list_limit;
        self
    }

    /// Items whose sale window has not ended yet, earliest start first.
    pub fn list_active(&self) -> Result<Vec<SaleItem>, FacadeError> {
        self.catalog
            .store()
            .list_active(self.clock.now(), self.list_limit)
            .map_err(|e| FacadeError::from_store("list_active", e))
    }

    /// Authoritative snapshot of one item, including its remaining inventory.
    pub fn get_by_id(&self, sale_item_id: SaleItemId) -> Result<Option<SaleItem>, FacadeError> {
        self.catalog
            .store()
            .get(sale_item_id)
            .map_err(|e| FacadeError::from_store("get_by_id", e))
    }

    pub fn request_token(&self, sale_item_id: SaleItemId) -> Result<ExposureToken, FacadeError> {
        let listing = self
            .catalog
            .get(sale_item_id)
            .map_err(|e| FacadeError::from_store("request_token", e))?;

        Ok(match listing {
            Some(listing) => self.tokens.issue(&listing),
            None => ExposureToken::unknown_item(sale_item_id),
        })
    }

    pub fn purchase(&self, sale_item_id: SaleItemId, buyer_id: BuyerId, token: &str) -> ExecutionOutcome {
        self.executor.execute(sale_item_id, buyer_id, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Duration, Utc};
    use flashsale_core::FixedClock;
    use flashsale_infra::store::PurchaseTransaction;
    use flashsale_infra::{InMemoryItemCache, InMemorySaleStore};
    use flashsale_sales::SaleWindow;

    struct DownStore;

    impl SaleStore for DownStore {
        fn get(&self, _: SaleItemId) -> Result<Option<SaleItem>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn list_active(&self, _: DateTime<Utc>, _: usize) -> Result<Vec<SaleItem>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn begin(&self) -> Result<Box<dyn PurchaseTransaction + '_>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn open_item(now: DateTime<Utc>) -> SaleItem {
        let window = SaleWindow::new(now - Duration::minutes(1), now + Duration::minutes(1)).unwrap();
        SaleItem::new(SaleItemId::new(1000), "console", window, 1).unwrap()
    }

    #[test]
    fn unknown_item_yields_unavailable_token_without_times() {
        let store = Arc::new(InMemorySaleStore::new());
        let facade = SaleFacade::new(store, Arc::new(InMemoryItemCache::new()), "salt", Arc::new(FixedClock::new(Utc::now())));

        let exposure = facade.request_token(SaleItemId::new(1)).unwrap();
        assert_eq!(exposure, ExposureToken::unknown_item(SaleItemId::new(1)));
    }

    #[test]
    fn request_token_populates_cache() {
        let now = Utc::now();
        let store = Arc::new(InMemorySaleStore::with_items([open_item(now)]));
        let cache = Arc::new(InMemoryItemCache::new());
        let facade = SaleFacade::new(store, cache.clone(), "salt", Arc::new(FixedClock::new(now)));

        assert!(facade.request_token(SaleItemId::new(1000)).unwrap().available);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn store_outage_is_normalised() {
        let store = Arc::new(DownStore);
        let facade = SaleFacade::new(store, Arc::new(InMemoryItemCache::new()), "salt", Arc::new(FixedClock::new(Utc::now())));

        assert!(matches!(facade.list_active(), Err(FacadeError::Internal(_))));
        assert!(matches!(facade.get_by_id(SaleItemId::new(1)), Err(FacadeError::Internal(_))));
        assert!(matches!(facade.request_token(SaleItemId::new(1)), Err(FacadeError::Internal(_))));
    }

    #[test]
    fn purchase_during_outage_is_internal_error() {
        let now = Utc::now();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let token = TokenIssuer::new("salt", clock.clone()).issue(&open_item(now).listing()).token.unwrap();
        let facade = SaleFacade::new(Arc::new(DownStore), Arc::new(InMemoryItemCache::new()), "salt", clock);

        let outcome = facade.purchase(SaleItemId::new(1000), BuyerId::new(1), &token);
        assert!(matches!(outcome, ExecutionOutcome::InternalError { .. }));
    }

    #[test]
    fn list_limit_is_applied() {
        let now = Utc::now();
        let items = (0..6).map(|i| {
            let window = SaleWindow::new(now + Duration::minutes(i), now + Duration::hours(1)).unwrap();
            SaleItem::new(SaleItemId::new(1000 + i), format!("item {i}"), window, 1).unwrap()
        });
        let store = Arc::new(InMemorySaleStore::with_items(items));
        let facade = SaleFacade::new(store, Arc::new(InMemoryItemCache::new()), "salt", Arc::new(FixedClock::new(now)));

        assert_eq!(facade.list_active().unwrap().len(), DEFAULT_LIST_LIMIT);
        let facade = facade.with_list_limit(10);
        let ids: Vec<i64> = facade.list_active().unwrap().iter().map(|i| i.id().get()).collect();
        assert_eq!(ids, vec![1000, 1001, 1002, 1003, 1004, 1005]);
    }
}
