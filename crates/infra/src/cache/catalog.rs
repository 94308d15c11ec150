use tracing::{debug, warn};

use flashsale_core::SaleItemId;
use flashsale_sales::SaleListing;

use super::ItemCache;
use crate::store::{SaleStore, StoreError};

/// Cache-aside read-through for sale listings.
///
/// Hits are served from the cache; misses read the store and populate the
/// cache only when the item exists. Cache failures degrade to a store read.
/// Only the listing is returned, so callers cannot act on a cached count.
#[derive(Debug)]
pub struct CatalogCache<S, C> {
    store: S,
    cache: C,
}

impl<S, C> CatalogCache<S, C>
where
    S: SaleStore,
    C: ItemCache,
{
    pub fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }

    pub fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleListing>, StoreError> {
        match self.cache.get(sale_item_id) {
            Ok(Some(listing)) => return Ok(Some(listing)),
            Ok(None) => debug!(%sale_item_id, "catalog cache miss"),
            Err(e) => warn!(%sale_item_id, error = %e, "catalog cache read failed; falling back to store"),
        }

        let Some(item) = self.store.get(sale_item_id)? else {
            return Ok(None);
        };

        let listing = item.listing();
        if let Err(e) = self.cache.put(&listing) {
            warn!(%sale_item_id, error = %e, "catalog cache write failed");
        }
        Ok(Some(listing))
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
