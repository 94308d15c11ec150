//! Sale-item metadata cache.
//!
//! Entries are `SaleListing`s: name and sale window only. Inventory counts
//! never enter the cache. Expiry belongs to the backend (e.g. Redis `SETEX`).

pub mod catalog;
#[cfg(feature = "redis")]
pub mod redis;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use flashsale_core::SaleItemId;
use flashsale_sales::SaleListing;

pub use catalog::CatalogCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisItemCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialize(String),
}

/// Narrow key/value interface over the cache backend.
pub trait ItemCache: Send + Sync {
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleListing>, CacheError>;
    fn put(&self, listing: &SaleListing) -> Result<(), CacheError>;
}

impl<C> ItemCache for Arc<C>
where
    C: ItemCache + ?Sized,
{
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleListing>, CacheError> {
        (**self).get(sale_item_id)
    }

    fn put(&self, listing: &SaleListing) -> Result<(), CacheError> {
        (**self).put(listing)
    }
}

/// In-memory listing cache for tests/dev. Entries never expire.
#[derive(Debug, Default)]
pub struct InMemoryItemCache {
    inner: RwLock<HashMap<SaleItemId, SaleListing>>,
}

impl InMemoryItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemCache for InMemoryItemCache {
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleListing>, CacheError> {
        let map = self
            .inner
            .read()
            .map_err(|_| CacheError::Backend("lock poisoned".to_string()))?;
        Ok(map.get(&sale_item_id).cloned())
    }

    fn put(&self, listing: &SaleListing) -> Result<(), CacheError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| CacheError::Backend("lock poisoned".to_string()))?;
        map.insert(listing.id, listing.clone());
        Ok(())
    }
}
