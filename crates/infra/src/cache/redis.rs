//! Redis-backed item cache (optional).
//!
//! Listings are stored as JSON strings under `sale_item:{id}` with a TTL set on
//! every write, so Redis owns expiry.

use redis::Commands;

use flashsale_core::SaleItemId;
use flashsale_sales::SaleListing;

use super::{CacheError, ItemCache};

#[derive(Debug, Clone)]
pub struct RedisItemCache {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisItemCache {
    pub fn new(redis_url: impl AsRef<str>, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { client, ttl_secs })
    }

    fn key(sale_item_id: SaleItemId) -> String {
        format!("sale_item:{sale_item_id}")
    }

    fn connection(&self) -> Result<redis::Connection, CacheError> {
        self.client
            .get_connection()
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}

impl ItemCache for RedisItemCache {
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleListing>, CacheError> {
        let mut conn = self.connection()?;
        let payload: Option<String> = conn
            .get(Self::key(sale_item_id))
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(|e| CacheError::Serialize(e.to_string())))
            .transpose()
    }

    fn put(&self, listing: &SaleListing) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(listing).map_err(|e| CacheError::Serialize(e.to_string()))?;

        let mut conn = self.connection()?;
        redis::cmd("SETEX")
            .arg(Self::key(listing.id))
            .arg(self.ttl_secs)
            .arg(payload)
            .query::<()>(&mut conn)
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}
