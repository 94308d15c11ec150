//! Infrastructure layer: durable store, item cache, purchase admission, config.

pub mod cache;
pub mod config;
pub mod executor;
pub mod store;


pub use cache::{CacheError, CatalogCache, InMemoryItemCache, ItemCache};
pub use config::{ConfigError, FlashSaleConfig};
pub use executor::PurchaseExecutor;
pub use store::{InMemorySaleStore, PostgresSaleStore, SaleStore, StoreError};
