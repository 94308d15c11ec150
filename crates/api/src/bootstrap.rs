//! Process wiring: build a `SaleFacade` from configuration and drive a flash
//! sale with simulated buyers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use tracing::info;

use flashsale_core::{BuyerId, Clock, DomainResult, SaleItemId};
use flashsale_infra::cache::RedisItemCache;
use flashsale_infra::{FlashSaleConfig, InMemoryItemCache, InMemorySaleStore, ItemCache, PostgresSaleStore, SaleStore};
use flashsale_sales::{SaleItem, SaleWindow};

use crate::facade::SaleFacade;

/// Facade over type-erased store and cache backends.
pub type DynSaleFacade = SaleFacade<Arc<dyn SaleStore>, Arc<dyn ItemCache>>;

/// Build the facade selected by `config`: Postgres when `DATABASE_URL` is
/// set (otherwise a seeded in-memory store), Redis when `REDIS_URL` is set
/// (otherwise an in-memory cache).
pub async fn build_facade(config: &FlashSaleConfig, clock: Arc<dyn Clock>) -> anyhow::Result<DynSaleFacade> {
    let store: Arc<dyn SaleStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            let store = PostgresSaleStore::new(pool);
            store.ensure_schema().await?;
            info!("using postgres sale store");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set; using seeded in-memory sale store");
            Arc::new(InMemorySaleStore::with_items(demo_items(clock.now())?))
        }
    };

    let cache: Arc<dyn ItemCache> = match &config.redis_url {
        Some(url) => {
            info!(ttl_secs = config.cache_ttl_secs, "using redis item cache");
            Arc::new(RedisItemCache::new(url, config.cache_ttl_secs)?)
        }
        None => Arc::new(InMemoryItemCache::new()),
    };

    Ok(SaleFacade::new(store, cache, config.token_salt.clone(), clock).with_list_limit(config.list_limit))
}

/// Sample catalog: one sale open now, the others opening later.
pub fn demo_items(now: DateTime<Utc>) -> DomainResult<Vec<SaleItem>> {
    let specs = [
        (1000, "1000 off iPhone flash deal", 100, Duration::hours(-1)),
        (1001, "800 off iPad flash deal", 200, Duration::hours(1)),
        (1002, "6600 off Mac flash deal", 300, Duration::hours(2)),
        (1003, "7000 off iMac flash deal", 400, Duration::hours(3)),
    ];

    specs
        .into_iter()
        .map(|(id, name, total, opens_in)| {
            let start = now + opens_in;
            let window = SaleWindow::new(start, start + Duration::hours(2))?;
            SaleItem::new(SaleItemId::new(id), name, window, total)
        })
        .collect()
}

/// Tally of one simulated flash sale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlashSaleSummary {
    pub sale_item_id: Option<SaleItemId>,
    pub attempts: usize,
    /// Attempt count per outcome description.
    pub outcomes: BTreeMap<&'static str, usize>,
    pub remaining_inventory: Option<i64>,
}

impl FlashSaleSummary {
    pub fn count(&self, state_info: &str) -> usize {
        self.outcomes.get(state_info).copied().unwrap_or(0)
    }
}

/// Request a token for `sale_item_id`, then let `buyers` distinct buyers
/// race for it. Every `retry_every`-th buyer tries a second time.
///
/// Store calls are synchronous, so each attempt runs on the blocking pool.
pub async fn run_flash_sale(
    facade: Arc<DynSaleFacade>,
    sale_item_id: SaleItemId,
    buyers: i64,
    retry_every: i64,
) -> anyhow::Result<FlashSaleSummary> {
    let mut summary = FlashSaleSummary {
        sale_item_id: Some(sale_item_id),
        ..FlashSaleSummary::default()
    };

    let f = facade.clone();
    let exposure = tokio::task::spawn_blocking(move || f.request_token(sale_item_id)).await??;
    let Some(token) = exposure.token.clone() else {
        info!(exposure = %serde_json::to_string(&exposure)?, "sale not open; no purchases attempted");
        return Ok(summary);
    };

    let mut tasks = JoinSet::new();
    for n in 0..buyers {
        let buyer_id = BuyerId::new(13_800_000_000 + n);
        let attempts = if retry_every > 0 && n % retry_every == 0 { 2 } else { 1 };
        for _ in 0..attempts {
            let facade = facade.clone();
            let token = token.clone();
            tasks.spawn_blocking(move || facade.purchase(sale_item_id, buyer_id, &token));
        }
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined?;
        summary.attempts += 1;
        *summary.outcomes.entry(outcome.state_info()).or_default() += 1;
    }

    let f = facade.clone();
    summary.remaining_inventory = tokio::task::spawn_blocking(move || f.get_by_id(sale_item_id))
        .await??
        .map(|item| item.remaining_inventory());

    Ok(summary)
}
