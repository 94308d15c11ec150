use std::sync::Arc;

use tracing::{info, warn};

use flashsale_api::bootstrap::{build_facade, run_flash_sale};
use flashsale_core::{Clock, SystemClock};
use flashsale_infra::FlashSaleConfig;

const SIMULATED_BUYERS: i64 = 500;
const RETRY_EVERY: i64 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flashsale_observability::init();

    let config = FlashSaleConfig::from_env()?;
    info!(?config, "starting flash sale");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let facade = Arc::new(build_facade(&config, clock).await?);

    let f = facade.clone();
    let items = tokio::task::spawn_blocking(move || f.list_active()).await??;
    for item in &items {
        info!(
            sale_item_id = %item.id(),
            name = item.name(),
            start = %item.window().start(),
            end = %item.window().end(),
            remaining = item.remaining_inventory(),
            "active sale item"
        );
    }

    let Some(first) = items.first() else {
        warn!("no active sale items");
        return Ok(());
    };

    let summary = run_flash_sale(facade, first.id(), SIMULATED_BUYERS, RETRY_EVERY).await?;
    info!(summary = %serde_json::to_string(&summary)?, "flash sale finished");

    Ok(())
}
