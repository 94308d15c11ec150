//! Postgres-backed sale store implementation.
//!
//! Inventory and purchase records live in two tables:
//!
//! - `sale_item`: one row per item, `remaining_inventory` guarded by a CHECK
//!   constraint `0 <= remaining_inventory <= total_inventory`.
//! - `purchase_record`: primary key `(sale_item_id, buyer_id)`, which is the
//!   uniqueness constraint that rejects a second purchase by the same buyer.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Constraint` (the expected duplicate is handled by `ON CONFLICT DO NOTHING`) |
//! | Database (check constraint violation) | `23514` | `Constraint` |
//! | Database (other) | Any other | `Query` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Query` |
//!
//! Query failures are returned, not logged; the caller that handles the
//! `StoreError` logs it once.
//!
//! ## Thread Safety
//!
//! `PostgresSaleStore` is `Send + Sync` and can be shared across threads.
//! The `SaleStore` trait is synchronous; its methods drive the async pool with
//! `tokio::runtime::Handle::block_on`, so they must be called from a thread
//! that has a runtime handle but is not an async worker (e.g. inside
//! `tokio::task::spawn_blocking`).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::instrument;

use flashsale_core::SaleItemId;
use flashsale_sales::{PurchaseRecord, SaleItem, SaleWindow};

use super::r#trait::{InsertOutcome, PurchaseTransaction, SaleStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sale_item (
    sale_item_id        BIGINT PRIMARY KEY,
    name                TEXT NOT NULL,
    total_inventory     BIGINT NOT NULL,
    remaining_inventory BIGINT NOT NULL,
    start_time          TIMESTAMPTZ NOT NULL,
    end_time            TIMESTAMPTZ NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (remaining_inventory >= 0 AND remaining_inventory <= total_inventory),
    CHECK (start_time <= end_time)
);

CREATE INDEX IF NOT EXISTS idx_sale_item_start_time ON sale_item (start_time);
CREATE INDEX IF NOT EXISTS idx_sale_item_end_time ON sale_item (end_time);

CREATE TABLE IF NOT EXISTS purchase_record (
    sale_item_id BIGINT NOT NULL REFERENCES sale_item (sale_item_id),
    buyer_id     BIGINT NOT NULL,
    purchased_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (sale_item_id, buyer_id)
);
"#;

/// Postgres-backed sale store.
#[derive(Debug, Clone)]
pub struct PostgresSaleStore {
    pool: Arc<PgPool>,
}

impl PostgresSaleStore {
    /// Create a new PostgresSaleStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Insert or replace an item. Used by operators and tests to seed a sale;
    /// never called on the admission path.
    #[instrument(skip(self, item), fields(sale_item_id = %item.id()))]
    pub async fn seed_item(&self, item: &SaleItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sale_item (
                sale_item_id,
                name,
                total_inventory,
                remaining_inventory,
                start_time,
                end_time,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (sale_item_id)
            DO UPDATE SET
                name = EXCLUDED.name,
                total_inventory = EXCLUDED.total_inventory,
                remaining_inventory = EXCLUDED.remaining_inventory,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time
            "#,
        )
        .bind(item.id().get())
        .bind(item.name())
        .bind(item.total_inventory())
        .bind(item.remaining_inventory())
        .bind(item.window().start())
        .bind(item.window().end())
        .bind(item.created_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(sale_item_id = %sale_item_id))]
    pub async fn load_item(&self, sale_item_id: SaleItemId) -> Result<Option<SaleItem>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                sale_item_id,
                name,
                total_inventory,
                remaining_inventory,
                start_time,
                end_time,
                created_at
            FROM sale_item
            WHERE sale_item_id = $1
            "#,
        )
        .bind(sale_item_id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_item", e))?;

        row.as_ref().map(sale_item_from_row).transpose()
    }

    #[instrument(skip(self))]
    pub async fn load_active(&self, at: DateTime<Utc>, limit: usize) -> Result<Vec<SaleItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                sale_item_id,
                name,
                total_inventory,
                remaining_inventory,
                start_time,
                end_time,
                created_at
            FROM sale_item
            WHERE end_time >= $1
            ORDER BY start_time ASC, sale_item_id ASC
            LIMIT $2
            "#,
        )
        .bind(at)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_active", e))?;

        rows.iter().map(sale_item_from_row).collect()
    }

    pub async fn purchases_for(&self, sale_item_id: SaleItemId) -> Result<Vec<PurchaseRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sale_item_id, buyer_id, purchased_at
            FROM purchase_record
            WHERE sale_item_id = $1
            ORDER BY purchased_at ASC, buyer_id ASC
            "#,
        )
        .bind(sale_item_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("purchases_for", e))?;

        rows.iter()
            .map(|row| {
                Ok(PurchaseRecord::new(
                    SaleItemId::new(row.try_get("sale_item_id").map_err(decode_error)?),
                    row.try_get::<i64, _>("buyer_id").map_err(decode_error)?.into(),
                    row.try_get("purchased_at").map_err(decode_error)?,
                ))
            })
            .collect()
    }
}

fn current_handle() -> Result<Handle, StoreError> {
    Handle::try_current().map_err(|_| {
        StoreError::Unavailable(
            "PostgresSaleStore requires a tokio runtime; call it from spawn_blocking or a runtime-backed thread"
                .to_string(),
        )
    })
}

impl SaleStore for PostgresSaleStore {
    fn get(&self, sale_item_id: SaleItemId) -> Result<Option<SaleItem>, StoreError> {
        current_handle()?.block_on(self.load_item(sale_item_id))
    }

    fn list_active(&self, at: DateTime<Utc>, limit: usize) -> Result<Vec<SaleItem>, StoreError> {
        current_handle()?.block_on(self.load_active(at, limit))
    }

    fn begin(&self) -> Result<Box<dyn PurchaseTransaction + '_>, StoreError> {
        let handle = current_handle()?;
        let tx = handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresPurchaseTransaction { tx, handle }))
    }
}

/// A purchase transaction on one pooled connection.
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
struct PostgresPurchaseTransaction {
    tx: Transaction<'static, Postgres>,
    handle: Handle,
}

impl PurchaseTransaction for PostgresPurchaseTransaction {
    fn insert_purchase(&mut self, record: &PurchaseRecord) -> Result<InsertOutcome, StoreError> {
        let result = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO purchase_record (sale_item_id, buyer_id, purchased_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (sale_item_id, buyer_id) DO NOTHING
                    "#,
                )
                .bind(record.sale_item_id.get())
                .bind(record.buyer_id.get())
                .bind(record.purchased_at)
                .execute(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("insert_purchase", e))?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    fn decrement_inventory(&mut self, sale_item_id: SaleItemId, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    UPDATE sale_item
                    SET remaining_inventory = remaining_inventory - 1
                    WHERE sale_item_id = $1
                        AND remaining_inventory > 0
                        AND start_time <= $2
                        AND end_time >= $2
                    "#,
                )
                .bind(sale_item_id.get())
                .bind(at)
                .execute(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("decrement_inventory", e))?;

        Ok(result.rows_affected())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PostgresPurchaseTransaction { tx, handle } = *self;
        handle
            .block_on(tx.commit())
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PostgresPurchaseTransaction { tx, handle } = *self;
        handle
            .block_on(tx.rollback())
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn sale_item_from_row(row: &sqlx::postgres::PgRow) -> Result<SaleItem, StoreError> {
    let id: i64 = row.try_get("sale_item_id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let total: i64 = row.try_get("total_inventory").map_err(decode_error)?;
    let remaining: i64 = row.try_get("remaining_inventory").map_err(decode_error)?;
    let start: DateTime<Utc> = row.try_get("start_time").map_err(decode_error)?;
    let end: DateTime<Utc> = row.try_get("end_time").map_err(decode_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error)?;

    let window = SaleWindow::new(start, end).map_err(|e| StoreError::Decode(e.to_string()))?;
    SaleItem::new(SaleItemId::new(id), name, window, total)
        .and_then(|item| item.with_remaining(remaining))
        .map(|item| item.with_created_at(created_at))
        .map_err(|e| StoreError::Decode(format!("sale_item {id}: {e}")))
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") | Some("23503") => StoreError::Constraint(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        _ => StoreError::Query(format!("sqlx error in {}: {}", operation, err)),
    }
}
