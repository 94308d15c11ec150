use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flashsale_core::{BuyerId, DomainError, DomainResult, SaleItemId};

/// Closed interval `[start, end]` during which an item may be sold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SaleWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if end < start {
            return Err(DomainError::validation(format!(
                "sale window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn has_ended(&self, at: DateTime<Utc>) -> bool {
        at > self.end
    }
}

/// One flash-sale product with a fixed inventory and a sale window.
///
/// `remaining` is only ever changed by the store's conditional decrement; a
/// `SaleItem` held in memory is a snapshot and must not be used to decide
/// whether a purchase can proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    id: SaleItemId,
    name: String,
    window: SaleWindow,
    total_inventory: i64,
    remaining_inventory: i64,
    created_at: DateTime<Utc>,
}

impl SaleItem {
    /// Create a freshly seeded item (`remaining == total`).
    pub fn new(
        id: SaleItemId,
        name: impl Into<String>,
        window: SaleWindow,
        total_inventory: i64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if total_inventory < 0 {
            return Err(DomainError::validation("total inventory cannot be negative"));
        }
        Ok(Self {
            id,
            name,
            window,
            total_inventory,
            remaining_inventory: total_inventory,
            created_at: Utc::now(),
        })
    }

    /// Rebuild a snapshot with a known remaining count (e.g. from a store row).
    pub fn with_remaining(mut self, remaining_inventory: i64) -> DomainResult<Self> {
        if remaining_inventory < 0 || remaining_inventory > self.total_inventory {
            return Err(DomainError::invariant(format!(
                "remaining inventory {remaining_inventory} outside 0..={}",
                self.total_inventory
            )));
        }
        self.remaining_inventory = remaining_inventory;
        Ok(self)
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> SaleItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> SaleWindow {
        self.window
    }

    pub fn total_inventory(&self) -> i64 {
        self.total_inventory
    }

    pub fn remaining_inventory(&self) -> i64 {
        self.remaining_inventory
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn listing(&self) -> SaleListing {
        SaleListing {
            id: self.id,
            name: self.name.clone(),
            window: self.window,
        }
    }

    /// Whether the guarded decrement would succeed against this snapshot at `at`.
    pub fn can_decrement_at(&self, at: DateTime<Utc>) -> bool {
        self.remaining_inventory > 0 && self.window.contains(at)
    }

    /// Apply one guarded decrement. Returns `false` (and leaves the item
    /// untouched) when sold out or outside the window.
    ///
    /// Only store adapters call this, while holding their own lock.
    pub fn try_decrement_at(&mut self, at: DateTime<Utc>) -> bool {
        if !self.can_decrement_at(at) {
            return false;
        }
        self.remaining_inventory -= 1;
        true
    }
}

/// Descriptive part of a `SaleItem`: what is for sale and when.
///
/// Carries no inventory counts, so it is the only form of an item that may be
/// cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleListing {
    pub id: SaleItemId,
    pub name: String,
    pub window: SaleWindow,
}

impl From<&SaleItem> for SaleListing {
    fn from(item: &SaleItem) -> Self {
        item.listing()
    }
}

/// Proof that a buyer was admitted for one unit of an item.
///
/// At most one record exists per `(sale_item_id, buyer_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub sale_item_id: SaleItemId,
    pub buyer_id: BuyerId,
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub fn new(sale_item_id: SaleItemId, buyer_id: BuyerId, purchased_at: DateTime<Utc>) -> Self {
        Self {
            sale_item_id,
            buyer_id,
            purchased_at,
        }
    }

    pub fn key(&self) -> (SaleItemId, BuyerId) {
        (self.sale_item_id, self.buyer_id)
    }
}
