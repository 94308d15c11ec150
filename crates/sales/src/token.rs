//! Purchase-authorization ("exposure") tokens.
//!
//! A token proves the caller discovered the purchase endpoint of an item while
//! its sale window was open. Tokens are derived, never stored: the value is a
//! SHA-256 digest of the item id and a process-wide secret salt, so any
//! instance holding the same salt can verify any token.
//!
//! Only *issuance* is gated on the sale window. Verification is time-independent,
//! so a token captured during the window keeps verifying afterwards; the store's
//! guarded decrement is what rejects late purchases.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use flashsale_core::{Clock, SaleItemId};

use crate::item::SaleListing;

const SEPARATOR: &str = "/";

/// Result of asking for a purchase token.
///
/// When `available` is false the time fields explain why (server time outside
/// `[window_start, window_end]`); they are all `None` for an unknown item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureToken {
    pub sale_item_id: SaleItemId,
    pub available: bool,
    pub token: Option<String>,
    pub server_time: Option<DateTime<Utc>>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

impl ExposureToken {
    pub fn available(sale_item_id: SaleItemId, token: String) -> Self {
        Self {
            sale_item_id,
            available: true,
            token: Some(token),
            server_time: None,
            window_start: None,
            window_end: None,
        }
    }

    pub fn outside_window(
        sale_item_id: SaleItemId,
        server_time: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self {
            sale_item_id,
            available: false,
            token: None,
            server_time: Some(server_time),
            window_start: Some(window_start),
            window_end: Some(window_end),
        }
    }

    pub fn unknown_item(sale_item_id: SaleItemId) -> Self {
        Self {
            sale_item_id,
            available: false,
            token: None,
            server_time: None,
            window_start: None,
            window_end: None,
        }
    }
}

/// Stateless issuer/verifier of exposure tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    salt: String,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("salt", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(salt: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            salt: salt.into(),
            clock,
        }
    }

    /// Issue a token for `listing` if its sale window contains the current time.
    pub fn issue(&self, listing: &SaleListing) -> ExposureToken {
        let server_time = self.clock.now();
        let window = listing.window;
        if !window.contains(server_time) {
            return ExposureToken::outside_window(listing.id, server_time, window.start(), window.end());
        }
        ExposureToken::available(listing.id, self.digest(listing.id))
    }

    /// Exact comparison against the digest for `sale_item_id`.
    pub fn verify(&self, sale_item_id: SaleItemId, candidate: &str) -> bool {
        !candidate.is_empty() && candidate == self.digest(sale_item_id)
    }

    fn digest(&self, sale_item_id: SaleItemId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sale_item_id.to_string().as_bytes());
        hasher.update(SEPARATOR.as_bytes());
        hasher.update(self.salt.as_bytes());
        hex::encode(hasher.finalize())
    }
}
