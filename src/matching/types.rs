use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Fixed-point projection of an `f64` price used only as a total-order key
/// inside the book's `BTreeMap`s. Scaled by 1e8 and truncated, mirroring
/// the reference backend's `PriceLevel` technique; this never reaches a
/// client — clients only ever see the `f64` price (§B.1 of SPEC_FULL.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceLevel(i64);

const SCALE: f64 = 1e8;

impl PriceLevel {
    pub fn from_price(price: f64) -> Self {
        Self((price * SCALE).trunc() as i64)
    }

    pub fn to_price(self) -> f64 {
        self.0 as f64 / SCALE
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }
}

/// A resting LIMIT order's residual, keyed by `(price, enqueuedAt)` for
/// strict FIFO within a price level (§3 OrderBook entry, §4.4.5).
#[derive(Debug, Clone)]
pub struct OrderEntry {
    pub cl_ord_id: String,
    pub team_name: String,
    pub price: f64,
    pub residual_qty: i64,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonically increasing sequence assigned under the matcher's
    /// per-product lock; the actual FIFO tie-break (§4.4.5), since wall
    /// clock timestamps alone can collide.
    pub sequence: u64,
}

pub type Side = VecDeque<OrderEntry>;

/// One executed trade produced by a single pass through the match loop.
#[derive(Debug, Clone)]
pub struct TradeExecution {
    pub buyer: String,
    pub seller: String,
    pub buyer_cl_ord_id: String,
    pub seller_cl_ord_id: String,
    pub quantity: i64,
    pub price: f64,
}

/// Outcome of `OrderBook::match_incoming`.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub trades: Vec<TradeExecution>,
    pub filled_qty: i64,
    pub residual_qty: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderbookSnapshot {
    pub product: String,
    pub buy_orders: Vec<BookLevel>,
    pub sell_orders: Vec<BookLevel>,
}

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("unknown product: {0}")]
    UnknownProduct(String),
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error("invalid price")]
    InvalidPrice,
    #[error("duplicate clOrdID: {0}")]
    DuplicateOrderId(String),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient inventory")]
    InsufficientInventory,
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("order is not cancellable: {0}")]
    NotCancellable(String),
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

impl MatcherError {
    /// Maps onto the canonical wire error codes of §6.
    pub fn code(&self) -> &'static str {
        match self {
            MatcherError::UnknownProduct(_) => "INVALID_PRODUCT",
            MatcherError::InvalidQuantity => "INVALID_QUANTITY",
            MatcherError::InvalidPrice => "INVALID_ORDER",
            MatcherError::DuplicateOrderId(_) => "DUPLICATE_ORDER_ID",
            MatcherError::InsufficientBalance => "INSUFFICIENT_INVENTORY",
            MatcherError::InsufficientInventory => "INSUFFICIENT_INVENTORY",
            MatcherError::OrderNotFound(_) => "INVALID_ORDER",
            MatcherError::NotCancellable(_) => "INVALID_ORDER",
            MatcherError::Store(_) => "SERVICE_UNAVAILABLE",
        }
    }
}
