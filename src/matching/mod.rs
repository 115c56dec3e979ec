//! Matching engine core: C3 OrderBook + C4 Matcher.
//!
//! One [`OrderBook`] per product, each guarded by its own `tokio::sync::Mutex`
//! so the matcher is single-writer per product with no cross-product lock
//! (§5). `MatchingEngine` owns the map of products and is the entry point
//! `MessageRouter` calls for `ORDER`/`CANCEL`.

pub mod orderbook;
pub mod types;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::models::{Order, OrderMode, OrderSide, OrderStatus};
use crate::store::Store;
use crate::ticker::TickerService;

pub use orderbook::{OrderBook, ORDER_BOOK_DEPTH_CAP};
pub use types::{BookLevel, MatchOutcome, MatcherError, OrderbookSnapshot, TradeExecution};

struct ProductLock {
    book: OrderBook,
    lock: Mutex<()>,
}

pub struct MatchingEngine {
    products: DashMap<String, Arc<ProductLock>>,
    store: Arc<Store>,
    broadcaster: Arc<Broadcaster>,
    // Set once at startup via `set_ticker`; `TickerService::new` takes an
    // `Arc<MatchingEngine>`, so the two can't be constructed in one shot.
    ticker: OnceLock<Arc<TickerService>>,
}

impl MatchingEngine {
    pub fn new(products: &[String], store: Arc<Store>, broadcaster: Arc<Broadcaster>) -> Self {
        let map = DashMap::new();
        for product in products {
            map.insert(
                product.clone(),
                Arc::new(ProductLock {
                    book: OrderBook::new(product.clone()),
                    lock: Mutex::new(()),
                }),
            );
        }
        info!(count = products.len(), "matching engine initialized");
        Self {
            products: map,
            store,
            broadcaster,
            ticker: OnceLock::new(),
        }
    }

    /// Wires the ticker after both it and this engine exist (§4.4 step 6:
    /// "TickerService's state is updated with last-trade price and 24h
    /// volume delta after each fill").
    pub fn set_ticker(&self, ticker: Arc<TickerService>) {
        let _ = self.ticker.set(ticker);
    }

    pub fn is_known_product(&self, product: &str) -> bool {
        self.products.contains_key(product)
    }

    fn product(&self, product: &str) -> Result<Arc<ProductLock>, MatcherError> {
        self.products
            .get(product)
            .map(|e| e.value().clone())
            .ok_or_else(|| MatcherError::UnknownProduct(product.to_string()))
    }

    pub fn snapshot(&self, product: &str, depth: usize) -> Result<OrderbookSnapshot, MatcherError> {
        Ok(self.product(product)?.book.snapshot(depth))
    }

    pub fn best_bid_ask(&self, product: &str) -> Option<(Option<f64>, Option<f64>)> {
        self.products
            .get(product)
            .map(|e| (e.value().book.best_bid(), e.value().book.best_ask()))
    }

    pub fn last_trade_price(&self, product: &str) -> Option<f64> {
        self.products.get(product).and_then(|e| e.value().book.last_trade_price())
    }

    pub fn products(&self) -> Vec<String> {
        self.products.iter().map(|e| e.key().clone()).collect()
    }

    /// Submits a pre-validated order through the full match+settle pipeline
    /// (§4.4). Pre-validation (team exists, authorized product, side/qty
    /// sanity, rate limit) is the caller's (`MessageRouter`) job; this
    /// performs steps 2-6: book-entry insert, match loop, residual
    /// handling, ticker update, and atomic cash/inventory settlement. Runs
    /// entirely inside one store transaction (§5).
    pub async fn submit_order(&self, mut order: Order) -> Result<(Order, Vec<TradeExecution>), MatcherError> {
        let entry = self.product(&order.product)?;
        let _guard = entry.lock.lock().await;

        if self.store.order_exists(&order.cl_ord_id).await? {
            return Err(MatcherError::DuplicateOrderId(order.cl_ord_id.clone()));
        }

        let limit_price = match order.mode {
            OrderMode::Limit => order.price,
            OrderMode::Market => None,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_order(&order).await?;

        let outcome = entry
            .book
            .plan_match(order.side, &order.cl_ord_id, &order.team_name, order.quantity, limit_price);

        order.filled_qty = outcome.filled_qty;

        // Validate every planned trade's settlement before the book is
        // touched at all, so a failure midway rolls back with nothing to
        // undo (§4.4.3).
        for trade in &outcome.trades {
            if let Err(err) = tx.settle_trade(trade, &order.product).await {
                warn!(error = %err, "match transaction rolled back");
                tx.rollback().await?;
                order.status = OrderStatus::Rejected;
                return Err(err.into());
            }
        }

        entry.book.apply_match(order.side, &outcome);

        let trades = outcome.trades.clone();
        if let Some(last) = trades.last() {
            order.filled_by = Some(if order.team_name == last.buyer {
                last.seller.clone()
            } else {
                last.buyer.clone()
            });
        }

        match order.mode {
            OrderMode::Market => {
                // MARKET never rests: any residual is cancelled outright.
                order.status = if order.filled_qty == 0 {
                    OrderStatus::Cancelled
                } else if outcome.residual_qty > 0 {
                    OrderStatus::Cancelled
                } else {
                    OrderStatus::Filled
                };
            }
            OrderMode::Limit => {
                if outcome.residual_qty == 0 {
                    order.status = OrderStatus::Filled;
                } else if order.filled_qty > 0 {
                    order.status = OrderStatus::PartiallyFilled;
                    entry
                        .book
                        .enqueue(order.side, &order.cl_ord_id, &order.team_name, limit_price.unwrap(), outcome.residual_qty);
                } else {
                    order.status = OrderStatus::Pending;
                    entry
                        .book
                        .enqueue(order.side, &order.cl_ord_id, &order.team_name, limit_price.unwrap(), outcome.residual_qty);
                }
            }
        }
        order.updated_at = Utc::now();
        if order.filled_qty > 0 && matches!(order.status, OrderStatus::Filled) {
            order.filled_at = Some(order.updated_at);
        }

        tx.update_order_status(&order).await?;
        tx.commit().await?;

        debug!(cl_ord_id = %order.cl_ord_id, status = ?order.status, trades = trades.len(), "order processed");

        for trade in &trades {
            self.broadcaster.send_fill_for_trade(trade, &order.product).await;
            if let Some(ticker) = self.ticker.get() {
                ticker.record_trade(&order.product, trade.quantity);
            }
        }
        if !trades.is_empty() {
            let snap = entry.book.snapshot(ORDER_BOOK_DEPTH_CAP);
            self.broadcaster.broadcast_order_book(&snap).await;
        }

        Ok((order, trades))
    }

    /// `CANCEL`: removes the residual only (DESIGN.md OQ3). Fills already
    /// executed remain untouched; an already-FILLED/CANCELLED order
    /// returns `NotCancellable` (-> `INVALID_ORDER`, §7).
    pub async fn cancel_order(&self, product: &str, cl_ord_id: &str, team_name: &str) -> Result<Order, MatcherError> {
        let entry = self.product(product)?;
        let _guard = entry.lock.lock().await;

        let mut order = self
            .store
            .get_order(cl_ord_id)
            .await?
            .ok_or_else(|| MatcherError::OrderNotFound(cl_ord_id.to_string()))?;

        if order.team_name != team_name || !order.is_resting() {
            return Err(MatcherError::NotCancellable(cl_ord_id.to_string()));
        }

        entry.book.remove(cl_ord_id);
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        self.store.update_order_status(&order).await?;
        Ok(order)
    }

    pub fn depth_by_product(&self) -> HashMap<String, usize> {
        self.products
            .iter()
            .map(|e| (e.key().clone(), e.value().book.snapshot(ORDER_BOOK_DEPTH_CAP).buy_orders.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    async fn engine() -> MatchingEngine {
        let store = Arc::new(Store::new_in_memory());
        let broadcaster = Arc::new(Broadcaster::new());
        MatchingEngine::new(&["GUACA".to_string()], store, broadcaster)
    }

    #[tokio::test]
    async fn unknown_product_rejected() {
        let engine = engine().await;
        assert!(!engine.is_known_product("DOESNOTEXIST"));
        let _ = AppConfig::default_for_test();
    }
}
