use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::models::OrderSide;

use super::types::{BookLevel, MatchOutcome, OrderEntry, OrderbookSnapshot, PriceLevel, Side, TradeExecution};

/// Cap on price levels returned per side by a snapshot (DESIGN.md OQ2).
pub const ORDER_BOOK_DEPTH_CAP: usize = 50;

fn opposite(side: OrderSide) -> OrderSide {
    match side {
        OrderSide::Buy => OrderSide::Sell,
        OrderSide::Sell => OrderSide::Buy,
    }
}

/// In-memory two-sided price/time queue for one product (§C3). Bids are
/// keyed descending (best bid = highest price), asks ascending (best ask
/// = lowest price); within a level, orders are FIFO via `VecDeque`.
pub struct OrderBook {
    product: String,
    bids: RwLock<BTreeMap<PriceLevel, Side>>,
    asks: RwLock<BTreeMap<PriceLevel, Side>>,
    /// clOrdID -> (side, price level) so cancel/lookup never scans a side.
    index: DashMap<String, (OrderSide, PriceLevel)>,
    last_trade_price: AtomicI64,
    sequence: AtomicU64,
}

impl OrderBook {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            bids: RwLock::new(BTreeMap::new()),
            asks: RwLock::new(BTreeMap::new()),
            index: DashMap::new(),
            last_trade_price: AtomicI64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    fn side_map(&self, side: OrderSide) -> &RwLock<BTreeMap<PriceLevel, Side>> {
        match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        }
    }

    pub fn last_trade_price(&self) -> Option<f64> {
        let raw = self.last_trade_price.load(Ordering::Relaxed);
        if raw == 0 {
            None
        } else {
            Some(PriceLevel::from_raw(raw).to_price())
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.read().keys().next_back().map(|p| p.to_price())
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.read().keys().next().map(|p| p.to_price())
    }

    /// Enqueues a LIMIT residual on the book. Must be called under the
    /// matcher's per-product lock so `enqueued_at`/`sequence` form a total
    /// order (§4.4.5).
    pub fn enqueue(&self, side: OrderSide, cl_ord_id: &str, team_name: &str, price: f64, qty: i64) {
        let level = PriceLevel::from_price(price);
        let entry = OrderEntry {
            cl_ord_id: cl_ord_id.to_string(),
            team_name: team_name.to_string(),
            price,
            residual_qty: qty,
            enqueued_at: Utc::now(),
            sequence: self.next_sequence(),
        };
        self.side_map(side)
            .write()
            .entry(level)
            .or_insert_with(Side::new)
            .push_back(entry);
        self.index.insert(cl_ord_id.to_string(), (side, level));
    }

    /// Removes a resting order's residual entirely (full fill or cancel).
    pub fn remove(&self, cl_ord_id: &str) -> Option<OrderEntry> {
        let (side, level) = self.index.remove(cl_ord_id).map(|(_, v)| v)?;
        let mut guard = self.side_map(side).write();
        let queue = guard.get_mut(&level)?;
        let pos = queue.iter().position(|e| e.cl_ord_id == cl_ord_id)?;
        let removed = queue.remove(pos);
        if queue.is_empty() {
            guard.remove(&level);
        }
        removed
    }

    /// Reduces a resting order's residual in place; removes it once
    /// residual hits zero.
    fn reduce(&self, side: OrderSide, level: PriceLevel, cl_ord_id: &str, traded: i64) {
        let mut guard = self.side_map(side).write();
        let Some(queue) = guard.get_mut(&level) else { return };
        let Some(pos) = queue.iter().position(|e| e.cl_ord_id == cl_ord_id) else { return };
        queue[pos].residual_qty -= traded;
        if queue[pos].residual_qty <= 0 {
            queue.remove(pos);
            if queue.is_empty() {
                guard.remove(&level);
            }
            self.index.remove(cl_ord_id);
        }
    }

    /// Simulates walking the opposite side of the book against an incoming
    /// order under price-time priority (§4.4.3), WITHOUT mutating the book.
    /// Safe because the caller holds the per-product matcher lock, so no
    /// other match can interleave between planning and applying. Splitting
    /// plan/apply lets the caller validate cash/inventory for the whole
    /// batch of trades before touching the book, so a mid-match settlement
    /// failure rolls back cleanly with zero book mutation (§4.4.3,
    /// "partial fills already committed... are rolled back as one").
    pub fn plan_match(
        &self,
        incoming_side: OrderSide,
        incoming_cl_ord_id: &str,
        incoming_team: &str,
        mut residual: i64,
        limit_price: Option<f64>,
    ) -> MatchOutcome {
        let opposite_side = opposite(incoming_side);
        let guard = self.side_map(opposite_side).read();

        let levels: Vec<PriceLevel> = match opposite_side {
            OrderSide::Buy => guard.keys().rev().copied().collect(),
            OrderSide::Sell => guard.keys().copied().collect(),
        };

        let mut trades = Vec::new();
        let mut filled_qty = 0i64;
        let mut remaining: HashMap<String, i64> = HashMap::new();

        'levels: for level in levels {
            if residual <= 0 {
                break;
            }
            if let Some(limit) = limit_price {
                let crosses = match incoming_side {
                    OrderSide::Buy => limit >= level.to_price(),
                    OrderSide::Sell => limit <= level.to_price(),
                };
                if !crosses {
                    break;
                }
            }
            for resting in guard[&level].iter() {
                if residual <= 0 {
                    break 'levels;
                }
                let available = *remaining.entry(resting.cl_ord_id.clone()).or_insert(resting.residual_qty);
                if available <= 0 {
                    continue;
                }
                let traded = residual.min(available);

                let (buyer, seller, buyer_cl_ord_id, seller_cl_ord_id) = match incoming_side {
                    OrderSide::Buy => (
                        incoming_team.to_string(),
                        resting.team_name.clone(),
                        incoming_cl_ord_id.to_string(),
                        resting.cl_ord_id.clone(),
                    ),
                    OrderSide::Sell => (
                        resting.team_name.clone(),
                        incoming_team.to_string(),
                        resting.cl_ord_id.clone(),
                        incoming_cl_ord_id.to_string(),
                    ),
                };

                trades.push(TradeExecution {
                    buyer,
                    seller,
                    buyer_cl_ord_id,
                    seller_cl_ord_id,
                    quantity: traded,
                    price: level.to_price(),
                });

                residual -= traded;
                filled_qty += traded;
                remaining.insert(resting.cl_ord_id.clone(), available - traded);
            }
        }

        MatchOutcome {
            trades,
            filled_qty,
            residual_qty: residual,
        }
    }

    /// Applies a previously planned [`MatchOutcome`] to the book: reduces
    /// or removes each resting order that was traded against, and records
    /// the last trade price. Must be called only after the corresponding
    /// settlement has committed.
    pub fn apply_match(&self, incoming_side: OrderSide, outcome: &MatchOutcome) {
        let opposite_side = opposite(incoming_side);
        for trade in &outcome.trades {
            let resting_cl_ord_id = match incoming_side {
                OrderSide::Buy => &trade.seller_cl_ord_id,
                OrderSide::Sell => &trade.buyer_cl_ord_id,
            };
            if let Some(entry) = self.index.get(resting_cl_ord_id) {
                let (_, level) = *entry;
                drop(entry);
                self.reduce(opposite_side, level, resting_cl_ord_id, trade.quantity);
            }
            self.last_trade_price
                .store(PriceLevel::from_price(trade.price).raw(), Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, depth: usize) -> OrderbookSnapshot {
        let depth = depth.min(ORDER_BOOK_DEPTH_CAP);
        let buy_orders = self
            .bids
            .read()
            .iter()
            .rev()
            .take(depth)
            .map(|(level, q)| BookLevel {
                price: level.to_price(),
                quantity: q.iter().map(|e| e.residual_qty).sum(),
            })
            .collect();
        let sell_orders = self
            .asks
            .read()
            .iter()
            .take(depth)
            .map(|(level, q)| BookLevel {
                price: level.to_price(),
                quantity: q.iter().map(|e| e.residual_qty).sum(),
            })
            .collect();
        OrderbookSnapshot {
            product: self.product.clone(),
            buy_orders,
            sell_orders,
        }
    }

    pub fn has_order(&self, cl_ord_id: &str) -> bool {
        self.index.contains_key(cl_ord_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::new("GUACA")
    }

    #[test]
    fn enqueue_and_best_prices() {
        let b = book();
        b.enqueue(OrderSide::Buy, "B1", "teamB", 48.0, 6);
        b.enqueue(OrderSide::Sell, "S1", "teamS", 52.0, 10);
        assert_eq!(b.best_bid(), Some(48.0));
        assert_eq!(b.best_ask(), Some(52.0));
    }

    #[test]
    fn crossing_limit_fills_resting_price() {
        let b = book();
        b.enqueue(OrderSide::Sell, "B1", "teamB", 50.0, 10);
        let outcome = b.plan_match(OrderSide::Buy, "A1", "teamA", 4, Some(60.0));
        assert_eq!(outcome.filled_qty, 4);
        assert_eq!(outcome.residual_qty, 0);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].price, 50.0);
        assert_eq!(outcome.trades[0].quantity, 4);
        b.apply_match(OrderSide::Buy, &outcome);
        let snap = b.snapshot(10);
        assert_eq!(snap.sell_orders[0].quantity, 6);
    }

    #[test]
    fn market_order_with_no_liquidity_has_full_residual() {
        let b = book();
        let outcome = b.plan_match(OrderSide::Buy, "A2", "teamA", 5, None);
        assert_eq!(outcome.filled_qty, 0);
        assert_eq!(outcome.residual_qty, 5);
        assert!(outcome.trades.is_empty());
    }

    #[test]
    fn partial_fill_market_order_drains_book() {
        let b = book();
        b.enqueue(OrderSide::Sell, "S1", "teamS", 10.0, 3);
        let outcome = b.plan_match(OrderSide::Buy, "A3", "teamA", 5, None);
        assert_eq!(outcome.filled_qty, 3);
        assert_eq!(outcome.residual_qty, 2);
        b.apply_match(OrderSide::Buy, &outcome);
        assert_eq!(b.best_ask(), None);
    }

    #[test]
    fn fifo_within_price_level() {
        let b = book();
        b.enqueue(OrderSide::Sell, "S1", "teamS1", 10.0, 5);
        b.enqueue(OrderSide::Sell, "S2", "teamS2", 10.0, 5);
        let outcome = b.plan_match(OrderSide::Buy, "A4", "teamA", 5, None);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].seller, "teamS1");
    }

    #[test]
    fn cancel_removes_from_index_and_book() {
        let b = book();
        b.enqueue(OrderSide::Buy, "B1", "teamB", 48.0, 6);
        assert!(b.has_order("B1"));
        let removed = b.remove("B1");
        assert!(removed.is_some());
        assert!(!b.has_order("B1"));
        assert_eq!(b.best_bid(), None);
    }
}
