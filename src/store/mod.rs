//! C1 TeamStore + C2 OrderStore/FillStore, modeled as a document store with
//! single-statement cross-collection ACID transactions (§5, §6) over the
//! collections `teams, orders, fills, market_state, system_settings,
//! inventory_transactions`. Backed by Postgres in production, grounded on
//! the reference backend's `sqlx::PgPool` + `pool.begin()`/`tx.commit()`
//! idiom (`services/settlement.rs`); an in-process backend stands in for
//! tests, where standing up a database is not the point of the test.

mod memory;
mod postgres;

use std::sync::Arc;

use thiserror::Error;

use crate::matching::TradeExecution;
use crate::models::{DebugMode, Offer, Order, Team};

pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient inventory")]
    InsufficientInventory,
    #[error("team not found: {0}")]
    TeamNotFound(String),
    #[error("order not found: {0}")]
    OrderNotFound(String),
}

enum Backend {
    Memory(MemoryBackend),
    Postgres(PostgresBackend),
}

/// Entry point for every durable read/write the core performs. Construct
/// once at startup and share behind an `Arc`.
pub struct Store {
    backend: Backend,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            backend: Backend::Postgres(PostgresBackend::connect(database_url).await?),
        })
    }

    /// In-process backend used by tests and by `main` when no
    /// `DATABASE_URL` is configured (local/offline demo mode).
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryBackend::new()),
        }
    }

    pub async fn seed_team(&self, team: Team) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(b) => b.seed_team(team),
            Backend::Postgres(b) => b.seed_team(team).await,
        }
    }

    pub async fn team_by_api_key(&self, api_key: &str) -> Result<Option<Team>, StoreError> {
        match &self.backend {
            Backend::Memory(b) => b.team_by_api_key(api_key),
            Backend::Postgres(b) => b.team_by_api_key(api_key).await,
        }
    }

    pub async fn team_by_name(&self, team_name: &str) -> Result<Option<Team>, StoreError> {
        match &self.backend {
            Backend::Memory(b) => b.team_by_name(team_name),
            Backend::Postgres(b) => b.team_by_name(team_name).await,
        }
    }

    pub async fn touch_last_login(&self, team_name: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(b) => b.touch_last_login(team_name),
            Backend::Postgres(b) => b.touch_last_login(team_name).await,
        }
    }

    pub async fn order_exists(&self, cl_ord_id: &str) -> Result<bool, StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.order_exists(cl_ord_id)),
            Backend::Postgres(b) => b.order_exists(cl_ord_id).await,
        }
    }

    pub async fn get_order(&self, cl_ord_id: &str) -> Result<Option<Order>, StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.get_order(cl_ord_id)),
            Backend::Postgres(b) => b.get_order(cl_ord_id).await,
        }
    }

    pub async fn orders_for_team(&self, team_name: &str) -> Result<Vec<Order>, StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.orders_for_team(team_name)),
            Backend::Postgres(b) => b.orders_for_team(team_name).await,
        }
    }

    pub async fn fills_since(&self, team_name: &str, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<crate::models::Fill>, StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.fills_since(team_name, since)),
            Backend::Postgres(b) => b.fills_since(team_name, since).await,
        }
    }

    /// Updates an order's mutable fields (status/filled_qty/...) outside a
    /// match transaction — used by plain `CANCEL` (§4.4 residual-only, per
    /// DESIGN.md OQ3).
    pub async fn update_order_status(&self, order: &Order) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.update_order_status(order)),
            Backend::Postgres(b) => b.update_order_status(order).await,
        }
    }

    pub async fn debug_mode(&self) -> DebugMode {
        match &self.backend {
            Backend::Memory(b) => b.debug_mode(),
            Backend::Postgres(b) => b.debug_mode().await,
        }
    }

    pub async fn set_debug_mode(&self, enabled: bool, updated_by: &str) -> Result<DebugMode, StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.set_debug_mode(enabled, updated_by)),
            Backend::Postgres(b) => b.set_debug_mode(enabled, updated_by).await,
        }
    }

    pub async fn save_offer(&self, offer: Offer) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.save_offer(offer)),
            Backend::Postgres(b) => b.save_offer(offer).await,
        }
    }

    pub async fn get_offer(&self, offer_id: &str) -> Result<Option<Offer>, StoreError> {
        match &self.backend {
            Backend::Memory(b) => Ok(b.get_offer(offer_id)),
            Backend::Postgres(b) => b.get_offer(offer_id).await,
        }
    }

    #[cfg(test)]
    pub async fn seed_fill_for_test(&self, fill: crate::models::Fill) {
        match &self.backend {
            Backend::Memory(b) => b.apply_transaction(&[], &[fill], &Default::default(), &Default::default()),
            Backend::Postgres(_) => unimplemented!("postgres backend has no in-test seam"),
        }
    }

    /// Begins a transaction spanning OrderStore + FillStore + TeamStore +
    /// OrderBook bookkeeping (§4.4.3, §5). All of a match's cash/inventory
    /// deltas and its Fill/Order writes are buffered here and applied in
    /// one shot on `commit`, or discarded entirely on `rollback`/drop.
    pub async fn begin(self: &Arc<Self>) -> Result<Transaction, StoreError> {
        Ok(Transaction {
            store: self.clone(),
            pending_orders: Vec::new(),
            pending_fills: Vec::new(),
            balance_deltas: std::collections::HashMap::new(),
            inventory_deltas: std::collections::HashMap::new(),
            committed: false,
        })
    }
}

/// A buffered, all-or-nothing unit of work. Nothing in here is visible to
/// readers until `commit` returns `Ok`.
pub struct Transaction {
    store: Arc<Store>,
    pending_orders: Vec<Order>,
    pending_fills: Vec<crate::models::Fill>,
    balance_deltas: std::collections::HashMap<String, f64>,
    inventory_deltas: std::collections::HashMap<(String, String), i64>,
    committed: bool,
}

impl Transaction {
    pub async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.pending_orders.push(order.clone());
        Ok(())
    }

    pub async fn update_order_status(&mut self, order: &Order) -> Result<(), StoreError> {
        self.pending_orders.push(order.clone());
        Ok(())
    }

    /// Validates and buffers one trade's cash/inventory effect plus its
    /// Fill record (§4.4.3: "insufficient inventory for the seller or
    /// insufficient cash for the buyer... aborts the entire match
    /// attempt"). Validation accounts for every delta already buffered
    /// earlier in this same transaction, so a sequence of trades against
    /// one team's balance is checked cumulatively.
    pub async fn settle_trade(&mut self, trade: &TradeExecution, product: &str) -> Result<(), StoreError> {
        let notional = trade.price * trade.quantity as f64;

        let buyer_team = self.store.team_by_name(&trade.buyer).await?.ok_or_else(|| StoreError::TeamNotFound(trade.buyer.clone()))?;
        let seller_team = self.store.team_by_name(&trade.seller).await?.ok_or_else(|| StoreError::TeamNotFound(trade.seller.clone()))?;

        let buyer_balance_after = buyer_team.current_balance + self.balance_deltas.get(&trade.buyer).copied().unwrap_or(0.0) - notional;
        if buyer_balance_after < 0.0 {
            return Err(StoreError::InsufficientBalance);
        }

        let seller_inventory_key = (trade.seller.clone(), product.to_string());
        let seller_inventory_after = seller_team.inventory_of(product)
            + self.inventory_deltas.get(&seller_inventory_key).copied().unwrap_or(0)
            - trade.quantity;
        if seller_inventory_after < 0 {
            return Err(StoreError::InsufficientInventory);
        }

        *self.balance_deltas.entry(trade.buyer.clone()).or_insert(0.0) -= notional;
        *self.balance_deltas.entry(trade.seller.clone()).or_insert(0.0) += notional;
        *self
            .inventory_deltas
            .entry((trade.buyer.clone(), product.to_string()))
            .or_insert(0) += trade.quantity;
        *self.inventory_deltas.entry(seller_inventory_key).or_insert(0) -= trade.quantity;

        self.pending_fills.push(crate::models::Fill {
            id: uuid::Uuid::new_v4(),
            buyer: trade.buyer.clone(),
            seller: trade.seller.clone(),
            buyer_cl_ord_id: trade.buyer_cl_ord_id.clone(),
            seller_cl_ord_id: trade.seller_cl_ord_id.clone(),
            product: product.to_string(),
            quantity: trade.quantity,
            price: trade.price,
            executed_at: chrono::Utc::now(),
            buyer_message: None,
            seller_message: None,
        });
        Ok(())
    }

    /// Validates and buffers a production run's ingredient debit and
    /// product credit (§4.5). Same cumulative-within-transaction check as
    /// `settle_trade`.
    pub async fn settle_production(
        &mut self,
        team_name: &str,
        debits: &[(String, i64)],
        credit_product: &str,
        credit_qty: i64,
    ) -> Result<(), StoreError> {
        let team = self
            .store
            .team_by_name(team_name)
            .await?
            .ok_or_else(|| StoreError::TeamNotFound(team_name.to_string()))?;

        for (product, qty) in debits {
            let key = (team_name.to_string(), product.clone());
            let after = team.inventory_of(product) + self.inventory_deltas.get(&key).copied().unwrap_or(0) - qty;
            if after < 0 {
                return Err(StoreError::InsufficientInventory);
            }
        }
        for (product, qty) in debits {
            let key = (team_name.to_string(), product.clone());
            *self.inventory_deltas.entry(key).or_insert(0) -= qty;
        }
        *self
            .inventory_deltas
            .entry((team_name.to_string(), credit_product.to_string()))
            .or_insert(0) += credit_qty;
        Ok(())
    }

    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.committed = true;
        match &self.store.backend {
            Backend::Memory(b) => b.apply_transaction(&self.pending_orders, &self.pending_fills, &self.balance_deltas, &self.inventory_deltas),
            Backend::Postgres(b) => {
                b.apply_transaction(&self.pending_orders, &self.pending_fills, &self.balance_deltas, &self.inventory_deltas)
                    .await?
            }
        }
        Ok(())
    }

    /// Explicit rollback. Equivalent to dropping the transaction: nothing
    /// buffered here was ever visible outside it.
    pub async fn rollback(mut self) -> Result<(), StoreError> {
        self.committed = true; // suppress the drop-time debug assertion below
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("transaction dropped without commit; buffered writes discarded");
        }
    }
}
