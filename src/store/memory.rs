use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::models::{DebugMode, Fill, Offer, Order, Team};

/// In-process stand-in for the document store, used by tests and by a
/// from-scratch local run with no `DATABASE_URL` configured. Internally
/// single-threaded-safe via `DashMap`/`RwLock`, not a simulation of
/// eventual consistency — every write here is immediately visible, which
/// is a stronger guarantee than Postgres gives, never a weaker one.
pub struct MemoryBackend {
    teams: DashMap<String, Team>,
    api_keys: DashMap<String, String>,
    orders: DashMap<String, Order>,
    fills: RwLock<Vec<Fill>>,
    debug_mode: RwLock<DebugMode>,
    offers: DashMap<String, Offer>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            teams: DashMap::new(),
            api_keys: DashMap::new(),
            orders: DashMap::new(),
            fills: RwLock::new(Vec::new()),
            debug_mode: RwLock::new(DebugMode {
                enabled: false,
                updated_at: Utc::now(),
                updated_by: "system".to_string(),
            }),
            offers: DashMap::new(),
        }
    }

    pub fn seed_team(&self, team: Team) -> Result<(), super::StoreError> {
        self.api_keys.insert(team.api_key.clone(), team.team_name.clone());
        self.teams.insert(team.team_name.clone(), team);
        Ok(())
    }

    pub fn team_by_api_key(&self, api_key: &str) -> Result<Option<Team>, super::StoreError> {
        Ok(self
            .api_keys
            .get(api_key)
            .and_then(|name| self.teams.get(name.value()).map(|t| t.value().clone())))
    }

    pub fn team_by_name(&self, team_name: &str) -> Result<Option<Team>, super::StoreError> {
        Ok(self.teams.get(team_name).map(|t| t.value().clone()))
    }

    pub fn touch_last_login(&self, team_name: &str) -> Result<(), super::StoreError> {
        if let Some(mut team) = self.teams.get_mut(team_name) {
            team.last_login = Some(Utc::now());
        }
        Ok(())
    }

    pub fn order_exists(&self, cl_ord_id: &str) -> bool {
        self.orders.contains_key(cl_ord_id)
    }

    pub fn get_order(&self, cl_ord_id: &str) -> Option<Order> {
        self.orders.get(cl_ord_id).map(|o| o.value().clone())
    }

    pub fn orders_for_team(&self, team_name: &str) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|e| e.value().team_name == team_name)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn fills_since(&self, team_name: &str, since: DateTime<Utc>) -> Vec<Fill> {
        let mut out: Vec<Fill> = self
            .fills
            .read()
            .iter()
            .filter(|f| f.executed_at > since && (f.buyer == team_name || f.seller == team_name))
            .cloned()
            .collect();
        out.sort_by_key(|f| f.executed_at);
        out
    }

    pub fn update_order_status(&self, order: &Order) {
        self.orders.insert(order.cl_ord_id.clone(), order.clone());
    }

    pub fn debug_mode(&self) -> DebugMode {
        self.debug_mode.read().clone()
    }

    pub fn set_debug_mode(&self, enabled: bool, updated_by: &str) -> DebugMode {
        let mut guard = self.debug_mode.write();
        guard.enabled = enabled;
        guard.updated_at = Utc::now();
        guard.updated_by = updated_by.to_string();
        guard.clone()
    }

    pub fn save_offer(&self, offer: Offer) {
        self.offers.insert(offer.offer_id.clone(), offer);
    }

    pub fn get_offer(&self, offer_id: &str) -> Option<Offer> {
        self.offers.get(offer_id).map(|o| o.value().clone())
    }

    pub fn apply_transaction(
        &self,
        orders: &[Order],
        fills: &[Fill],
        balance_deltas: &HashMap<String, f64>,
        inventory_deltas: &HashMap<(String, String), i64>,
    ) {
        for (team_name, delta) in balance_deltas {
            if let Some(mut team) = self.teams.get_mut(team_name) {
                team.current_balance += delta;
            }
        }
        for ((team_name, product), delta) in inventory_deltas {
            if let Some(mut team) = self.teams.get_mut(team_name) {
                let entry = team.inventory.entry(product.clone()).or_insert(0);
                *entry += delta;
            }
        }
        for order in orders {
            self.orders.insert(order.cl_ord_id.clone(), order.clone());
        }
        if !fills.is_empty() {
            self.fills.write().extend(fills.iter().cloned());
        }
    }
}
