//! C5 ProductionEngine: a pure, deterministic recursive yield function
//! keyed by team role, with ingredient debiting from inventory (§4.5).
//!
//! Grounded on the reference backend's settlement idiom
//! (`services/settlement.rs`): validate -> debit/credit atomically inside
//! one store transaction -> broadcast the resulting state. The yield
//! computation itself has no reference-backend analogue (this domain's
//! market has no options/derivatives pricing), so it is implemented
//! directly from the formula (§4.5) with a colocated unit test
//! reproducing the spec's worked example.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::broadcaster::Broadcaster;
use crate::models::{Recipe, RecipeType, Role};
use crate::store::{Store, StoreError};
use crate::websocket::messages::ServerMessage;

#[derive(Debug, Error)]
pub enum ProductionError {
    #[error("unknown product: {0}")]
    UnknownProduct(String),
    #[error("unknown team: {0}")]
    UnknownTeam(String),
    #[error("team not authorized to produce {0}")]
    Unauthorized(String),
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error("insufficient inventory")]
    InsufficientInventory,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ProductionError {
    pub fn code(&self) -> &'static str {
        match self {
            ProductionError::UnknownProduct(_) => "INVALID_PRODUCT",
            ProductionError::UnknownTeam(_) => "AUTH_FAILED",
            ProductionError::Unauthorized(_) => "UNAUTHORIZED_PRODUCTION",
            ProductionError::InvalidQuantity => "INVALID_QUANTITY",
            ProductionError::InsufficientInventory => "INSUFFICIENT_INVENTORY",
            ProductionError::Store(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Per-unit-input yield: `Σ_{k=0..=D} (e0 + el*k) * (d*b)^k`, floored.
pub fn per_unit_yield(role: &Role) -> i64 {
    let db = role.decay * role.branches;
    let mut total = 0.0;
    for k in 0..=role.max_depth {
        let term = (role.base_energy + role.level_energy * k as f64) * db.powi(k as i32);
        total += term;
    }
    total.floor() as i64
}

pub fn compute_yield(role: &Role, quantity: i64, recipe: &Recipe) -> i64 {
    let per_unit = per_unit_yield(role) as f64;
    (per_unit * quantity as f64 * recipe.premium_bonus).floor() as i64
}

pub struct ProductionEngine {
    store: Arc<Store>,
    broadcaster: Arc<Broadcaster>,
    known_products: Vec<String>,
}

impl ProductionEngine {
    pub fn new(store: Arc<Store>, broadcaster: Arc<Broadcaster>, known_products: Vec<String>) -> Self {
        Self {
            store,
            broadcaster,
            known_products,
        }
    }

    pub async fn run(&self, team_name: &str, product: &str, quantity: i64) -> Result<i64, ProductionError> {
        if quantity <= 0 {
            return Err(ProductionError::InvalidQuantity);
        }
        if !self.known_products.iter().any(|p| p == product) {
            return Err(ProductionError::UnknownProduct(product.to_string()));
        }
        let team = self
            .store
            .team_by_name(team_name)
            .await?
            .ok_or_else(|| ProductionError::UnknownTeam(team_name.to_string()))?;

        if !team.is_authorized_for(product) {
            return Err(ProductionError::Unauthorized(product.to_string()));
        }
        let recipe = team
            .recipes
            .get(product)
            .cloned()
            .unwrap_or_else(Recipe::basic);

        let debits: Vec<(String, i64)> = if recipe.recipe_type == RecipeType::Premium {
            recipe
                .ingredients
                .iter()
                .map(|(ingredient, per_unit)| (ingredient.clone(), per_unit * quantity))
                .collect()
        } else {
            Vec::new()
        };

        let yielded = compute_yield(&team.role, quantity, &recipe);

        let mut tx = self.store.begin().await?;
        tx.settle_production(team_name, &debits, product, yielded)
            .await
            .map_err(|err| match err {
                StoreError::InsufficientInventory => ProductionError::InsufficientInventory,
                other => ProductionError::Store(other),
            })?;
        tx.commit().await?;

        debug!(team = team_name, product, quantity, yielded, "production run complete");

        if let Some(updated) = self.store.team_by_name(team_name).await? {
            self.broadcaster
                .send_to_client(team_name, &ServerMessage::InventoryUpdate {
                    inventory: updated.inventory.clone(),
                    server_time: chrono::Utc::now(),
                })
                .await;
        }

        Ok(yielded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_example_matches_spec() {
        let role = Role {
            branches: 2.0,
            max_depth: 2,
            decay: 0.5,
            budget: 0.0,
            base_energy: 3.0,
            level_energy: 2.0,
        };
        assert_eq!(per_unit_yield(&role), 15);
        let recipe = Recipe::premium([("FOSFO".to_string(), 5), ("PITA".to_string(), 3)].into_iter().collect());
        assert_eq!(compute_yield(&role, 1, &recipe), 19);
    }

    #[test]
    fn basic_recipe_uses_bonus_one() {
        let role = Role {
            branches: 0.0,
            max_depth: 0,
            decay: 0.0,
            budget: 0.0,
            base_energy: 4.0,
            level_energy: 0.0,
        };
        let recipe = Recipe::basic();
        assert_eq!(compute_yield(&role, 2, &recipe), 8);
    }
}
