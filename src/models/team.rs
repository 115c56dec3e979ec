use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recipe::{Recipe, Role};

/// The authenticated principal. All balances, inventories, and sessions are
/// keyed by team name. Unique by `team_name` and by `api_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub team_name: String,
    pub api_key: String,
    pub species: String,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub inventory: HashMap<String, i64>,
    pub authorized_products: HashSet<String>,
    pub recipes: HashMap<String, Recipe>,
    pub role: Role,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn inventory_of(&self, product: &str) -> i64 {
        self.inventory.get(product).copied().unwrap_or(0)
    }

    pub fn is_authorized_for(&self, product: &str) -> bool {
        self.authorized_products.contains(product)
    }
}

/// What `LOGIN_OK` exposes to a client, in the canonical field order of §6.
#[derive(Debug, Clone, Serialize)]
pub struct TeamSnapshot {
    pub team: String,
    pub species: String,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub inventory: HashMap<String, i64>,
    pub authorized_products: Vec<String>,
    pub recipes: HashMap<String, Recipe>,
    pub role: Role,
}

impl From<&Team> for TeamSnapshot {
    fn from(team: &Team) -> Self {
        Self {
            team: team.team_name.clone(),
            species: team.species.clone(),
            initial_balance: team.initial_balance,
            current_balance: team.current_balance,
            inventory: team.inventory.clone(),
            authorized_products: team.authorized_products.iter().cloned().collect(),
            recipes: team.recipes.clone(),
            role: team.role.clone(),
        }
    }
}
