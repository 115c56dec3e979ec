use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecipeType {
    Basic,
    Premium,
}

/// `{type, ingredients, premiumBonus}`. BASIC recipes have empty
/// ingredients and are free to run; PREMIUM recipes consume inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "type")]
    pub recipe_type: RecipeType,
    pub ingredients: HashMap<String, i64>,
    pub premium_bonus: f64,
}

impl Recipe {
    pub fn basic() -> Self {
        Self {
            recipe_type: RecipeType::Basic,
            ingredients: HashMap::new(),
            premium_bonus: 1.0,
        }
    }

    pub fn premium(ingredients: HashMap<String, i64>) -> Self {
        Self {
            recipe_type: RecipeType::Premium,
            ingredients,
            premium_bonus: 1.3,
        }
    }

    pub fn is_premium(&self) -> bool {
        self.recipe_type == RecipeType::Premium
    }
}

/// Parameters to the production yield function (§4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Role {
    pub branches: f64,
    pub max_depth: u32,
    pub decay: f64,
    pub budget: f64,
    pub base_energy: f64,
    pub level_energy: f64,
}
