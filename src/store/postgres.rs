use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::models::{DebugMode, Fill, Offer, OfferStatus, Order, Recipe, Role, Team};

use super::StoreError;

/// Postgres-backed document store. `teams`, `orders`, `fills`, and
/// `system_settings` are plain tables; `inventory`/`authorized_products`/
/// `recipes` live as `jsonb` columns on `teams` rather than normalized join
/// tables, mirroring the reference backend's use of `jsonb` for flexible,
/// rarely-queried-by-column data (`services/oracle.rs`'s market metadata).
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn seed_team(&self, team: Team) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO teams (team_name, api_key, species, initial_balance, current_balance,
                                inventory, authorized_products, recipes, role, last_login, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (team_name) DO NOTHING
            "#,
        )
        .bind(&team.team_name)
        .bind(&team.api_key)
        .bind(&team.species)
        .bind(team.initial_balance)
        .bind(team.current_balance)
        .bind(serde_json::to_value(&team.inventory).unwrap_or(Json::Null))
        .bind(serde_json::to_value(&team.authorized_products).unwrap_or(Json::Null))
        .bind(serde_json::to_value(&team.recipes).unwrap_or(Json::Null))
        .bind(serde_json::to_value(&team.role).unwrap_or(Json::Null))
        .bind(team.last_login)
        .bind(team.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_team(row: &sqlx::postgres::PgRow) -> Result<Team, StoreError> {
        let inventory: Json = row.try_get("inventory")?;
        let authorized_products: Json = row.try_get("authorized_products")?;
        let recipes: Json = row.try_get("recipes")?;
        let role: Json = row.try_get("role")?;
        Ok(Team {
            team_name: row.try_get("team_name")?,
            api_key: row.try_get("api_key")?,
            species: row.try_get("species")?,
            initial_balance: row.try_get("initial_balance")?,
            current_balance: row.try_get("current_balance")?,
            inventory: serde_json::from_value(inventory).unwrap_or_default(),
            authorized_products: serde_json::from_value(authorized_products).unwrap_or_default(),
            recipes: serde_json::from_value::<HashMap<String, Recipe>>(recipes).unwrap_or_default(),
            role: serde_json::from_value::<Role>(role).unwrap_or(Role {
                branches: 0.0,
                max_depth: 0,
                decay: 0.0,
                budget: 0.0,
                base_energy: 0.0,
                level_energy: 0.0,
            }),
            last_login: row.try_get("last_login")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub async fn team_by_api_key(&self, api_key: &str) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT * FROM teams WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_team).transpose()
    }

    pub async fn team_by_name(&self, team_name: &str) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT * FROM teams WHERE team_name = $1")
            .bind(team_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_team).transpose()
    }

    pub async fn touch_last_login(&self, team_name: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE teams SET last_login = now() WHERE team_name = $1")
            .bind(team_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn order_exists(&self, cl_ord_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM orders WHERE cl_ord_id = $1")
            .bind(cl_ord_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_order(&self, cl_ord_id: &str) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE cl_ord_id = $1")
            .bind(cl_ord_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn orders_for_team(&self, team_name: &str) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE team_name = $1 ORDER BY created_at")
            .bind(team_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    pub async fn fills_since(&self, team_name: &str, since: DateTime<Utc>) -> Result<Vec<Fill>, StoreError> {
        let fills = sqlx::query_as::<_, Fill>(
            r#"
            SELECT * FROM fills
            WHERE (buyer = $1 OR seller = $1) AND executed_at > $2
            ORDER BY executed_at
            "#,
        )
        .bind(team_name)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(fills)
    }

    pub async fn update_order_status(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (cl_ord_id, team_name, side, mode, product, quantity, price,
                                 filled_qty, status, message, created_at, updated_at, filled_at, filled_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (cl_ord_id) DO UPDATE SET
                filled_qty = EXCLUDED.filled_qty,
                status = EXCLUDED.status,
                message = EXCLUDED.message,
                updated_at = EXCLUDED.updated_at,
                filled_at = EXCLUDED.filled_at,
                filled_by = EXCLUDED.filled_by
            "#,
        )
        .bind(&order.cl_ord_id)
        .bind(&order.team_name)
        .bind(order.side)
        .bind(order.mode)
        .bind(&order.product)
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.filled_qty)
        .bind(order.status)
        .bind(&order.message)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.filled_at)
        .bind(&order.filled_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn debug_mode(&self) -> DebugMode {
        let row = sqlx::query("SELECT enabled, updated_at, updated_by FROM system_settings WHERE key = 'debug_mode'")
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten();
        match row {
            Some(row) => DebugMode {
                enabled: row.get("enabled"),
                updated_at: row.get("updated_at"),
                updated_by: row.get("updated_by"),
            },
            None => DebugMode {
                enabled: false,
                updated_at: Utc::now(),
                updated_by: "system".to_string(),
            },
        }
    }

    pub async fn set_debug_mode(&self, enabled: bool, updated_by: &str) -> Result<DebugMode, StoreError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, enabled, updated_at, updated_by)
            VALUES ('debug_mode', $1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = EXCLUDED.updated_at, updated_by = EXCLUDED.updated_by
            "#,
        )
        .bind(enabled)
        .bind(now)
        .bind(updated_by)
        .execute(&self.pool)
        .await?;
        Ok(DebugMode {
            enabled,
            updated_at: now,
            updated_by: updated_by.to_string(),
        })
    }

    pub async fn save_offer(&self, offer: Offer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO offers (offer_id, buyer, seller, product, quantity_requested, max_price,
                                 created_at, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (offer_id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(&offer.offer_id)
        .bind(&offer.buyer)
        .bind(&offer.seller)
        .bind(&offer.product)
        .bind(offer.quantity_requested)
        .bind(offer.max_price)
        .bind(offer.created_at)
        .bind(offer.expires_at)
        .bind(offer_status_text(offer.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_offer(&self, offer_id: &str) -> Result<Option<Offer>, StoreError> {
        let row = sqlx::query("SELECT * FROM offers WHERE offer_id = $1")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(Offer {
                offer_id: row.try_get("offer_id")?,
                buyer: row.try_get("buyer")?,
                seller: row.try_get("seller")?,
                product: row.try_get("product")?,
                quantity_requested: row.try_get("quantity_requested")?,
                max_price: row.try_get("max_price")?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
                status: offer_status_from_text(&row.try_get::<String, _>("status")?),
            }),
            None => None,
        })
    }

    /// Applies a committed transaction's buffered writes atomically, per
    /// the reference backend's `pool.begin()` / `tx.commit()` idiom
    /// (`services/settlement.rs`).
    pub async fn apply_transaction(
        &self,
        orders: &[Order],
        fills: &[Fill],
        balance_deltas: &HashMap<String, f64>,
        inventory_deltas: &HashMap<(String, String), i64>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for (team_name, delta) in balance_deltas {
            sqlx::query("UPDATE teams SET current_balance = current_balance + $1 WHERE team_name = $2")
                .bind(delta)
                .bind(team_name)
                .execute(&mut *tx)
                .await?;
        }

        for ((team_name, product), delta) in inventory_deltas {
            sqlx::query(
                r#"
                UPDATE teams
                SET inventory = jsonb_set(
                    inventory, ARRAY[$1],
                    to_jsonb(COALESCE((inventory ->> $1)::bigint, 0) + $2)
                )
                WHERE team_name = $3
                "#,
            )
            .bind(product)
            .bind(delta)
            .bind(team_name)
            .execute(&mut *tx)
            .await?;
        }

        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO orders (cl_ord_id, team_name, side, mode, product, quantity, price,
                                     filled_qty, status, message, created_at, updated_at, filled_at, filled_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT (cl_ord_id) DO UPDATE SET
                    filled_qty = EXCLUDED.filled_qty,
                    status = EXCLUDED.status,
                    message = EXCLUDED.message,
                    updated_at = EXCLUDED.updated_at,
                    filled_at = EXCLUDED.filled_at,
                    filled_by = EXCLUDED.filled_by
                "#,
            )
            .bind(&order.cl_ord_id)
            .bind(&order.team_name)
            .bind(order.side)
            .bind(order.mode)
            .bind(&order.product)
            .bind(order.quantity)
            .bind(order.price)
            .bind(order.filled_qty)
            .bind(order.status)
            .bind(&order.message)
            .bind(order.created_at)
            .bind(order.updated_at)
            .bind(order.filled_at)
            .bind(&order.filled_by)
            .execute(&mut *tx)
            .await?;
        }

        for fill in fills {
            sqlx::query(
                r#"
                INSERT INTO fills (id, buyer, seller, buyer_cl_ord_id, seller_cl_ord_id, product,
                                    quantity, price, executed_at, buyer_message, seller_message)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(fill.id)
            .bind(&fill.buyer)
            .bind(&fill.seller)
            .bind(&fill.buyer_cl_ord_id)
            .bind(&fill.seller_cl_ord_id)
            .bind(&fill.product)
            .bind(fill.quantity)
            .bind(fill.price)
            .bind(fill.executed_at)
            .bind(&fill.buyer_message)
            .bind(&fill.seller_message)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn offer_status_text(status: OfferStatus) -> &'static str {
    match status {
        OfferStatus::Pending => "pending",
        OfferStatus::Accepted => "accepted",
        OfferStatus::Rejected => "rejected",
        OfferStatus::Expired => "expired",
    }
}

fn offer_status_from_text(text: &str) -> OfferStatus {
    match text {
        "accepted" => OfferStatus::Accepted,
        "rejected" => OfferStatus::Rejected,
        "expired" => OfferStatus::Expired,
        _ => OfferStatus::Pending,
    }
}
