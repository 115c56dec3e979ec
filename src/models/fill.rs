use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A settled trade between exactly two orders. Append-only; once written,
/// immutable.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fill {
    pub id: Uuid,
    pub buyer: String,
    pub seller: String,
    pub buyer_cl_ord_id: String,
    pub seller_cl_ord_id: String,
    pub product: String,
    pub quantity: i64,
    pub price: f64,
    pub executed_at: DateTime<Utc>,
    pub buyer_message: Option<String>,
    pub seller_message: Option<String>,
}

impl Fill {
    /// Which side `team` played in this fill, or `None` if uninvolved.
    pub fn side_for(&self, team: &str) -> Option<super::OrderSide> {
        if self.buyer == team {
            Some(super::OrderSide::Buy)
        } else if self.seller == team {
            Some(super::OrderSide::Sell)
        } else {
            None
        }
    }

    pub fn counterparty_of(&self, team: &str) -> Option<&str> {
        if self.buyer == team {
            Some(&self.seller)
        } else if self.seller == team {
            Some(&self.buyer)
        } else {
            None
        }
    }

    pub fn counterparty_message_of(&self, team: &str) -> Option<&str> {
        if self.buyer == team {
            self.seller_message.as_deref()
        } else if self.seller == team {
            self.buyer_message.as_deref()
        } else {
            None
        }
    }

    pub fn cl_ord_id_of(&self, team: &str) -> Option<&str> {
        if self.buyer == team {
            Some(&self.buyer_cl_ord_id)
        } else if self.seller == team {
            Some(&self.seller_cl_ord_id)
        } else {
            None
        }
    }
}
