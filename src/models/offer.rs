use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// A directed buyer->seller offer (§4.9). `max_price` bounds what the
/// seller may name in `ACCEPT_OFFER.priceOffered`.
#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub offer_id: String,
    pub buyer: String,
    pub seller: String,
    pub product: String,
    pub quantity_requested: i64,
    pub max_price: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OfferStatus,
}

impl Offer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
