//! C14 OfferEngine: directed buyer->seller offers with accept/reject and
//! expiry (§4.9). On accept, synthesizes a crossing LIMIT pair that
//! settles through the same Matcher transaction discipline as any other
//! order. Debug mode can auto-accept on behalf of a synthetic
//! counterparty, gated by `DebugModeState` (C13, modeled as
//! `Store::debug_mode`/`set_debug_mode`).

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::broadcaster::Broadcaster;
use crate::matching::{MatcherError, MatchingEngine};
use crate::models::{Offer, OfferStatus, Order, OrderMode, OrderSide, OrderStatus};
use crate::store::Store;

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("offer not found: {0}")]
    NotFound(String),
    #[error("offer expired: {0}")]
    Expired(String),
    #[error("offered quantity exceeds requested")]
    QuantityExceedsRequested,
    #[error("offered price exceeds max price")]
    PriceExceedsMax,
    #[error("match error: {0}")]
    Match(#[from] MatcherError),
}

impl OfferError {
    pub fn code(&self) -> &'static str {
        match self {
            OfferError::NotFound(_) | OfferError::QuantityExceedsRequested | OfferError::PriceExceedsMax => "INVALID_ORDER",
            OfferError::Expired(_) => "OFFER_EXPIRED",
            OfferError::Match(err) => err.code(),
        }
    }
}

pub struct OfferEngine {
    store: Arc<Store>,
    matching_engine: Arc<MatchingEngine>,
    broadcaster: Arc<Broadcaster>,
}

impl OfferEngine {
    pub fn new(store: Arc<Store>, matching_engine: Arc<MatchingEngine>, broadcaster: Arc<Broadcaster>) -> Self {
        Self { store, matching_engine, broadcaster }
    }

    pub async fn create_offer(
        &self,
        buyer: &str,
        seller: &str,
        product: &str,
        quantity_requested: i64,
        max_price: f64,
        expires_in: Duration,
    ) -> Result<Offer, OfferError> {
        let now = Utc::now();
        let offer = Offer {
            offer_id: Uuid::new_v4().to_string(),
            buyer: buyer.to_string(),
            seller: seller.to_string(),
            product: product.to_string(),
            quantity_requested,
            max_price,
            created_at: now,
            expires_at: now + expires_in,
            status: OfferStatus::Pending,
        };
        let _ = self.store.save_offer(offer.clone()).await;
        self.broadcaster.send_to_client(seller, &offer_notice(&offer)).await;
        Ok(offer)
    }

    /// `ACCEPT_OFFER(offerId, accept, quantityOffered?, priceOffered?)`.
    pub async fn respond(
        &self,
        seller: &str,
        offer_id: &str,
        accept: bool,
        quantity_offered: Option<i64>,
        price_offered: Option<f64>,
    ) -> Result<Option<(Order, Order)>, OfferError> {
        let mut offer = self
            .store
            .get_offer(offer_id)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| OfferError::NotFound(offer_id.to_string()))?;

        if offer.is_expired(Utc::now()) {
            offer.status = OfferStatus::Expired;
            let _ = self.store.save_offer(offer).await;
            return Err(OfferError::Expired(offer_id.to_string()));
        }

        if !accept {
            offer.status = OfferStatus::Rejected;
            let _ = self.store.save_offer(offer).await;
            return Ok(None);
        }

        let quantity = quantity_offered.unwrap_or(offer.quantity_requested);
        let price = price_offered.unwrap_or(offer.max_price);
        if quantity > offer.quantity_requested {
            return Err(OfferError::QuantityExceedsRequested);
        }
        if price > offer.max_price {
            return Err(OfferError::PriceExceedsMax);
        }

        offer.status = OfferStatus::Accepted;
        let _ = self.store.save_offer(offer.clone()).await;

        self.execute_crossing_pair(&offer.buyer, seller, &offer.product, quantity, price).await
    }

    /// Auto-accepts on behalf of a synthetic counterparty when debug mode
    /// is on (§4.9), letting a single client exercise the full match path.
    pub async fn maybe_auto_accept(&self, offer: &Offer) -> Result<Option<(Order, Order)>, OfferError> {
        if !self.store.debug_mode().await.enabled {
            return Ok(None);
        }
        self.execute_crossing_pair(&offer.buyer, &offer.seller, &offer.product, offer.quantity_requested, offer.max_price)
            .await
    }

    async fn execute_crossing_pair(
        &self,
        buyer: &str,
        seller: &str,
        product: &str,
        quantity: i64,
        price: f64,
    ) -> Result<Option<(Order, Order)>, OfferError> {
        let now = Utc::now();
        let sell_order = Order {
            cl_ord_id: format!("offer-sell-{}", Uuid::new_v4()),
            team_name: seller.to_string(),
            side: OrderSide::Sell,
            mode: OrderMode::Limit,
            product: product.to_string(),
            quantity,
            price: Some(price),
            filled_qty: 0,
            status: OrderStatus::Pending,
            message: None,
            created_at: now,
            updated_at: now,
            filled_at: None,
            filled_by: None,
        };
        let (sell_result, _) = self.matching_engine.submit_order(sell_order).await?;

        let buy_order = Order {
            cl_ord_id: format!("offer-buy-{}", Uuid::new_v4()),
            team_name: buyer.to_string(),
            side: OrderSide::Buy,
            mode: OrderMode::Limit,
            product: product.to_string(),
            quantity,
            price: Some(price),
            filled_qty: 0,
            status: OrderStatus::Pending,
            message: None,
            created_at: now,
            updated_at: now,
            filled_at: None,
            filled_by: None,
        };
        let (buy_result, _) = self.matching_engine.submit_order(buy_order).await?;
        let sell_result = self.store.get_order(&sell_result.cl_ord_id).await.ok().flatten().unwrap_or(sell_result);

        Ok(Some((buy_result, sell_result)))
    }
}

fn offer_notice(offer: &Offer) -> serde_json::Value {
    serde_json::json!({
        "type": "OFFER_RECEIVED",
        "offerId": offer.offer_id,
        "buyer": offer.buyer,
        "product": offer.product,
        "quantityRequested": offer.quantity_requested,
        "maxPrice": offer.max_price,
        "expiresAt": offer.expires_at,
        "serverTime": Utc::now(),
    })
}
