//! C9 MessageRouter: parses the base envelope, dispatches to typed
//! handlers, serializes errors (§4.1, §6, §7).
//!
//! Flow of a client ORDER (§2): SessionHandler -> MessageRouter ->
//! RateLimiter -> Matcher -> Broadcaster. Pre-validation (team exists,
//! authorized product, side/qty sanity, duplicate clOrdID) happens here;
//! the Matcher only ever sees orders already past this gate.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthService;
use crate::broadcaster::Broadcaster;
use crate::matching::MatchingEngine;
use crate::models::{Order, OrderMode, OrderSide, OrderStatus, Team};
use crate::offer::OfferEngine;
use crate::production::ProductionEngine;
use crate::ratelimit::RateLimiter;
use crate::resync::ResyncService;
use crate::store::Store;
use crate::ticker::TickerService;

use super::messages::{ClientMessage, ServerMessage, KNOWN_CLIENT_TYPES};

pub struct MessageRouter {
    pub store: Arc<Store>,
    pub auth: Arc<AuthService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub matching_engine: Arc<MatchingEngine>,
    pub broadcaster: Arc<Broadcaster>,
    pub production: Arc<ProductionEngine>,
    pub resync: Arc<ResyncService>,
    pub ticker: Arc<TickerService>,
    pub offers: Arc<OfferEngine>,
}

/// Per-socket session state the router needs across messages, owned by
/// `SessionHandler` and passed in by `&mut` reference each call.
pub struct RouterSession {
    pub socket_id: Uuid,
    pub team: Option<Team>,
}

impl MessageRouter {
    /// Entry point for a raw text frame (§4.1, §6). A missing or
    /// non-string `type` is the only thing that earns `INVALID_MESSAGE`;
    /// a well-formed but unrecognized `type` (including a known type whose
    /// payload fails to parse) either dispatches to a minimal handler
    /// (`ADMIN_*`, `EXPORT_DATA`) or gets echoed back diagnostically.
    pub async fn handle_text(&self, session: &mut RouterSession, text: &str) -> Vec<ServerMessage> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(err) => return vec![ServerMessage::error("INVALID_MESSAGE", &err.to_string(), None)],
        };
        let Some(msg_type) = value.get("type").and_then(|t| t.as_str()) else {
            return vec![ServerMessage::error("INVALID_MESSAGE", "missing or non-string `type`", None)];
        };

        if msg_type.starts_with("ADMIN_") {
            return self.handle_admin(session, msg_type).await;
        }
        if msg_type == "EXPORT_DATA" {
            return self.handle_export_data(session).await;
        }
        if !KNOWN_CLIENT_TYPES.contains(&msg_type) {
            return vec![ServerMessage::echo(msg_type)];
        }

        match serde_json::from_value::<ClientMessage>(value) {
            Ok(msg) => self.handle(session, msg).await,
            Err(err) => vec![ServerMessage::error("INVALID_MESSAGE", &err.to_string(), None)],
        }
    }

    /// Minimal placeholder for the `ADMIN_*` family (§4.1 names the
    /// wildcard prefix but defines no concrete admin message shapes).
    /// Gated the same as any other authenticated handler; the HTTP admin
    /// surface (`api::admin`) is where the fully-specified admin
    /// operations (debug mode, resync) actually live.
    async fn handle_admin(&self, session: &mut RouterSession, msg_type: &str) -> Vec<ServerMessage> {
        if session.team.is_none() {
            return vec![ServerMessage::error("AUTH_FAILED", "invalid token", None)];
        }
        vec![ServerMessage::echo(msg_type)]
    }

    /// Minimal placeholder for `EXPORT_DATA` (§4.1 names the type; no wire
    /// format is defined anywhere else in the spec).
    async fn handle_export_data(&self, session: &mut RouterSession) -> Vec<ServerMessage> {
        if session.team.is_none() {
            return vec![ServerMessage::error("AUTH_FAILED", "invalid token", None)];
        }
        vec![ServerMessage::echo("EXPORT_DATA")]
    }

    pub async fn handle(&self, session: &mut RouterSession, msg: ClientMessage) -> Vec<ServerMessage> {
        match msg {
            ClientMessage::Login { token, .. } => self.handle_login(session, &token).await,
            other => {
                let Some(team) = session.team.clone() else {
                    return vec![ServerMessage::error("AUTH_FAILED", "invalid token", None)];
                };
                self.handle_authenticated(session, &team, other).await
            }
        }
    }

    async fn handle_login(&self, session: &mut RouterSession, token: &str) -> Vec<ServerMessage> {
        match self.auth.login(token, session.socket_id).await {
            Ok((team, evicted)) => {
                if let Some(evicted_socket) = evicted {
                    self.broadcaster.force_close(&team.team_name, evicted_socket);
                }
                let snapshot = crate::models::team::TeamSnapshot::from(&team);
                session.team = Some(team);
                vec![ServerMessage::LoginOk {
                    team: snapshot.team,
                    species: snapshot.species,
                    initial_balance: snapshot.initial_balance,
                    current_balance: snapshot.current_balance,
                    inventory: snapshot.inventory,
                    authorized_products: snapshot.authorized_products,
                    recipes: snapshot.recipes,
                    role: snapshot.role,
                    server_time: Utc::now(),
                }]
            }
            Err(_) => vec![ServerMessage::error("AUTH_FAILED", "invalid token", None)],
        }
    }

    async fn handle_authenticated(&self, _session: &mut RouterSession, team: &Team, msg: ClientMessage) -> Vec<ServerMessage> {
        match msg {
            ClientMessage::Order {
                cl_ord_id,
                side,
                mode,
                product,
                qty,
                limit_price,
                message,
                ..
            } => self.handle_order(team, cl_ord_id, side, mode, product, qty, limit_price, message).await,
            ClientMessage::Cancel { cl_ord_id } => self.handle_cancel(team, cl_ord_id).await,
            ClientMessage::ProductionUpdate { product, quantity } => self.handle_production(team, product, quantity).await,
            ClientMessage::AcceptOffer { offer_id, accept, quantity_offered, price_offered } => {
                self.handle_accept_offer(team, offer_id, accept, quantity_offered, price_offered).await
            }
            ClientMessage::Resync { last_sync } => vec![self.resync.resync(&team.team_name, Some(last_sync)).await],
            ClientMessage::RequestAllOrders {} => self.handle_request_all_orders(team).await,
            ClientMessage::RequestOrderBook { product } => self.handle_request_order_book(&product),
            ClientMessage::RequestConnectedSessions {} => vec![ServerMessage::connected_sessions(
                self.auth.session_count(&team.team_name),
                self.auth.connected_team_count(),
            )],
            ClientMessage::RequestPerformanceReport { .. } => {
                // No P&L/performance-tracking component exists anywhere in
                // this plane (DESIGN.md OQ9); the type is accepted per
                // §4.1 but there's nothing to report yet, so this is a
                // service gap rather than a malformed request.
                vec![ServerMessage::error("SERVICE_UNAVAILABLE", "performance reporting is not available", None)]
            }
            ClientMessage::Ping {} => vec![ServerMessage::Pong { timestamp: Utc::now() }],
            ClientMessage::Login { .. } => unreachable!("handled in handle()"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_order(
        &self,
        team: &Team,
        cl_ord_id: String,
        side: String,
        mode: String,
        product: String,
        qty: i64,
        limit_price: Option<f64>,
        message: Option<String>,
    ) -> Vec<ServerMessage> {
        if !self.rate_limiter.allow(&team.team_name) {
            return vec![ServerMessage::error("RATE_LIMIT_EXCEEDED", "too many orders", Some(cl_ord_id))];
        }
        if !self.matching_engine.is_known_product(&product) {
            return vec![ServerMessage::error("INVALID_PRODUCT", "unknown product", Some(cl_ord_id))];
        }
        if qty <= 0 {
            return vec![ServerMessage::error("INVALID_QUANTITY", "quantity must be positive", Some(cl_ord_id))];
        }
        let side = match side.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            _ => return vec![ServerMessage::error("INVALID_ORDER", "side must be BUY or SELL", Some(cl_ord_id))],
        };
        let mode = match mode.as_str() {
            "MARKET" => OrderMode::Market,
            "LIMIT" => OrderMode::Limit,
            _ => return vec![ServerMessage::error("INVALID_ORDER", "mode must be MARKET or LIMIT", Some(cl_ord_id))],
        };
        if mode == OrderMode::Limit && limit_price.map(|p| p <= 0.0).unwrap_or(true) {
            return vec![ServerMessage::error("INVALID_ORDER", "LIMIT requires a positive price", Some(cl_ord_id))];
        }

        let now = Utc::now();
        let order = Order {
            cl_ord_id: cl_ord_id.clone(),
            team_name: team.team_name.clone(),
            side,
            mode,
            product,
            quantity: qty,
            price: if mode == OrderMode::Limit { limit_price } else { None },
            filled_qty: 0,
            status: OrderStatus::Pending,
            message,
            created_at: now,
            updated_at: now,
            filled_at: None,
            filled_by: None,
        };

        match self.matching_engine.submit_order(order).await {
            Ok((order, _trades)) => vec![ServerMessage::OrderAck {
                cl_ord_id: order.cl_ord_id,
                status: status_text(order.status).to_string(),
                server_time: Utc::now(),
            }],
            Err(err) => {
                warn!(error = %err, "order rejected");
                vec![ServerMessage::error(err.code(), &err.to_string(), Some(cl_ord_id))]
            }
        }
    }

    async fn handle_cancel(&self, team: &Team, cl_ord_id: String) -> Vec<ServerMessage> {
        let known_product = self
            .store
            .get_order(&cl_ord_id)
            .await
            .ok()
            .flatten()
            .map(|o| o.product);
        let Some(product) = known_product else {
            return vec![ServerMessage::error("INVALID_ORDER", "unknown order", Some(cl_ord_id))];
        };
        match self.matching_engine.cancel_order(&product, &cl_ord_id, &team.team_name).await {
            Ok(order) => vec![ServerMessage::OrderAck {
                cl_ord_id: order.cl_ord_id,
                status: status_text(order.status).to_string(),
                server_time: Utc::now(),
            }],
            Err(err) => vec![ServerMessage::error(err.code(), &err.to_string(), Some(cl_ord_id))],
        }
    }

    async fn handle_production(&self, team: &Team, product: String, quantity: i64) -> Vec<ServerMessage> {
        match self.production.run(&team.team_name, &product, quantity).await {
            Ok(_) => Vec::new(),
            Err(err) => vec![ServerMessage::error(err.code(), &err.to_string(), None)],
        }
    }

    async fn handle_accept_offer(
        &self,
        team: &Team,
        offer_id: String,
        accept: bool,
        quantity_offered: Option<i64>,
        price_offered: Option<f64>,
    ) -> Vec<ServerMessage> {
        match self.offers.respond(&team.team_name, &offer_id, accept, quantity_offered, price_offered).await {
            Ok(_) => Vec::new(),
            Err(err) => vec![ServerMessage::error(err.code(), &err.to_string(), None)],
        }
    }

    async fn handle_request_all_orders(&self, team: &Team) -> Vec<ServerMessage> {
        let orders = self.store.orders_for_team(&team.team_name).await.unwrap_or_default();
        orders
            .into_iter()
            .map(|order| ServerMessage::OrderAck {
                cl_ord_id: order.cl_ord_id,
                status: status_text(order.status).to_string(),
                server_time: Utc::now(),
            })
            .collect()
    }

    fn handle_request_order_book(&self, product: &str) -> Vec<ServerMessage> {
        match self.matching_engine.snapshot(product, crate::matching::ORDER_BOOK_DEPTH_CAP) {
            Ok(snapshot) => vec![ServerMessage::order_book_update(&snapshot, Utc::now())],
            Err(err) => vec![ServerMessage::error(err.code(), &err.to_string(), None)],
        }
    }
}

fn status_text(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Cancelled => "CANCELLED",
        OrderStatus::Rejected => "REJECTED",
    }
}
