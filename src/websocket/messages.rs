//! Wire envelope (§6): every frame is one JSON object tagged by `type`.
//! Field names and casing are canonical per the spec's literal message
//! grammar, not the reference backend's — enum shape (tagged, `rename_all`)
//! is still grounded on `websocket/handler.rs`'s `ClientMessage`/
//! `ServerMessage` split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::OrderbookSnapshot;
use crate::models::{Recipe, Role};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "LOGIN")]
    Login { token: String, tz: Option<String> },
    #[serde(rename = "ORDER")]
    Order {
        #[serde(rename = "clOrdID")]
        cl_ord_id: String,
        side: String,
        mode: String,
        product: String,
        qty: i64,
        #[serde(rename = "limitPrice")]
        limit_price: Option<f64>,
        #[serde(rename = "expiresAt")]
        expires_at: Option<DateTime<Utc>>,
        message: Option<String>,
        #[serde(rename = "debugMode")]
        debug_mode: Option<bool>,
    },
    #[serde(rename = "CANCEL")]
    Cancel {
        #[serde(rename = "clOrdID")]
        cl_ord_id: String,
    },
    #[serde(rename = "PRODUCTION_UPDATE")]
    ProductionUpdate { product: String, quantity: i64 },
    #[serde(rename = "ACCEPT_OFFER")]
    AcceptOffer {
        #[serde(rename = "offerId")]
        offer_id: String,
        accept: bool,
        #[serde(rename = "quantityOffered")]
        quantity_offered: Option<i64>,
        #[serde(rename = "priceOffered")]
        price_offered: Option<f64>,
    },
    #[serde(rename = "RESYNC")]
    Resync {
        #[serde(rename = "lastSync")]
        last_sync: DateTime<Utc>,
    },
    #[serde(rename = "REQUEST_ALL_ORDERS")]
    RequestAllOrders {},
    #[serde(rename = "REQUEST_ORDER_BOOK")]
    RequestOrderBook { product: String },
    #[serde(rename = "REQUEST_CONNECTED_SESSIONS")]
    RequestConnectedSessions {},
    #[serde(rename = "REQUEST_PERFORMANCE_REPORT")]
    RequestPerformanceReport {
        scope: String,
        #[serde(rename = "teamName")]
        team_name: Option<String>,
        #[serde(rename = "startTime")]
        start_time: Option<DateTime<Utc>>,
    },
    #[serde(rename = "PING")]
    Ping {},
}

/// Every literal `type` tag `ClientMessage` knows how to parse. Anything
/// outside this set (other than `ADMIN_*`/`EXPORT_DATA`, handled
/// separately) is an unknown-but-well-formed message and gets `ECHO`ed
/// back rather than treated as a parse failure (§4.1).
pub const KNOWN_CLIENT_TYPES: &[&str] = &[
    "LOGIN",
    "ORDER",
    "CANCEL",
    "PRODUCTION_UPDATE",
    "ACCEPT_OFFER",
    "RESYNC",
    "REQUEST_ALL_ORDERS",
    "REQUEST_ORDER_BOOK",
    "REQUEST_CONNECTED_SESSIONS",
    "REQUEST_PERFORMANCE_REPORT",
    "PING",
];

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "LOGIN_OK")]
    LoginOk {
        team: String,
        species: String,
        #[serde(rename = "initialBalance")]
        initial_balance: f64,
        #[serde(rename = "currentBalance")]
        current_balance: f64,
        inventory: HashMap<String, i64>,
        #[serde(rename = "authorizedProducts")]
        authorized_products: Vec<String>,
        recipes: HashMap<String, Recipe>,
        role: Role,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "ORDER_ACK")]
    OrderAck {
        #[serde(rename = "clOrdID")]
        cl_ord_id: String,
        status: String,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "FILL")]
    Fill {
        #[serde(rename = "clOrdID")]
        cl_ord_id: String,
        #[serde(rename = "fillQty")]
        fill_qty: i64,
        #[serde(rename = "fillPrice")]
        fill_price: f64,
        side: String,
        product: String,
        counterparty: String,
        #[serde(rename = "counterpartyMessage")]
        counterparty_message: Option<String>,
        #[serde(rename = "remainingQty")]
        remaining_qty: Option<i64>,
        #[serde(rename = "totalQty")]
        total_qty: Option<i64>,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "TICKER")]
    Ticker {
        product: String,
        #[serde(rename = "bestBid")]
        best_bid: Option<f64>,
        #[serde(rename = "bestAsk")]
        best_ask: Option<f64>,
        mid: Option<f64>,
        #[serde(rename = "volume24h")]
        volume_24h: i64,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "ORDER_BOOK_UPDATE")]
    OrderBookUpdate {
        product: String,
        #[serde(rename = "buyOrders")]
        buy_orders: Vec<crate::matching::BookLevel>,
        #[serde(rename = "sellOrders")]
        sell_orders: Vec<crate::matching::BookLevel>,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "INVENTORY_UPDATE")]
    InventoryUpdate {
        inventory: HashMap<String, i64>,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "BALANCE_UPDATE")]
    BalanceUpdate {
        balance: f64,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "EVENT_DELTA")]
    EventDelta {
        events: Vec<ServerMessage>,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    #[serde(rename = "ERROR")]
    Error {
        code: String,
        reason: String,
        #[serde(rename = "clOrdID", skip_serializing_if = "Option::is_none")]
        cl_ord_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "PONG")]
    Pong { timestamp: DateTime<Utc> },
    /// Diagnostic reply to any well-formed message whose `type` isn't one
    /// the server recognizes (§4.1: "unknown types echo back a diagnostic
    /// ECHO -- never fatal").
    #[serde(rename = "ECHO")]
    Echo {
        #[serde(rename = "originalType")]
        original_type: String,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
    /// Reply to `REQUEST_CONNECTED_SESSIONS` (§4.1): the caller's own team's
    /// live socket count plus how many teams total have at least one socket
    /// open, both backed by `AuthService`'s session table.
    #[serde(rename = "CONNECTED_SESSIONS")]
    ConnectedSessions {
        #[serde(rename = "sessionCount")]
        session_count: usize,
        #[serde(rename = "connectedTeamCount")]
        connected_team_count: usize,
        #[serde(rename = "serverTime")]
        server_time: DateTime<Utc>,
    },
}

impl ServerMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        cl_ord_id: &str,
        fill_qty: i64,
        fill_price: f64,
        side: &str,
        product: &str,
        counterparty: &str,
        counterparty_message: Option<String>,
        server_time: DateTime<Utc>,
    ) -> Self {
        ServerMessage::Fill {
            cl_ord_id: cl_ord_id.to_string(),
            fill_qty,
            fill_price,
            side: side.to_string(),
            product: product.to_string(),
            counterparty: counterparty.to_string(),
            counterparty_message,
            remaining_qty: None,
            total_qty: None,
            server_time,
        }
    }

    pub fn order_book_update(snapshot: &OrderbookSnapshot, server_time: DateTime<Utc>) -> Self {
        ServerMessage::OrderBookUpdate {
            product: snapshot.product.clone(),
            buy_orders: snapshot.buy_orders.clone(),
            sell_orders: snapshot.sell_orders.clone(),
            server_time,
        }
    }

    pub fn error(code: &str, reason: &str, cl_ord_id: Option<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            reason: reason.to_string(),
            cl_ord_id,
            timestamp: Utc::now(),
        }
    }

    pub fn echo(original_type: &str) -> Self {
        ServerMessage::Echo {
            original_type: original_type.to_string(),
            server_time: Utc::now(),
        }
    }

    pub fn connected_sessions(session_count: usize, connected_team_count: usize) -> Self {
        ServerMessage::ConnectedSessions {
            session_count,
            connected_team_count,
            server_time: Utc::now(),
        }
    }
}
