//! C6 Broadcaster: `map<teamName, list<socket>>` (§4.3, §5).
//!
//! Grounded on the reference backend's per-socket split-sink write pattern
//! (`websocket/handler.rs`): each registered socket is represented by an
//! `UnboundedSender<Message>` feeding that socket's own writer task, so two
//! writes to the same socket never race (§5's write mutex requirement) and
//! a slow/dead socket never blocks a fan-out. Register/unregister take the
//! writer lock; fan-out takes a reader lock and sends off a local
//! snapshot, per §5's "reader/writer lock... writers only for
//! register/unregister".

use std::collections::HashMap;

use axum::extract::ws::Message;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::matching::{OrderbookSnapshot, TradeExecution};
use crate::websocket::messages::ServerMessage;

#[derive(Clone)]
struct Socket {
    id: Uuid,
    sender: UnboundedSender<Message>,
}

pub struct Broadcaster {
    sockets: RwLock<HashMap<String, Vec<Socket>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            sockets: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, team_name: &str, socket_id: Uuid, sender: UnboundedSender<Message>) {
        self.sockets
            .write()
            .entry(team_name.to_string())
            .or_default()
            .push(Socket { id: socket_id, sender });
    }

    pub fn unregister(&self, team_name: &str, socket_id: Uuid) {
        let mut guard = self.sockets.write();
        if let Some(list) = guard.get_mut(team_name) {
            list.retain(|s| s.id != socket_id);
            if list.is_empty() {
                guard.remove(team_name);
            }
        }
    }

    pub fn session_count(&self, team_name: &str) -> usize {
        self.sockets.read().get(team_name).map(Vec::len).unwrap_or(0)
    }

    /// Sends a close frame to one socket and drops it from the registry
    /// immediately, used when `AuthService` evicts the oldest session on
    /// overflow (§3).
    pub fn force_close(&self, team_name: &str, socket_id: Uuid) {
        let evicted = {
            let mut guard = self.sockets.write();
            let Some(list) = guard.get_mut(team_name) else { return };
            let idx = list.iter().position(|s| s.id == socket_id);
            let evicted = idx.map(|i| list.remove(i));
            if list.is_empty() {
                guard.remove(team_name);
            }
            evicted
        };
        if let Some(socket) = evicted {
            let _ = socket.sender.send(Message::Close(None));
        }
    }

    /// Sends `msg` to every live socket registered under `team_name`.
    /// Failures are collected and the offending sockets pruned; one dead
    /// socket never aborts delivery to the rest (§4.3).
    pub async fn send_to_client(&self, team_name: &str, msg: &impl Serialize) {
        let targets = {
            let guard = self.sockets.read();
            guard.get(team_name).cloned().unwrap_or_default()
        };
        if targets.is_empty() {
            return;
        }
        let Ok(text) = serde_json::to_string(msg) else { return };
        let mut dead = Vec::new();
        for socket in &targets {
            if socket.sender.send(Message::Text(text.clone())).is_err() {
                dead.push(socket.id);
            }
        }
        if !dead.is_empty() {
            let mut guard = self.sockets.write();
            if let Some(list) = guard.get_mut(team_name) {
                list.retain(|s| !dead.contains(&s.id));
            }
            debug!(team = team_name, pruned = dead.len(), "pruned dead sockets");
        }
    }

    /// Best-effort fan-out to every registered team (§4.3, §4.7 ticker).
    pub async fn broadcast_to_all(&self, msg: &impl Serialize) {
        let Ok(text) = serde_json::to_string(msg) else { return };
        let snapshot: Vec<(String, Vec<Socket>)> = {
            let guard = self.sockets.read();
            guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        for (team_name, sockets) in snapshot {
            let mut dead = Vec::new();
            for socket in &sockets {
                if socket.sender.send(Message::Text(text.clone())).is_err() {
                    dead.push(socket.id);
                }
            }
            if !dead.is_empty() {
                let mut guard = self.sockets.write();
                if let Some(list) = guard.get_mut(&team_name) {
                    list.retain(|s| !dead.contains(&s.id));
                }
            }
        }
    }

    /// Emits a `FILL` to both sides of a trade, each from its own
    /// perspective (§4.4 step 3, §6).
    pub async fn send_fill_for_trade(&self, trade: &TradeExecution, product: &str) {
        let now = chrono::Utc::now();
        self.send_to_client(
            &trade.buyer,
            &ServerMessage::fill(&trade.buyer_cl_ord_id, trade.quantity, trade.price, "BUY", product, &trade.seller, None, now),
        )
        .await;
        self.send_to_client(
            &trade.seller,
            &ServerMessage::fill(&trade.seller_cl_ord_id, trade.quantity, trade.price, "SELL", product, &trade.buyer, None, now),
        )
        .await;
    }

    pub async fn broadcast_order_book(&self, snapshot: &OrderbookSnapshot) {
        self.broadcast_to_all(&ServerMessage::order_book_update(snapshot, chrono::Utc::now()))
            .await;
    }
}
