use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};

use crate::websocket::handler::handle_socket;
use crate::AppState;

pub fn create_router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let router = state.message_router.clone();
    let read_timeout = Duration::from_secs(state.config.read_timeout_secs);
    let write_timeout = Duration::from_secs(state.config.write_timeout_secs);
    ws.on_upgrade(move |socket| handle_socket(socket, router, read_timeout, write_timeout))
}
