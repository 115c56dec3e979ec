//! C10 SessionHandler: per-socket read loop, write serialization, ping/pong,
//! deadline management (§4.2, §5).
//!
//! Grounded on the reference backend's split-sink `tokio::select!` loop
//! (`websocket/handler.rs::handle_socket`): a dedicated writer task owns
//! the socket's write half and drains an `mpsc` channel, so two writes to
//! the same socket never race; the reader task owns dispatch. Read/write
//! deadlines are enforced with `tokio::time::timeout` around each
//! `receiver.next()` / `sender.send()` (§5 "read timeouts expire idle
//! sockets... write timeouts mark a socket dead").

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::router::{MessageRouter, RouterSession};

pub async fn handle_socket(socket: WebSocket, router: Arc<MessageRouter>, read_timeout: Duration, write_timeout: Duration) {
    let (mut sink, mut stream) = socket.split();
    let socket_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if tokio::time::timeout(write_timeout, sink.send(msg)).await.is_err() {
                warn!(socket = %socket_id, "write timed out; socket considered dead");
                break;
            }
        }
    });

    let mut session = RouterSession { socket_id, team: None };
    let mut registered = false;

    loop {
        let next = tokio::time::timeout(read_timeout, stream.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                debug!(socket = %socket_id, error = %err, "socket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(socket = %socket_id, "read deadline expired; closing idle session");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                let replies = router.handle_text(&mut session, &text).await;

                if !registered {
                    if let Some(team) = &session.team {
                        router.broadcaster.register(&team.team_name, socket_id, tx.clone());
                        registered = true;
                    }
                }

                for reply in replies {
                    if let Ok(text) = serde_json::to_string(&reply) {
                        if tx.send(Message::Text(text)).is_err() {
                            break;
                        }
                    }
                }
            }
            Message::Ping(payload) => {
                let _ = tx.send(Message::Pong(payload));
            }
            Message::Close(_) => break,
            Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    if let Some(team) = &session.team {
        router.auth.end_session(&team.team_name, socket_id);
        router.broadcaster.unregister(&team.team_name, socket_id);
    }
    drop(tx);
    let _ = writer.await;
}
