//! C12 TickerService: periodic bestBid/bestAsk/mid/volume24h derivation
//! per product, broadcast to all sockets (§4.7).
//!
//! 24h volume is maintained incrementally: each trade appends a
//! `(timestamp, quantity)` sample; the periodic tick decays samples older
//! than 24h by dropping them, per §4.7's "decaying entries older than
//! 24h" — avoids rescanning FillStore every tick.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use crate::broadcaster::Broadcaster;
use crate::matching::MatchingEngine;
use crate::websocket::messages::ServerMessage;

struct VolumeWindow {
    samples: Mutex<Vec<(DateTime<Utc>, i64)>>,
}

impl VolumeWindow {
    fn new() -> Self {
        Self { samples: Mutex::new(Vec::new()) }
    }

    fn record(&self, qty: i64) {
        self.samples.lock().push((Utc::now(), qty));
    }

    fn total_and_decay(&self) -> i64 {
        let cutoff = Utc::now() - Duration::hours(24);
        let mut guard = self.samples.lock();
        guard.retain(|(at, _)| *at > cutoff);
        guard.iter().map(|(_, qty)| qty).sum()
    }
}

pub struct TickerService {
    matching_engine: Arc<MatchingEngine>,
    broadcaster: Arc<Broadcaster>,
    volumes: DashMap<String, Arc<VolumeWindow>>,
}

impl TickerService {
    pub fn new(matching_engine: Arc<MatchingEngine>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            matching_engine,
            broadcaster,
            volumes: DashMap::new(),
        }
    }

    pub fn record_trade(&self, product: &str, quantity: i64) {
        self.volumes
            .entry(product.to_string())
            .or_insert_with(|| Arc::new(VolumeWindow::new()))
            .record(quantity);
    }

    /// Runs until `shutdown` resolves (§5: "ticker loop... observe a
    /// shutdown signal and exit before the process terminates").
    pub async fn run(self: Arc<Self>, period: StdDuration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("ticker service shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        for product in self.matching_engine.products() {
            let Some((best_bid, best_ask)) = self.matching_engine.best_bid_ask(&product) else { continue };
            let mid = match (best_bid, best_ask) {
                (Some(b), Some(a)) => Some((b + a) / 2.0),
                _ => None,
            };
            let volume_24h = self
                .volumes
                .get(&product)
                .map(|w| w.total_and_decay())
                .unwrap_or(0);

            self.broadcaster
                .broadcast_to_all(&ServerMessage::Ticker {
                    product: product.clone(),
                    best_bid,
                    best_ask,
                    mid,
                    volume_24h,
                    server_time: Utc::now(),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_window_sums_recent_samples() {
        let window = VolumeWindow::new();
        window.record(10);
        window.record(5);
        assert_eq!(window.total_and_decay(), 15);
    }

    #[tokio::test]
    async fn run_exits_promptly_on_shutdown() {
        let store = Arc::new(crate::store::Store::new_in_memory());
        let broadcaster = Arc::new(Broadcaster::new());
        let engine = Arc::new(MatchingEngine::new(&["GUACA".to_string()], store, broadcaster.clone()));
        let ticker = Arc::new(TickerService::new(engine, broadcaster));

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn({
            let ticker = ticker.clone();
            async move { ticker.run(StdDuration::from_secs(60), rx).await }
        });
        tx.send(true).unwrap();
        tokio::time::timeout(StdDuration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
