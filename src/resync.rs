//! C11 ResyncService: an ordered replay of fills affecting a team since a
//! timestamp, marking side and counterparty from that team's perspective
//! (§4.6).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::store::Store;
use crate::websocket::messages::ServerMessage;

pub struct ResyncService {
    store: Arc<Store>,
    default_lookback: Duration,
}

impl ResyncService {
    pub fn new(store: Arc<Store>, default_lookback_secs: i64) -> Self {
        Self {
            store,
            default_lookback: Duration::seconds(default_lookback_secs),
        }
    }

    /// Builds the `EVENT_DELTA` payload for `RESYNC(lastSync)`. An absent
    /// or unparseable `lastSync` never fails the request; it falls back to
    /// `default_lookback` (§4.6).
    pub async fn resync(&self, team_name: &str, last_sync: Option<DateTime<Utc>>) -> ServerMessage {
        let since = last_sync.unwrap_or_else(|| Utc::now() - self.default_lookback);
        let fills = self.store.fills_since(team_name, since).await.unwrap_or_default();

        let events = fills
            .iter()
            .filter_map(|fill| {
                let side = fill.side_for(team_name)?;
                let cl_ord_id = fill.cl_ord_id_of(team_name)?.to_string();
                let counterparty = fill.counterparty_of(team_name)?.to_string();
                Some(ServerMessage::fill(
                    &cl_ord_id,
                    fill.quantity,
                    fill.price,
                    match side {
                        crate::models::OrderSide::Buy => "BUY",
                        crate::models::OrderSide::Sell => "SELL",
                    },
                    &fill.product,
                    &counterparty,
                    fill.counterparty_message_of(team_name).map(str::to_string),
                    fill.executed_at,
                ))
            })
            .collect();

        ServerMessage::EventDelta {
            events,
            server_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fill, OrderSide};
    use uuid::Uuid;

    #[tokio::test]
    async fn resync_returns_only_fills_after_watermark() {
        let store = Arc::new(Store::new_in_memory());
        let t1 = Utc::now() - Duration::seconds(20);
        let t = Utc::now() - Duration::seconds(10);
        let t2 = Utc::now();

        let fill_before = Fill {
            id: Uuid::new_v4(),
            buyer: "teamA".to_string(),
            seller: "teamB".to_string(),
            buyer_cl_ord_id: "A1".to_string(),
            seller_cl_ord_id: "B1".to_string(),
            product: "GUACA".to_string(),
            quantity: 1,
            price: 10.0,
            executed_at: t1,
            buyer_message: None,
            seller_message: None,
        };
        let fill_after = Fill {
            id: Uuid::new_v4(),
            buyer: "teamB".to_string(),
            seller: "teamA".to_string(),
            buyer_cl_ord_id: "B2".to_string(),
            seller_cl_ord_id: "A2".to_string(),
            product: "GUACA".to_string(),
            quantity: 2,
            price: 11.0,
            executed_at: t2,
            buyer_message: None,
            seller_message: None,
        };
        store.seed_fill_for_test(fill_before).await;
        store.seed_fill_for_test(fill_after).await;

        let resync = ResyncService::new(store, 86_400);
        let ServerMessage::EventDelta { events, .. } = resync.resync("teamA", Some(t)).await else {
            panic!("expected EventDelta");
        };
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerMessage::Fill { side, .. } => assert_eq!(side, "SELL"),
            _ => panic!("expected Fill"),
        }
        let _ = OrderSide::Buy;
    }
}
