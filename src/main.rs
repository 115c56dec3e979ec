use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod broadcaster;
mod config;
mod matching;
mod metrics;
mod models;
mod offer;
mod production;
mod ratelimit;
mod resync;
mod store;
mod ticker;
mod utils;
mod websocket;

use crate::auth::AuthService;
use crate::broadcaster::Broadcaster;
use crate::config::AppConfig;
use crate::matching::MatchingEngine;
use crate::offer::OfferEngine;
use crate::production::ProductionEngine;
use crate::ratelimit::RateLimiter;
use crate::resync::ResyncService;
use crate::store::Store;
use crate::ticker::TickerService;
use crate::websocket::router::MessageRouter;

/// Shared process state, handed to every axum handler and the websocket
/// upgrade route behind one `Arc` (§B.1).
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub matching_engine: Arc<MatchingEngine>,
    pub broadcaster: Arc<Broadcaster>,
    pub message_router: Arc<MessageRouter>,
    pub metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "classroom_exchange=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;
    tracing::info!("starting classroom-exchange v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = crate::metrics::init_metrics();

    let store = Arc::new(if let Some(url) = &config.database_url {
        tracing::info!("connecting to persistent store");
        Store::connect(url).await?
    } else {
        tracing::warn!("DATABASE_URL not set; running with the in-memory store (local/offline demo mode)");
        Store::new_in_memory()
    });

    if config.debug_mode_default {
        let _ = store.set_debug_mode(true, "startup").await;
    }

    let broadcaster = Arc::new(Broadcaster::new());
    let matching_engine = Arc::new(MatchingEngine::new(&config.products, store.clone(), broadcaster.clone()));
    let auth_service = Arc::new(AuthService::new(store.clone(), config.max_sessions_per_team));
    let rate_limiter = Arc::new(RateLimiter::new(config.orders_per_min));
    let production = Arc::new(ProductionEngine::new(store.clone(), broadcaster.clone(), config.products.clone()));
    let resync = Arc::new(ResyncService::new(store.clone(), config.resync_default_lookback_secs));
    let ticker = Arc::new(TickerService::new(matching_engine.clone(), broadcaster.clone()));
    matching_engine.set_ticker(ticker.clone());
    let offers = Arc::new(OfferEngine::new(store.clone(), matching_engine.clone(), broadcaster.clone()));

    let message_router = Arc::new(MessageRouter {
        store: store.clone(),
        auth: auth_service.clone(),
        rate_limiter: rate_limiter.clone(),
        matching_engine: matching_engine.clone(),
        broadcaster: broadcaster.clone(),
        production: production.clone(),
        resync: resync.clone(),
        ticker: ticker.clone(),
        offers: offers.clone(),
    });

    // §5/§B.4: the ticker loop observes a `watch` shutdown signal and exits
    // before the process terminates; Ctrl-C/SIGTERM triggers it below.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let ticker_task = {
        let ticker = ticker.clone();
        let period = Duration::from_secs(config.ticker_interval_secs);
        tokio::spawn(async move { ticker.run(period, shutdown_rx).await })
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        store: store.clone(),
        matching_engine,
        broadcaster,
        message_router,
        metrics_handle,
    });

    let app = Router::new()
        .merge(api::routes::create_router(state.clone()))
        .merge(websocket::routes::create_router(state.clone()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("shutting down, signaling background tasks");
    let _ = shutdown_tx.send(true);
    let _ = ticker_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
