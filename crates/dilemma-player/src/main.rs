//! Dilemma Player Service
//!
//! HTTP front-end for one player of the classroom Prisoner's Dilemma game.
//! All authoritative state lives in the hosted backend; this service owns
//! the session, the deal protocol and the view panels.

mod handlers;
mod refresh;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use dilemma_core::{Backend, DealEngine, EngineConfig, MockBackend, RpcBackend, SessionStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use handlers::*;
use state::AppState;

/// How often the shared refresh loop polls the backend.
const REFRESH_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend: Arc<dyn Backend> = if let Ok(url) = std::env::var("BACKEND_RPC_URL") {
        tracing::info!("using hosted backend at {}", url);
        Arc::new(RpcBackend::new(url))
    } else {
        tracing::info!("BACKEND_RPC_URL not set, running the demo classroom");
        Arc::new(demo_classroom())
    };

    let session_path = std::env::var("SESSION_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| SessionStore::default_path());
    let store = SessionStore::new(session_path);

    let state = AppState::new(backend, store);
    restore_session(&state).await;

    refresh::spawn_refresh_task(state.clone(), REFRESH_PERIOD);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        // Session
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/me", get(me))
        // Roster & rating
        .route("/api/players", get(players))
        .route("/api/leaderboard", get(leaderboard))
        // Deals
        .route("/api/deals", post(propose_deal))
        .route("/api/deals", get(my_deals))
        .route("/api/deals/active/cancel", post(cancel_active_deal))
        .route("/api/deals/:id", get(get_deal))
        .route("/api/deals/:id/respond", post(respond_to_deal))
        // Shop
        .route("/api/products", get(products))
        .route("/api/purchase", post(purchase))
        .route("/api/orders", get(my_orders))
        // Admin
        .route("/api/admin/orders", get(all_orders))
        .route("/api/admin/orders/:id/confirm", post(confirm_order))
        .route("/api/admin/orders/:id/cancel", post(cancel_order))
        // Deposits
        .route("/api/deposits", post(open_deposit))
        .route("/api/deposits", get(my_deposits))
        // Health
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("player service starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Log back in with the saved player code, if one survives from last run.
async fn restore_session(state: &AppState) {
    let Some(session) = state.store.load() else {
        return;
    };
    match state.backend.login(&session.code).await {
        Ok(profile) => {
            tracing::info!(player = %profile.code, "restored session");
            state.set_engine(Some(Arc::new(DealEngine::new(
                state.backend.clone(),
                session,
                EngineConfig::default(),
            ))));
        }
        Err(e) => {
            tracing::warn!(error = %e, "saved session no longer valid");
            let _ = state.store.clear();
        }
    }
}

/// A seeded classroom for running without a hosted backend.
fn demo_classroom() -> MockBackend {
    let backend = MockBackend::new();

    backend.register_player("7B-ADA", "Ada", "7B", "#e74c3c", 100);
    backend.register_player("7B-BEN", "Ben", "7B", "#3498db", 100);
    backend.register_player("7B-CLEO", "Cleo", "7B", "#2ecc71", 100);
    backend.register_player("7A-DAN", "Dan", "7A", "#f1c40f", 100);

    backend.add_product("Homework pass", 50, Some(10));
    backend.add_product("Front row seat for a week", 30, Some(4));
    backend.add_product("Choose the class playlist", 20, None);
    tracing::info!("seeded 4 demo players and 3 products");

    backend
}
