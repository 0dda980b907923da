//! Thin HTTP/WebSocket transport binding (spec §4.11, new/ambient):
//! translates requests into calls on `SubscriptionManager`/`Store`. No
//! business logic lives here.

pub mod http;
pub mod response;
pub mod state;
pub mod ws;

pub use state::GatewayState;

use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full router (spec §6 "Downstream — Subscription REST API" and
/// "Downstream — WebSocket channel"), grounded in the teacher's
/// `build_router` (`services/server/src/lib.rs`).
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route(
            "/api/v1/subscriptions",
            post(http::subscriptions::create_subscription).get(http::subscriptions::list_subscriptions),
        )
        .route("/api/v1/subscriptions/stats", get(http::subscriptions::subscription_stats))
        .route(
            "/api/v1/subscriptions/:subscriber_id",
            delete(http::subscriptions::delete_subscriber),
        )
        .route(
            "/api/v1/subscriptions/:subscription_id/preload",
            post(http::subscriptions::preload_subscription),
        )
        .route("/ws/v1/killmails", get(ws::lobby_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

mod health {
    use super::IntoResponse;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
}
