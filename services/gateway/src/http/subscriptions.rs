//! Subscription REST endpoints (spec §6 "Downstream — Subscription REST
//! API"). Thin translation only — all validation and matching logic lives
//! in `wk_subscriptions::SubscriptionManager`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use wk_types::SubscriptionRequest;

use crate::response::{bad_request, from_error_kind};
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionBody {
    pub subscriber_id: String,
    #[serde(default)]
    pub system_ids: Vec<u32>,
    #[serde(default)]
    pub character_ids: Vec<u64>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSubscriptionResponse {
    subscription_id: String,
    message: String,
}

/// `POST /api/v1/subscriptions` (spec §6).
pub async fn create_subscription(
    State(state): State<GatewayState>,
    Json(body): Json<CreateSubscriptionBody>,
) -> axum::response::Response {
    if body.subscriber_id.trim().is_empty() {
        return bad_request("subscriber_id is required");
    }
    let request = SubscriptionRequest {
        subscriber_id: body.subscriber_id,
        system_ids: body.system_ids,
        character_ids: body.character_ids,
        callback_url: body.callback_url,
    };
    match state.subscriptions.subscribe(request) {
        Ok(subscription_id) => (
            StatusCode::CREATED,
            Json(CreateSubscriptionResponse {
                subscription_id,
                message: "subscription created".to_owned(),
            }),
        )
            .into_response(),
        Err(e) => from_error_kind(e),
    }
}

#[derive(Debug, Serialize)]
struct ListSubscriptionsResponse {
    subscriptions: Vec<wk_types::Subscription>,
    count: usize,
}

/// `GET /api/v1/subscriptions` (spec §6).
pub async fn list_subscriptions(State(state): State<GatewayState>) -> impl IntoResponse {
    let subscriptions = state.subscriptions.list();
    let count = subscriptions.len();
    Json(ListSubscriptionsResponse { subscriptions, count })
}

#[derive(Debug, Serialize)]
struct SubscriptionStatsResponse {
    total_subscriptions: usize,
    http_subscriptions: usize,
    websocket_subscriptions: usize,
}

/// `GET /api/v1/subscriptions/stats` (spec §6).
pub async fn subscription_stats(State(state): State<GatewayState>) -> impl IntoResponse {
    let stats = state.subscriptions.stats();
    Json(SubscriptionStatsResponse {
        total_subscriptions: stats.total_subscriptions,
        http_subscriptions: stats.http_subscriptions,
        websocket_subscriptions: stats.websocket_subscriptions,
    })
}

/// `DELETE /api/v1/subscriptions/{subscriber_id}` (spec §6: keyed by the
/// caller's `subscriber_id`, not an individual `subscription_id` — one
/// caller may hold several subscriptions, all removed together).
pub async fn delete_subscriber(
    State(state): State<GatewayState>,
    Path(subscriber_id): Path<String>,
) -> impl IntoResponse {
    state.subscriptions.unsubscribe_subscriber(&subscriber_id);
    StatusCode::OK
}

/// `POST /api/v1/subscriptions/{subscription_id}/preload` (ambient addition,
/// SPEC_FULL.md §4.11: the gateway is the only caller that can trigger
/// `SubscriptionManager::preload`, since it runs only on a client's
/// explicit request after subscribing).
pub async fn preload_subscription(
    State(state): State<GatewayState>,
    Path(subscription_id): Path<String>,
) -> impl IntoResponse {
    if state.subscriptions.get(&subscription_id).is_none() {
        return crate::response::not_found("unknown subscription");
    }
    state.subscriptions.preload(&subscription_id).await;
    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wk_cache::Cache;
    use wk_store::Store;
    use wk_subscriptions::{Broadcaster, PreloadConfig, SubscriptionManager, WebhookConfig, WebhookNotifier};

    fn state() -> GatewayState {
        GatewayState {
            store: Arc::new(Store::new()),
            subscriptions: Arc::new(SubscriptionManager::new(
                Arc::new(Store::new()),
                Arc::new(Cache::new()),
                Arc::new(Broadcaster::new()),
                WebhookNotifier::new(WebhookConfig {
                    workers: 0,
                    ..WebhookConfig::default()
                }),
                PreloadConfig::default(),
            )),
        }
    }

    fn router() -> axum::Router {
        axum::Router::new()
            .route("/api/v1/subscriptions", axum::routing::post(create_subscription).get(list_subscriptions))
            .route("/api/v1/subscriptions/stats", axum::routing::get(subscription_stats))
            .route("/api/v1/subscriptions/:subscriber_id", axum::routing::delete(delete_subscriber))
            .with_state(state())
    }

    #[tokio::test]
    async fn create_then_list_subscription() {
        let app = router();
        let body = serde_json::json!({
            "subscriber_id": "u1",
            "system_ids": [30000142],
            "callback_url": "https://example.com/cb",
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/subscriptions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(Request::get("/api/v1/subscriptions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["count"], 1);
    }

    #[tokio::test]
    async fn create_rejects_missing_subscriber_id() {
        let app = router();
        let body = serde_json::json!({"system_ids": [1]});
        let response = app
            .oneshot(
                Request::post("/api/v1/subscriptions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_subscriber_is_idempotent() {
        let app = router();
        let response = app
            .oneshot(
                Request::delete("/api/v1/subscriptions/unknown-subscriber")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
