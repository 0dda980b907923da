use std::sync::Arc;

use wk_store::Store;
use wk_subscriptions::SubscriptionManager;

/// Everything an axum handler needs: a handle to the event log and the
/// subscription manager that owns both indexes, the Broadcaster, and the
/// WebhookNotifier. `GatewayState` itself holds no state of its own —
/// per §4.11, the transport layer is a binding, not an owner.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<Store>,
    pub subscriptions: Arc<SubscriptionManager>,
}
