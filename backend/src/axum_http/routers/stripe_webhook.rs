use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
};
use fitcoach_shared::{
    domain::repositories::{
        payment_history::PaymentHistoryRepository, purchases::PurchaseRepository,
        stripe_customers::StripeCustomerRepository, subscriptions::SubscriptionRepository,
        user_notifications::UserNotificationRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            payment_history::PaymentHistoryPostgres, purchases::PurchasePostgres,
            stripe_customers::StripeCustomerPostgres, subscriptions::SubscriptionPostgres,
            user_notifications::UserNotificationPostgres,
        },
    },
    payments::stripe_client::StripeClient,
};
use serde_json::json;
use tracing::info;

use crate::usecases::{stripe_gateway::StripeGateway, stripe_webhook::StripeWebhookUseCase};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes(db_pool: Arc<PgPoolSquad>, stripe_client: Arc<StripeClient>) -> Router {
    let usecase = StripeWebhookUseCase::new(
        Arc::new(PaymentHistoryPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(StripeCustomerPostgres::new(Arc::clone(&db_pool))),
        Arc::new(UserNotificationPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PurchasePostgres::new(Arc::clone(&db_pool))),
        stripe_client,
    );

    router(Arc::new(usecase))
}

pub fn router<Hist, Sub, Cust, Notif, Purch, Stripe>(
    usecase: Arc<StripeWebhookUseCase<Hist, Sub, Cust, Notif, Purch, Stripe>>,
) -> Router
where
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Sub: SubscriptionRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Notif: UserNotificationRepository + Send + Sync + 'static,
    Purch: PurchaseRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(receive::<Hist, Sub, Cust, Notif, Purch, Stripe>))
        .with_state(usecase)
}

/// Takes the raw body: the signature covers the exact bytes Stripe sent.
pub async fn receive<Hist, Sub, Cust, Notif, Purch, Stripe>(
    State(usecase): State<Arc<StripeWebhookUseCase<Hist, Sub, Cust, Notif, Purch, Stripe>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Sub: SubscriptionRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Notif: UserNotificationRepository + Send + Sync + 'static,
    Purch: PurchaseRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    info!(body_bytes = body.len(), "stripe_webhook: delivery received");

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match usecase.handle_stripe_webhook(&body, signature).await {
        Ok(()) => Json(json!({ "received": true })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::test_support::InMemoryStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use fitcoach_shared::payments::stripe_client::signature_header;
    use serde_json::Value;
    use tower::ServiceExt;

    const WEBHOOK_SECRET: &str = "whsec_router_test";

    fn app(store: &Arc<InMemoryStore>) -> Router {
        let stripe = StripeClient::new(
            "sk_test_123".to_string(),
            WEBHOOK_SECRET.to_string(),
            "https://app.example.com/success".to_string(),
            "https://app.example.com/cancel".to_string(),
        );
        router(Arc::new(StripeWebhookUseCase::new(
            Arc::clone(store),
            Arc::clone(store),
            Arc::clone(store),
            Arc::clone(store),
            Arc::clone(store),
            Arc::new(stripe),
        )))
    }

    fn delivery(payload: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(signature) = signature {
            builder = builder.header(STRIPE_SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(payload.to_string())).unwrap()
    }

    fn ping_event() -> String {
        json!({
            "id": "evt_ping",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } }
        })
        .to_string()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn signed_delivery_is_acknowledged() {
        let store = Arc::new(InMemoryStore::new());
        let payload = ping_event();
        let signature =
            signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), payload.as_bytes()).unwrap();

        let response = app(&store)
            .oneshot(delivery(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({ "received": true }));
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let store = Arc::new(InMemoryStore::new());

        let response = app(&store)
            .oneshot(delivery(&ping_event(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forged_signature_is_rejected_without_writes() {
        let store = Arc::new(InMemoryStore::new());
        let payload = json!({
            "id": "evt_forged",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_forged",
                "mode": "subscription",
                "subscription": "sub_forged",
                "metadata": { "user_id": "8b0f5a3e-4a8e-4c55-9d55-3f1c6f0a2b11" }
            } }
        })
        .to_string();
        let signature =
            signature_header("whsec_attacker", Utc::now().timestamp(), payload.as_bytes()).unwrap();

        let response = app(&store)
            .oneshot(delivery(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.state().writes, 0);
    }

    #[tokio::test]
    async fn stale_signature_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let payload = ping_event();
        let an_hour_ago = Utc::now().timestamp() - 3600;
        let signature = signature_header(WEBHOOK_SECRET, an_hour_ago, payload.as_bytes()).unwrap();

        let response = app(&store)
            .oneshot(delivery(&payload, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
