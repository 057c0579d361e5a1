use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use super::*;
use crate::usecases::{stripe_gateway::MockStripeGateway, test_support::InMemoryStore};
use anyhow::anyhow;
use chrono::Utc;
use fitcoach_shared::{
    domain::entities::payment_history::PaymentHistoryEntity,
    payments::stripe_client::StripeCustomer,
};
use serde_json::Value;

type Webhook<Notif = InMemoryStore> = StripeWebhookUseCase<
    InMemoryStore,
    InMemoryStore,
    InMemoryStore,
    Notif,
    InMemoryStore,
    MockStripeGateway,
>;

fn webhook(store: &Arc<InMemoryStore>, stripe: MockStripeGateway) -> Webhook {
    webhook_notifying(store, Arc::clone(store), stripe)
}

fn webhook_notifying<Notif>(
    store: &Arc<InMemoryStore>,
    notifications: Arc<Notif>,
    stripe: MockStripeGateway,
) -> Webhook<Notif>
where
    Notif: UserNotificationRepository + Send + Sync + 'static,
{
    StripeWebhookUseCase::new(
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
        notifications,
        Arc::clone(store),
        Arc::new(stripe),
    )
}

/// Loses the first notification insert, then writes through to the store.
struct FirstInsertFails {
    store: Arc<InMemoryStore>,
    failed: AtomicBool,
}

impl FirstInsertFails {
    fn new(store: &Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::clone(store),
            failed: AtomicBool::new(false),
        })
    }
}

#[async_trait::async_trait]
impl UserNotificationRepository for FirstInsertFails {
    async fn create_notification(
        &self,
        notification: InsertUserNotificationEntity,
    ) -> anyhow::Result<bool> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("connection reset by peer"));
        }
        self.store.create_notification(notification).await
    }
}

fn event(event_type: &str, object: Value, previous_attributes: Option<Value>) -> Value {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": object, "previous_attributes": previous_attributes }
    })
}

/// A gateway whose signature check accepts and yields `event`.
fn verifying(event: Value) -> MockStripeGateway {
    let mut stripe = MockStripeGateway::new();
    stripe
        .expect_verify_webhook_signature()
        .returning(move |_, _| Ok(serde_json::from_value(event.clone()).unwrap()));
    stripe
}

fn stripe_subscription(status: &str, cancel_at_period_end: bool) -> Value {
    json!({
        "id": "sub_123",
        "status": status,
        "customer": "cus_123",
        "cancel_at_period_end": cancel_at_period_end,
        "items": { "data": [{
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "price": { "id": "price_pro" }
        }] }
    })
}

fn checkout_session(user_id: Uuid, quiz_result_id: Uuid, addons: &str) -> Value {
    json!({
        "id": "cs_test_1",
        "mode": "subscription",
        "subscription": "sub_123",
        "customer": "cus_123",
        "customer_email": "Client@Example.com",
        "amount_total": 6400,
        "currency": "usd",
        "metadata": {
            "user_id": user_id.to_string(),
            "plan_id": "pro",
            "addons": addons,
            "quiz_result_id": quiz_result_id.to_string(),
        }
    })
}

fn seed_pending_checkout(store: &InMemoryStore, user_id: Uuid) {
    let now = Utc::now();
    store.state().history.push(PaymentHistoryEntity {
        id: Uuid::new_v4(),
        user_id,
        amount_minor: 1500,
        currency: "usd".to_string(),
        status: "pending".to_string(),
        description: None,
        metadata: json!({ CHECKOUT_SESSION_ID_KEY: "cs_test_1" }),
        created_at: now,
        updated_at: now,
    });
}

#[tokio::test]
async fn missing_signature_is_rejected_before_verification() {
    let store = Arc::new(InMemoryStore::new());
    let usecase = webhook(&store, MockStripeGateway::new());

    let err = usecase
        .handle_stripe_webhook(b"{}", None)
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::MissingSignature));
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_signature_never_touches_the_store() {
    let store = Arc::new(InMemoryStore::new());
    let mut stripe = MockStripeGateway::new();
    stripe
        .expect_verify_webhook_signature()
        .times(1)
        .returning(|_, _| Err(anyhow!("invalid webhook signature")));
    let usecase = webhook(&store, stripe);

    let err = usecase
        .handle_stripe_webhook(b"{\"type\":\"checkout.session.completed\"}", Some("t=1,v1=00"))
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::InvalidSignature));
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(store.state().writes, 0);
}

#[tokio::test]
async fn redelivered_checkout_completion_is_applied_once() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let quiz_result_id = store.seed_quiz_result();
    seed_pending_checkout(&store, user_id);

    let addons = r#"[{"id":"meal-plan","name":"Meal plan","priceId":"price_meal","amount":1500}]"#;
    let mut stripe = verifying(event(
        CHECKOUT_SESSION_COMPLETED,
        checkout_session(user_id, quiz_result_id, addons),
        None,
    ));
    stripe
        .expect_retrieve_subscription()
        .withf(|id| id.to_string() == "sub_123")
        .times(2)
        .returning(|_| Ok(serde_json::from_value(stripe_subscription("active", false)).unwrap()));
    let usecase = webhook(&store, stripe);

    for _ in 0..2 {
        usecase
            .handle_stripe_webhook(b"payload", Some("t=1,v1=ok"))
            .await
            .unwrap();
    }

    let state = store.state();
    assert_eq!(state.subscriptions.len(), 1);
    let subscription = &state.subscriptions[0];
    assert_eq!(subscription.stripe_subscription_id, "sub_123");
    assert_eq!(subscription.status, "active");
    assert_eq!(subscription.user_id, user_id);
    assert_eq!(subscription.plan_id.as_deref(), Some("pro"));
    assert!(subscription.current_period_end.is_some());

    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].notification_type, "success");

    assert_eq!(state.addon_purchases.len(), 1);
    assert_eq!(state.addon_purchases[0].addon_id, "meal-plan");
    assert!(state.quiz_results[&quiz_result_id]);

    assert_eq!(state.history[0].status, "completed");
    assert_eq!(state.history[0].amount_minor, 6400);

    assert_eq!(state.customers.len(), 1);
    assert_eq!(state.customers[0].user_id, Some(user_id));
    assert_eq!(state.customers[0].email.as_deref(), Some("client@example.com"));
}

#[tokio::test]
async fn checkout_notification_survives_a_failed_first_delivery() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let mut stripe = verifying(event(
        CHECKOUT_SESSION_COMPLETED,
        checkout_session(user_id, Uuid::new_v4(), ""),
        None,
    ));
    stripe
        .expect_retrieve_subscription()
        .times(3)
        .returning(|_| Ok(serde_json::from_value(stripe_subscription("active", false)).unwrap()));
    let usecase = webhook_notifying(&store, FirstInsertFails::new(&store), stripe);

    let err = usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::Internal(_)));
    assert_eq!(store.state().subscriptions.len(), 1);
    assert!(store.state().notifications.is_empty());

    for _ in 0..2 {
        usecase
            .handle_stripe_webhook(b"payload", Some("sig"))
            .await
            .unwrap();
    }

    let state = store.state();
    assert_eq!(state.subscriptions.len(), 1);
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].notification_type, "success");
    assert_eq!(
        state.notifications[0].dedupe_key.as_deref(),
        Some("subscription_activated:sub_123")
    );
}

#[tokio::test]
async fn malformed_addons_degrade_to_none() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let mut stripe = verifying(event(
        CHECKOUT_SESSION_COMPLETED,
        checkout_session(user_id, Uuid::new_v4(), "not-json"),
        None,
    ));
    stripe
        .expect_retrieve_subscription()
        .returning(|_| Ok(serde_json::from_value(stripe_subscription("trialing", false)).unwrap()));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    let state = store.state();
    assert!(state.addon_purchases.is_empty());
    assert_eq!(state.subscriptions[0].status, "trialing");
}

#[tokio::test]
async fn payment_mode_checkout_is_acknowledged_without_writes() {
    let store = Arc::new(InMemoryStore::new());
    let stripe = verifying(event(
        CHECKOUT_SESSION_COMPLETED,
        json!({ "id": "cs_once", "mode": "payment", "metadata": {} }),
        None,
    ));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    assert_eq!(store.state().writes, 0);
}

#[tokio::test]
async fn payment_mode_checkout_completes_its_history_row() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    seed_pending_checkout(&store, user_id);
    let stripe = verifying(event(
        CHECKOUT_SESSION_COMPLETED,
        json!({ "id": "cs_test_1", "mode": "payment", "amount_total": 1500, "metadata": {} }),
        None,
    ));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    let state = store.state();
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].status, "completed");
    assert!(state.subscriptions.is_empty());
    assert!(state.notifications.is_empty());
}

#[tokio::test]
async fn checkout_without_user_is_a_handler_error() {
    let store = Arc::new(InMemoryStore::new());
    let stripe = verifying(event(
        CHECKOUT_SESSION_COMPLETED,
        json!({ "id": "cs_1", "mode": "subscription", "subscription": "sub_123", "metadata": {} }),
        None,
    ));
    let usecase = webhook(&store, stripe);

    let err = usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::MalformedEvent(_)));
    assert_eq!(
        err.status_code(),
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn scheduling_cancellation_notifies_will_end() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    store.seed_subscription(user_id, "sub_123", "active");
    let stripe = verifying(event(
        SUBSCRIPTION_UPDATED,
        stripe_subscription("active", true),
        Some(json!({ "cancel_at_period_end": false })),
    ));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    let state = store.state();
    assert!(state.subscriptions[0].cancel_at_period_end);
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].notification_type, "info");
    assert_eq!(state.notifications[0].title, "Subscription will end");
}

#[tokio::test]
async fn reverting_cancellation_notifies_renewed() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    store.seed_subscription(user_id, "sub_123", "active");
    let stripe = verifying(event(
        SUBSCRIPTION_UPDATED,
        stripe_subscription("active", false),
        Some(json!({ "cancel_at_period_end": true })),
    ));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    let state = store.state();
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].notification_type, "success");
    assert_eq!(state.notifications[0].title, "Subscription renewed");
}

#[tokio::test]
async fn status_change_without_cancel_flip_is_silent() {
    let store = Arc::new(InMemoryStore::new());
    store.seed_subscription(Uuid::new_v4(), "sub_123", "active");
    let stripe = verifying(event(
        SUBSCRIPTION_UPDATED,
        stripe_subscription("past_due", false),
        Some(json!({ "status": "active" })),
    ));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    let state = store.state();
    assert_eq!(state.subscriptions[0].status, "past_due");
    assert!(state.notifications.is_empty());
}

#[tokio::test]
async fn update_for_unknown_subscription_is_a_no_op() {
    let store = Arc::new(InMemoryStore::new());
    let stripe = verifying(event(
        SUBSCRIPTION_UPDATED,
        stripe_subscription("active", true),
        Some(json!({ "cancel_at_period_end": false })),
    ));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    assert_eq!(store.state().writes, 0);
}

#[tokio::test]
async fn canceled_subscription_cannot_be_reactivated() {
    let store = Arc::new(InMemoryStore::new());
    store.seed_subscription(Uuid::new_v4(), "sub_123", "canceled");
    let stripe = verifying(event(
        SUBSCRIPTION_UPDATED,
        stripe_subscription("active", false),
        None,
    ));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    let state = store.state();
    assert_eq!(state.subscriptions[0].status, "canceled");
    assert_eq!(state.writes, 0);
}

#[tokio::test]
async fn deletion_cancels_and_notifies_once() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    store.seed_subscription(user_id, "sub_123", "active");
    let stripe = verifying(event(
        SUBSCRIPTION_DELETED,
        stripe_subscription("canceled", false),
        None,
    ));
    let usecase = webhook(&store, stripe);

    for _ in 0..2 {
        usecase
            .handle_stripe_webhook(b"payload", Some("sig"))
            .await
            .unwrap();
    }

    let state = store.state();
    assert_eq!(state.subscriptions[0].status, "canceled");
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].user_id, user_id);
    assert_eq!(state.notifications[0].title, "Subscription ended");
}

#[tokio::test]
async fn ended_notification_survives_a_failed_first_delivery() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    store.seed_subscription(user_id, "sub_123", "active");
    let stripe = verifying(event(
        SUBSCRIPTION_DELETED,
        stripe_subscription("canceled", false),
        None,
    ));
    let usecase = webhook_notifying(&store, FirstInsertFails::new(&store), stripe);

    assert!(
        usecase
            .handle_stripe_webhook(b"payload", Some("sig"))
            .await
            .is_err()
    );
    assert_eq!(store.state().subscriptions[0].status, "canceled");

    for _ in 0..2 {
        usecase
            .handle_stripe_webhook(b"payload", Some("sig"))
            .await
            .unwrap();
    }

    let state = store.state();
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].title, "Subscription ended");
}

fn failed_invoice() -> Value {
    json!({
        "id": "in_failed",
        "status": "open",
        "customer": "cus_123",
        "subscription": "sub_123",
        "amount_due": 4900,
        "currency": "usd"
    })
}

fn customer(deleted: bool) -> StripeCustomer {
    StripeCustomer {
        id: "cus_123".to_string(),
        email: Some("client@example.com".to_string()),
        deleted,
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn failed_invoice_records_history_and_notifies_owner() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    store.link(user_id, "cus_123");
    let mut stripe = verifying(event(INVOICE_PAYMENT_FAILED, failed_invoice(), None));
    stripe
        .expect_retrieve_customer()
        .times(1)
        .returning(|_| Ok(customer(false)));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    let state = store.state();
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].status, "failed");
    assert_eq!(state.history[0].amount_minor, 4900);
    assert_eq!(state.history[0].metadata["invoice_id"], "in_failed");
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].notification_type, "error");
}

#[tokio::test]
async fn failed_invoice_for_unmapped_customer_is_dropped() {
    let store = Arc::new(InMemoryStore::new());
    let mut stripe = verifying(event(INVOICE_PAYMENT_FAILED, failed_invoice(), None));
    stripe
        .expect_retrieve_customer()
        .returning(|_| Ok(customer(false)));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    assert_eq!(store.state().writes, 0);
}

#[tokio::test]
async fn failed_invoice_for_deleted_customer_is_dropped() {
    let store = Arc::new(InMemoryStore::new());
    store.link(Uuid::new_v4(), "cus_123");
    let mut stripe = verifying(event(INVOICE_PAYMENT_FAILED, failed_invoice(), None));
    stripe
        .expect_retrieve_customer()
        .returning(|_| Ok(customer(true)));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    assert!(store.state().history.is_empty());
}

#[tokio::test]
async fn unhandled_events_are_acknowledged() {
    let store = Arc::new(InMemoryStore::new());
    let stripe = verifying(event("charge.refunded", json!({ "id": "ch_1" }), None));
    let usecase = webhook(&store, stripe);

    usecase
        .handle_stripe_webhook(b"payload", Some("sig"))
        .await
        .unwrap();

    assert_eq!(store.state().writes, 0);
}
