use std::sync::Arc;

use fitcoach_shared::{
    domain::{
        entities::{
            addon_purchases::InsertAddonPurchaseEntity,
            payment_history::{CHECKOUT_SESSION_ID_KEY, InsertPaymentHistoryEntity},
            stripe_customers::InsertStripeCustomerEntity,
            subscriptions::{
                InsertSubscriptionEntity, SubscriptionEntity, SubscriptionLifecycleUpdate,
            },
            user_notifications::InsertUserNotificationEntity,
        },
        repositories::{
            payment_history::PaymentHistoryRepository, purchases::PurchaseRepository,
            stripe_customers::StripeCustomerRepository, subscriptions::SubscriptionRepository,
            user_notifications::UserNotificationRepository,
        },
        value_objects::{
            enums::{payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus},
            money::{MinorUnits, normalize_currency},
            notifications,
            payment_commands::AddonSelection,
        },
    },
    payments::stripe_client::{StripeClient, StripeEvent, StripeSubscription},
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::usecases::stripe_gateway::{StripeGateway, ts_to_datetime};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing stripe-signature header")]
    MissingSignature,
    #[error("Webhook signature verification failed")]
    InvalidSignature,
    #[error("Webhook event is missing required data: {0}")]
    MalformedEvent(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::MalformedEvent(_) | WebhookError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type WebhookResult<T> = std::result::Result<T, WebhookError>;

pub struct StripeWebhookUseCase<Hist, Sub, Cust, Notif, Purch, Stripe>
where
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Sub: SubscriptionRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Notif: UserNotificationRepository + Send + Sync + 'static,
    Purch: PurchaseRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    history_repo: Arc<Hist>,
    subscription_repo: Arc<Sub>,
    customer_repo: Arc<Cust>,
    notification_repo: Arc<Notif>,
    purchase_repo: Arc<Purch>,
    stripe_client: Arc<Stripe>,
}

impl<Hist, Sub, Cust, Notif, Purch, Stripe> StripeWebhookUseCase<Hist, Sub, Cust, Notif, Purch, Stripe>
where
    Hist: PaymentHistoryRepository + Send + Sync + 'static,
    Sub: SubscriptionRepository + Send + Sync + 'static,
    Cust: StripeCustomerRepository + Send + Sync + 'static,
    Notif: UserNotificationRepository + Send + Sync + 'static,
    Purch: PurchaseRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(
        history_repo: Arc<Hist>,
        subscription_repo: Arc<Sub>,
        customer_repo: Arc<Cust>,
        notification_repo: Arc<Notif>,
        purchase_repo: Arc<Purch>,
        stripe_client: Arc<Stripe>,
    ) -> Self {
        Self {
            history_repo,
            subscription_repo,
            customer_repo,
            notification_repo,
            purchase_repo,
            stripe_client,
        }
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> WebhookResult<()> {
        let signature = signature
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                warn!("stripe_webhook: request without stripe-signature header");
                WebhookError::MissingSignature
            })?;

        let event = self
            .stripe_client
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(
                    error = %err,
                    payload_bytes = payload.len(),
                    "stripe_webhook: verification failed"
                );
                WebhookError::InvalidSignature
            })?;

        info!(
            event_id = ?event.id,
            event_type = %event.type_,
            "stripe_webhook: event verified"
        );

        match event.type_.as_str() {
            CHECKOUT_SESSION_COMPLETED => self.handle_checkout_completed(&event).await?,
            SUBSCRIPTION_UPDATED => self.handle_subscription_updated(&event).await?,
            SUBSCRIPTION_DELETED => self.handle_subscription_deleted(&event).await?,
            INVOICE_PAYMENT_FAILED => self.handle_invoice_payment_failed(&event).await?,
            other => {
                debug!(event_type = other, "stripe_webhook: unhandled event type");
            }
        }

        Ok(())
    }

    async fn handle_checkout_completed(&self, event: &StripeEvent) -> WebhookResult<()> {
        let session = StripeClient::extract_checkout_session(event)
            .ok_or_else(|| WebhookError::MalformedEvent("checkout session".to_string()))?;
        let session_id = session.id.clone().unwrap_or_default();

        if !session_id.is_empty() {
            let completed = self
                .history_repo
                .complete_checkout_session(&session_id, session.amount_total)
                .await
                .map_err(|err| {
                    error!(%session_id, db_error = ?err, "stripe_webhook: failed to complete checkout history");
                    WebhookError::Internal(err)
                })?;
            debug!(%session_id, completed, "stripe_webhook: checkout history completed");
        }

        if session.mode.as_deref() != Some("subscription") {
            info!(
                session_id = ?session.id,
                mode = ?session.mode,
                "stripe_webhook: ignoring non-subscription checkout"
            );
            return Ok(());
        }

        let metadata = session.metadata.clone().unwrap_or_default();
        let user_id = metadata
            .get("user_id")
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or_else(|| {
                error!(session_id = ?session.id, "stripe_webhook: checkout metadata has no user_id");
                WebhookError::MalformedEvent("metadata.user_id".to_string())
            })?;
        let subscription_id = session.subscription.clone().ok_or_else(|| {
            WebhookError::MalformedEvent("subscription id on checkout session".to_string())
        })?;

        let subscription = self
            .stripe_client
            .retrieve_subscription(&subscription_id)
            .await
            .map_err(|err| {
                error!(%user_id, %subscription_id, error = ?err, "stripe_webhook: failed to retrieve subscription");
                WebhookError::Internal(err)
            })?;

        let customer_id = session
            .customer
            .clone()
            .or_else(|| subscription.customer.clone());
        if let Some(customer_id) = customer_id.as_deref() {
            self.customer_repo
                .link_customer(InsertStripeCustomerEntity {
                    user_id: Some(user_id),
                    stripe_customer_id: customer_id.to_string(),
                    email: session
                        .customer_email
                        .as_deref()
                        .map(str::to_ascii_lowercase),
                })
                .await
                .map_err(|err| {
                    error!(%user_id, customer_id, db_error = ?err, "stripe_webhook: failed to link stripe customer");
                    WebhookError::Internal(err)
                })?;
        }

        let status = parse_subscription_status(&subscription);
        let plan_id = metadata
            .get("plan_id")
            .cloned()
            .or_else(|| subscription.first_price_id().map(str::to_string));

        let inserted = self
            .subscription_repo
            .insert_if_absent(InsertSubscriptionEntity {
                user_id,
                stripe_subscription_id: subscription.id.clone(),
                stripe_customer_id: customer_id.clone(),
                plan_id: plan_id.clone(),
                status: status.to_string(),
                current_period_start: subscription.period_start().and_then(ts_to_datetime),
                current_period_end: subscription.period_end().and_then(ts_to_datetime),
                cancel_at_period_end: subscription.cancel_at_period_end,
                metadata: json!({
                    CHECKOUT_SESSION_ID_KEY: session_id,
                    "quiz_result_id": metadata.get("quiz_result_id"),
                }),
            })
            .await
            .map_err(|err| {
                error!(%user_id, %subscription_id, db_error = ?err, "stripe_webhook: failed to insert subscription");
                WebhookError::Internal(err)
            })?;

        if !inserted {
            info!(%user_id, %subscription_id, "stripe_webhook: subscription already recorded");
        }

        let addons = parse_addons(metadata.get("addons").map(String::as_str));
        if !addons.is_empty() {
            let currency = normalize_currency(session.currency.as_deref());
            let purchases = addons
                .into_iter()
                .map(|addon| InsertAddonPurchaseEntity {
                    user_id,
                    addon_id: addon.id,
                    name: addon.name,
                    amount_minor: addon.amount.get(),
                    currency: currency.clone(),
                    stripe_subscription_id: Some(subscription.id.clone()),
                    checkout_session_id: session_id.clone(),
                })
                .collect();

            let recorded = self
                .purchase_repo
                .record_addon_purchases(purchases)
                .await
                .map_err(|err| {
                    error!(%user_id, %session_id, db_error = ?err, "stripe_webhook: failed to record addon purchases");
                    WebhookError::Internal(err)
                })?;
            info!(%user_id, recorded, "stripe_webhook: addon purchases recorded");
        }

        if let Some(quiz_result_id) = metadata
            .get("quiz_result_id")
            .and_then(|value| Uuid::parse_str(value).ok())
        {
            let marked = self
                .purchase_repo
                .mark_quiz_result_purchased(quiz_result_id)
                .await
                .map_err(|err| {
                    error!(%user_id, %quiz_result_id, db_error = ?err, "stripe_webhook: failed to mark quiz result purchased");
                    WebhookError::Internal(err)
                })?;
            if !marked {
                warn!(%user_id, %quiz_result_id, "stripe_webhook: quiz result not found");
            }
        }

        self.notify(
            notifications::subscription_activated(user_id, plan_id.as_deref())
                .with_dedupe_key(format!("subscription_activated:{}", subscription.id)),
        )
        .await?;

        info!(%user_id, %subscription_id, status = %status, "stripe_webhook: checkout completed");
        Ok(())
    }

    async fn handle_subscription_updated(&self, event: &StripeEvent) -> WebhookResult<()> {
        let subscription = StripeClient::extract_subscription(event)
            .ok_or_else(|| WebhookError::MalformedEvent("subscription".to_string()))?;

        let Some(existing) = self.find_subscription(&subscription.id).await? else {
            info!(
                subscription_id = %subscription.id,
                "stripe_webhook: update for unknown subscription; it may arrive before checkout completion"
            );
            return Ok(());
        };

        let current = SubscriptionStatus::from_str(&existing.status).unwrap_or_default();
        let Some(next) = SubscriptionStatus::from_str(&subscription.status) else {
            warn!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                "stripe_webhook: unknown subscription status"
            );
            return Ok(());
        };

        let next = match current.transition(next) {
            Ok(next) => next,
            Err(err) => {
                warn!(
                    subscription_id = %subscription.id,
                    error = %err,
                    "stripe_webhook: rejected subscription transition"
                );
                return Ok(());
            }
        };

        self.subscription_repo
            .update_lifecycle(
                &subscription.id,
                SubscriptionLifecycleUpdate {
                    status: next.to_string(),
                    current_period_start: subscription.period_start().and_then(ts_to_datetime),
                    current_period_end: subscription.period_end().and_then(ts_to_datetime),
                    cancel_at_period_end: subscription.cancel_at_period_end,
                },
            )
            .await
            .map_err(|err| {
                error!(subscription_id = %subscription.id, db_error = ?err, "stripe_webhook: failed to update subscription");
                WebhookError::Internal(err)
            })?;

        let previously_canceling = event
            .data
            .previous_attributes
            .as_ref()
            .and_then(|previous| previous.get("cancel_at_period_end"))
            .and_then(serde_json::Value::as_bool);

        let notification = match (previously_canceling, subscription.cancel_at_period_end) {
            (Some(false), true) => Some((
                "subscription_will_end",
                notifications::subscription_will_end(existing.user_id),
            )),
            (Some(true), false) => Some((
                "subscription_renewed",
                notifications::subscription_renewed(existing.user_id),
            )),
            _ => None,
        };
        if let Some((kind, notification)) = notification {
            self.notify(keyed_by_event(notification, kind, event)).await?;
        }

        info!(
            subscription_id = %subscription.id,
            from = %current,
            to = %next,
            cancel_at_period_end = subscription.cancel_at_period_end,
            "stripe_webhook: subscription updated"
        );
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: &StripeEvent) -> WebhookResult<()> {
        let subscription = StripeClient::extract_subscription(event)
            .ok_or_else(|| WebhookError::MalformedEvent("subscription".to_string()))?;

        let Some(existing) = self.find_subscription(&subscription.id).await? else {
            info!(subscription_id = %subscription.id, "stripe_webhook: deletion for unknown subscription");
            return Ok(());
        };

        let current = SubscriptionStatus::from_str(&existing.status).unwrap_or_default();
        if current == SubscriptionStatus::Canceled {
            info!(subscription_id = %subscription.id, "stripe_webhook: subscription already canceled");
        } else if !self.cancel_subscription(&subscription, current).await? {
            return Ok(());
        }

        // One ended notification per subscription.
        self.notify(
            notifications::subscription_ended(existing.user_id)
                .with_dedupe_key(format!("subscription_ended:{}", subscription.id)),
        )
        .await?;

        info!(subscription_id = %subscription.id, user_id = %existing.user_id, "stripe_webhook: subscription canceled");
        Ok(())
    }

    async fn cancel_subscription(
        &self,
        subscription: &StripeSubscription,
        current: SubscriptionStatus,
    ) -> WebhookResult<bool> {
        if let Err(err) = current.transition(SubscriptionStatus::Canceled) {
            warn!(subscription_id = %subscription.id, error = %err, "stripe_webhook: rejected subscription cancellation");
            return Ok(false);
        }

        self.subscription_repo
            .update_lifecycle(
                &subscription.id,
                SubscriptionLifecycleUpdate {
                    status: SubscriptionStatus::Canceled.to_string(),
                    current_period_start: subscription.period_start().and_then(ts_to_datetime),
                    current_period_end: subscription.period_end().and_then(ts_to_datetime),
                    cancel_at_period_end: subscription.cancel_at_period_end,
                },
            )
            .await
            .map_err(|err| {
                error!(subscription_id = %subscription.id, db_error = ?err, "stripe_webhook: failed to cancel subscription");
                WebhookError::Internal(err)
            })?;
        Ok(true)
    }

    async fn handle_invoice_payment_failed(&self, event: &StripeEvent) -> WebhookResult<()> {
        let invoice = StripeClient::extract_invoice(event)
            .ok_or_else(|| WebhookError::MalformedEvent("invoice".to_string()))?;

        let Some(customer_id) = invoice.customer.clone() else {
            warn!(invoice_id = %invoice.id, "stripe_webhook: failed invoice has no customer");
            return Ok(());
        };

        let customer = self
            .stripe_client
            .retrieve_customer(&customer_id)
            .await
            .map_err(|err| {
                error!(invoice_id = %invoice.id, %customer_id, error = ?err, "stripe_webhook: failed to retrieve customer");
                WebhookError::Internal(err)
            })?;
        if customer.deleted {
            warn!(invoice_id = %invoice.id, %customer_id, "stripe_webhook: customer was deleted; dropping failed invoice");
            return Ok(());
        }

        let user_id = self
            .customer_repo
            .find_user_by_customer_id(&customer.id)
            .await
            .map_err(|err| {
                error!(%customer_id, db_error = ?err, "stripe_webhook: failed to resolve customer owner");
                WebhookError::Internal(err)
            })?;
        let Some(user_id) = user_id else {
            warn!(invoice_id = %invoice.id, %customer_id, "stripe_webhook: no user mapped to customer; dropping failed invoice");
            return Ok(());
        };

        let amount_due = MinorUnits::new(invoice.amount_due.unwrap_or(0));
        let currency = normalize_currency(invoice.currency.as_deref());

        self.history_repo
            .record_entry(InsertPaymentHistoryEntity {
                user_id,
                amount_minor: amount_due.get(),
                currency: currency.clone(),
                status: PaymentStatus::Failed.to_string(),
                description: Some("Invoice payment failed".to_string()),
                metadata: json!({
                    "invoice_id": invoice.id,
                    "stripe_customer_id": customer_id,
                    "subscription_id": invoice.subscription,
                }),
            })
            .await
            .map_err(|err| {
                error!(%user_id, invoice_id = %invoice.id, db_error = ?err, "stripe_webhook: failed to record failed payment");
                WebhookError::Internal(err)
            })?;

        self.notify(keyed_by_event(
            notifications::payment_failed(user_id, amount_due, &currency),
            "payment_failed",
            event,
        ))
        .await?;

        info!(%user_id, invoice_id = %invoice.id, "stripe_webhook: invoice payment failure recorded");
        Ok(())
    }

    async fn find_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> WebhookResult<Option<SubscriptionEntity>> {
        self.subscription_repo
            .find_by_stripe_subscription_id(stripe_subscription_id)
            .await
            .map_err(|err| {
                error!(stripe_subscription_id, db_error = ?err, "stripe_webhook: failed to load subscription");
                WebhookError::Internal(err)
            })
    }

    async fn notify(
        &self,
        notification: InsertUserNotificationEntity,
    ) -> WebhookResult<()> {
        let user_id = notification.user_id;
        let created = self
            .notification_repo
            .create_notification(notification)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "stripe_webhook: failed to insert notification");
                WebhookError::Internal(err)
            })?;
        if !created {
            debug!(%user_id, "stripe_webhook: notification already delivered");
        }
        Ok(())
    }
}

fn keyed_by_event(
    notification: InsertUserNotificationEntity,
    kind: &str,
    event: &StripeEvent,
) -> InsertUserNotificationEntity {
    match event.id.as_deref() {
        Some(event_id) => notification.with_dedupe_key(format!("{kind}:{event_id}")),
        None => notification,
    }
}

fn parse_subscription_status(subscription: &StripeSubscription) -> SubscriptionStatus {
    SubscriptionStatus::from_str(&subscription.status).unwrap_or_else(|| {
        warn!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            "stripe_webhook: unknown subscription status; storing as incomplete"
        );
        SubscriptionStatus::Incomplete
    })
}

/// A malformed add-on payload degrades to no add-ons.
fn parse_addons(raw: Option<&str>) -> Vec<AddonSelection> {
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<AddonSelection>>(raw) {
        Ok(addons) => addons,
        Err(err) => {
            warn!(error = %err, "stripe_webhook: ignoring malformed addons metadata");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests;
