//! In-memory stand-in for the Postgres repositories, mirroring their constraints.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use fitcoach_shared::domain::{
    entities::{
        account_balances::{AccountBalanceEntity, BalanceCredit, CurrencyMismatch},
        addon_purchases::{AddonPurchaseEntity, InsertAddonPurchaseEntity},
        invoices::{InvoiceEntity, ProviderInvoiceUpdate},
        payment_history::{CHECKOUT_SESSION_ID_KEY, InsertPaymentHistoryEntity, PaymentHistoryEntity},
        payments::{InsertPaymentEntity, PaymentEntity, PaymentTransition, PaymentTransitionOutcome},
        stripe_customers::{InsertStripeCustomerEntity, StripeCustomerEntity},
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity, SubscriptionLifecycleUpdate},
        user_notifications::{InsertUserNotificationEntity, UserNotificationEntity},
    },
    repositories::{
        account_balances::AccountBalanceRepository, invoices::InvoiceRepository,
        payment_history::PaymentHistoryRepository, payments::PaymentRepository,
        purchases::PurchaseRepository, stripe_customers::StripeCustomerRepository,
        subscriptions::SubscriptionRepository, user_notifications::UserNotificationRepository,
    },
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Default)]
pub struct StoreState {
    pub payments: Vec<PaymentEntity>,
    pub history: Vec<PaymentHistoryEntity>,
    pub subscriptions: Vec<SubscriptionEntity>,
    pub invoices: Vec<InvoiceEntity>,
    pub balances: HashMap<Uuid, AccountBalanceEntity>,
    pub customers: Vec<StripeCustomerEntity>,
    pub notifications: Vec<UserNotificationEntity>,
    pub addon_purchases: Vec<AddonPurchaseEntity>,
    pub quiz_results: HashMap<Uuid, bool>,
    /// Count of mutating calls that changed at least one row.
    pub writes: usize,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seed_payment(&self, user_id: Option<Uuid>, status: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.state().payments.push(PaymentEntity {
            id,
            user_id,
            amount_minor: 0,
            currency: "usd".to_string(),
            status: status.to_string(),
            method: None,
            description: None,
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn seed_invoice(&self, customer_email: &str, amount_minor: i64) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.state().invoices.push(InvoiceEntity {
            id,
            user_id: None,
            customer_email: Some(customer_email.to_string()),
            stripe_invoice_id: None,
            amount_minor,
            currency: "usd".to_string(),
            status: "draft".to_string(),
            issued_at: None,
            due_at: None,
            hosted_invoice_url: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn seed_quiz_result(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state().quiz_results.insert(id, false);
        id
    }

    pub fn seed_subscription(&self, user_id: Uuid, stripe_subscription_id: &str, status: &str) {
        let now = Utc::now();
        self.state().subscriptions.push(SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            stripe_subscription_id: stripe_subscription_id.to_string(),
            stripe_customer_id: None,
            plan_id: None,
            status: status.to_string(),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        });
    }

    pub fn link(&self, user_id: Uuid, stripe_customer_id: &str) {
        self.state().customers.push(StripeCustomerEntity {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            stripe_customer_id: stripe_customer_id.to_string(),
            email: None,
            created_at: Utc::now(),
        });
    }
}

fn merge_json(target: &mut Value, patch: Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        target.extend(patch);
    }
}

fn ensure_currency(state: &StoreState, credit: &BalanceCredit) -> Result<(), CurrencyMismatch> {
    match state.balances.get(&credit.user_id) {
        Some(balance) if !balance.currency.eq_ignore_ascii_case(&credit.currency) => {
            Err(CurrencyMismatch {
                user_id: credit.user_id,
                held: balance.currency.clone(),
                requested: credit.currency.clone(),
            })
        }
        _ => Ok(()),
    }
}

fn credit(state: &mut StoreState, credit: &BalanceCredit) -> AccountBalanceEntity {
    let now = Utc::now();
    let balance = state
        .balances
        .entry(credit.user_id)
        .or_insert_with(|| AccountBalanceEntity {
            user_id: credit.user_id,
            balance_minor: 0,
            currency: credit.currency.clone(),
            updated_at: now,
        });
    balance.balance_minor += credit.amount_minor;
    balance.updated_at = now;
    let balance = balance.clone();

    state.history.push(PaymentHistoryEntity {
        id: Uuid::new_v4(),
        user_id: credit.user_id,
        amount_minor: credit.amount_minor,
        currency: credit.currency.clone(),
        status: "completed".to_string(),
        description: credit.description.clone(),
        metadata: credit.metadata.clone(),
        created_at: now,
        updated_at: now,
    });
    state.writes += 1;
    balance
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn create_payment(&self, payment: InsertPaymentEntity) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut state = self.state();
        state.payments.push(PaymentEntity {
            id,
            user_id: payment.user_id,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            status: payment.status,
            method: payment.method,
            description: payment.description,
            metadata: payment.metadata,
            created_at: now,
            updated_at: now,
        });
        state.writes += 1;
        Ok(id)
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        Ok(self
            .state()
            .payments
            .iter()
            .find(|payment| payment.id == payment_id)
            .cloned())
    }

    async fn merge_metadata(&self, payment_id: Uuid, patch: Value) -> Result<()> {
        let mut state = self.state();
        if let Some(payment) = state.payments.iter_mut().find(|p| p.id == payment_id) {
            merge_json(&mut payment.metadata, patch);
            state.writes += 1;
        }
        Ok(())
    }

    async fn mark_failed(&self, payment_id: Uuid, reason: &str) -> Result<()> {
        let mut state = self.state();
        if let Some(payment) = state
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id && p.status == "pending")
        {
            payment.status = "failed".to_string();
            merge_json(&mut payment.metadata, serde_json::json!({ "failure_reason": reason }));
            state.writes += 1;
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        transition: PaymentTransition,
    ) -> Result<Option<PaymentTransitionOutcome>> {
        let mut state = self.state();
        let Some(index) = state
            .payments
            .iter()
            .position(|p| p.id == transition.payment_id && p.status == transition.expected_status)
        else {
            return Ok(None);
        };
        if let Some(balance_credit) = &transition.credit {
            ensure_currency(&state, balance_credit)?;
        }

        let payment = &mut state.payments[index];
        payment.status = transition.status;
        if transition.method.is_some() {
            payment.method = transition.method;
        }
        payment.updated_at = Utc::now();
        let payment = payment.clone();
        state.writes += 1;

        let balance = transition
            .credit
            .as_ref()
            .map(|balance_credit| credit(&mut state, balance_credit));

        Ok(Some(PaymentTransitionOutcome { payment, balance }))
    }
}

#[async_trait]
impl PaymentHistoryRepository for InMemoryStore {
    async fn record_entry(&self, entry: InsertPaymentHistoryEntity) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut state = self.state();
        state.history.push(PaymentHistoryEntity {
            id,
            user_id: entry.user_id,
            amount_minor: entry.amount_minor,
            currency: entry.currency,
            status: entry.status,
            description: entry.description,
            metadata: entry.metadata,
            created_at: now,
            updated_at: now,
        });
        state.writes += 1;
        Ok(id)
    }

    async fn attach_checkout_session(&self, entry_id: Uuid, checkout_session_id: &str) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .history
            .iter_mut()
            .find(|entry| entry.id == entry_id)
            .ok_or_else(|| anyhow!("history entry {entry_id} missing"))?;
        merge_json(
            &mut entry.metadata,
            serde_json::json!({ CHECKOUT_SESSION_ID_KEY: checkout_session_id }),
        );
        state.writes += 1;
        Ok(())
    }

    async fn mark_failed(&self, entry_id: Uuid, reason: &str) -> Result<()> {
        let mut state = self.state();
        if let Some(entry) = state.history.iter_mut().find(|entry| entry.id == entry_id) {
            entry.status = "failed".to_string();
            merge_json(&mut entry.metadata, serde_json::json!({ "failure_reason": reason }));
            state.writes += 1;
        }
        Ok(())
    }

    async fn complete_checkout_session(
        &self,
        checkout_session_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<usize> {
        let mut state = self.state();
        let mut updated = 0;
        for entry in state.history.iter_mut().filter(|entry| {
            entry.status != "completed"
                && entry.metadata.get(CHECKOUT_SESSION_ID_KEY).and_then(Value::as_str)
                    == Some(checkout_session_id)
        }) {
            entry.status = "completed".to_string();
            if let Some(amount) = amount_minor {
                entry.amount_minor = amount;
            }
            updated += 1;
        }
        if updated > 0 {
            state.writes += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn insert_if_absent(&self, subscription: InsertSubscriptionEntity) -> Result<bool> {
        let mut state = self.state();
        if state
            .subscriptions
            .iter()
            .any(|s| s.stripe_subscription_id == subscription.stripe_subscription_id)
        {
            return Ok(false);
        }
        let now = Utc::now();
        state.subscriptions.push(SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: subscription.user_id,
            stripe_subscription_id: subscription.stripe_subscription_id,
            stripe_customer_id: subscription.stripe_customer_id,
            plan_id: subscription.plan_id,
            status: subscription.status,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            metadata: subscription.metadata,
            created_at: now,
            updated_at: now,
        });
        state.writes += 1;
        Ok(true)
    }

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>> {
        Ok(self
            .state()
            .subscriptions
            .iter()
            .find(|s| s.stripe_subscription_id == stripe_subscription_id)
            .cloned())
    }

    async fn update_lifecycle(
        &self,
        stripe_subscription_id: &str,
        update: SubscriptionLifecycleUpdate,
    ) -> Result<()> {
        let mut state = self.state();
        if let Some(subscription) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.stripe_subscription_id == stripe_subscription_id)
        {
            subscription.status = update.status;
            if update.current_period_start.is_some() {
                subscription.current_period_start = update.current_period_start;
            }
            if update.current_period_end.is_some() {
                subscription.current_period_end = update.current_period_end;
            }
            subscription.cancel_at_period_end = update.cancel_at_period_end;
            subscription.updated_at = Utc::now();
            state.writes += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn attach_provider_invoice(
        &self,
        invoice_id: Uuid,
        update: ProviderInvoiceUpdate,
    ) -> Result<bool> {
        let mut state = self.state();
        let Some(invoice) = state.invoices.iter_mut().find(|i| i.id == invoice_id) else {
            return Ok(false);
        };
        invoice.stripe_invoice_id = Some(update.stripe_invoice_id);
        invoice.status = update.status;
        invoice.hosted_invoice_url = update.hosted_invoice_url;
        invoice.issued_at = update.issued_at;
        invoice.due_at = update.due_at;
        invoice.updated_at = Utc::now();
        state.writes += 1;
        Ok(true)
    }
}

#[async_trait]
impl AccountBalanceRepository for InMemoryStore {
    async fn apply_credit(&self, balance_credit: BalanceCredit) -> Result<AccountBalanceEntity> {
        let mut state = self.state();
        ensure_currency(&state, &balance_credit)?;
        Ok(credit(&mut state, &balance_credit))
    }
}

#[async_trait]
impl StripeCustomerRepository for InMemoryStore {
    async fn find_customer_id_by_user(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .state()
            .customers
            .iter()
            .rev()
            .find(|c| c.user_id == Some(user_id))
            .map(|c| c.stripe_customer_id.clone()))
    }

    async fn find_customer_id_by_email(&self, email: &str) -> Result<Option<String>> {
        let email = email.to_ascii_lowercase();
        Ok(self
            .state()
            .customers
            .iter()
            .rev()
            .find(|c| c.email.as_deref() == Some(email.as_str()))
            .map(|c| c.stripe_customer_id.clone()))
    }

    async fn find_user_by_customer_id(&self, stripe_customer_id: &str) -> Result<Option<Uuid>> {
        Ok(self
            .state()
            .customers
            .iter()
            .find(|c| c.stripe_customer_id == stripe_customer_id)
            .and_then(|c| c.user_id))
    }

    async fn link_customer(&self, customer: InsertStripeCustomerEntity) -> Result<()> {
        let mut state = self.state();
        match state
            .customers
            .iter_mut()
            .find(|c| c.stripe_customer_id == customer.stripe_customer_id)
        {
            Some(existing) => {
                if existing.user_id.is_none() {
                    existing.user_id = customer.user_id;
                }
                if existing.email.is_none() {
                    existing.email = customer.email;
                }
            }
            None => {
                state.customers.push(StripeCustomerEntity {
                    id: Uuid::new_v4(),
                    user_id: customer.user_id,
                    stripe_customer_id: customer.stripe_customer_id,
                    email: customer.email,
                    created_at: Utc::now(),
                });
                state.writes += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserNotificationRepository for InMemoryStore {
    async fn create_notification(&self, notification: InsertUserNotificationEntity) -> Result<bool> {
        let mut state = self.state();
        if let Some(key) = &notification.dedupe_key {
            if state.notifications.iter().any(|n| n.dedupe_key.as_ref() == Some(key)) {
                return Ok(false);
            }
        }
        state.notifications.push(UserNotificationEntity {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            title: notification.title,
            message: notification.message,
            notification_type: notification.notification_type,
            action_link: notification.action_link,
            is_read: false,
            created_at: Utc::now(),
            dedupe_key: notification.dedupe_key,
        });
        state.writes += 1;
        Ok(true)
    }
}

#[async_trait]
impl PurchaseRepository for InMemoryStore {
    async fn record_addon_purchases(&self, purchases: Vec<InsertAddonPurchaseEntity>) -> Result<usize> {
        let mut state = self.state();
        let mut inserted = 0;
        for purchase in purchases {
            let duplicate = state.addon_purchases.iter().any(|p| {
                p.checkout_session_id == purchase.checkout_session_id
                    && p.addon_id == purchase.addon_id
            });
            if duplicate {
                continue;
            }
            state.addon_purchases.push(AddonPurchaseEntity {
                id: Uuid::new_v4(),
                user_id: purchase.user_id,
                addon_id: purchase.addon_id,
                name: purchase.name,
                amount_minor: purchase.amount_minor,
                currency: purchase.currency,
                stripe_subscription_id: purchase.stripe_subscription_id,
                checkout_session_id: purchase.checkout_session_id,
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        if inserted > 0 {
            state.writes += 1;
        }
        Ok(inserted)
    }

    async fn mark_quiz_result_purchased(&self, quiz_result_id: Uuid) -> Result<bool> {
        let mut state = self.state();
        match state.quiz_results.get_mut(&quiz_result_id) {
            Some(purchased) => {
                *purchased = true;
                state.writes += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
