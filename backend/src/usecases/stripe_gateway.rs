use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fitcoach_shared::payments::stripe_client::{
    CheckoutSessionParams, InvoiceItemParams, InvoiceParams, PaymentIntentParams, StripeClient,
    StripeCheckoutSessionCreated, StripeCustomer, StripeEvent, StripeInvoice,
    StripePaymentIntent, StripePrice, StripeSubscription,
};
use uuid::Uuid;

/// Processor operations the use cases depend on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn create_payment_intent(
        &self,
        params: PaymentIntentParams,
    ) -> AnyResult<StripePaymentIntent>;

    async fn list_recurring_prices(&self) -> AnyResult<Vec<StripePrice>>;

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams,
    ) -> AnyResult<StripeCheckoutSessionCreated>;

    async fn find_customer_by_email(&self, email: &str) -> AnyResult<Option<String>>;

    async fn create_customer(
        &self,
        email: &str,
        name: Option<String>,
        user_id: Option<Uuid>,
    ) -> AnyResult<String>;

    async fn retrieve_customer(&self, customer_id: &str) -> AnyResult<StripeCustomer>;

    async fn create_invoice(&self, params: InvoiceParams) -> AnyResult<StripeInvoice>;

    async fn create_invoice_item(&self, params: InvoiceItemParams) -> AnyResult<()>;

    async fn finalize_invoice(&self, invoice_id: &str) -> AnyResult<StripeInvoice>;

    async fn send_invoice(&self, invoice_id: &str) -> AnyResult<StripeInvoice>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription>;

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    fn is_configured(&self) -> bool {
        self.is_configured()
    }

    async fn create_payment_intent(
        &self,
        params: PaymentIntentParams,
    ) -> AnyResult<StripePaymentIntent> {
        self.create_payment_intent(&params).await
    }

    async fn list_recurring_prices(&self) -> AnyResult<Vec<StripePrice>> {
        self.list_recurring_prices().await
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams,
    ) -> AnyResult<StripeCheckoutSessionCreated> {
        self.create_checkout_session(&params).await
    }

    async fn find_customer_by_email(&self, email: &str) -> AnyResult<Option<String>> {
        self.find_customer_by_email(email).await
    }

    async fn create_customer(
        &self,
        email: &str,
        name: Option<String>,
        user_id: Option<Uuid>,
    ) -> AnyResult<String> {
        self.create_customer(email, name.as_deref(), user_id).await
    }

    async fn retrieve_customer(&self, customer_id: &str) -> AnyResult<StripeCustomer> {
        self.retrieve_customer(customer_id).await
    }

    async fn create_invoice(&self, params: InvoiceParams) -> AnyResult<StripeInvoice> {
        self.create_invoice(&params).await
    }

    async fn create_invoice_item(&self, params: InvoiceItemParams) -> AnyResult<()> {
        self.create_invoice_item(&params).await
    }

    async fn finalize_invoice(&self, invoice_id: &str) -> AnyResult<StripeInvoice> {
        self.finalize_invoice(invoice_id).await
    }

    async fn send_invoice(&self, invoice_id: &str) -> AnyResult<StripeInvoice> {
        self.send_invoice(invoice_id).await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature)
    }
}

pub(crate) fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}
