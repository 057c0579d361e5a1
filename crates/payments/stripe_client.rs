use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, de::DeserializeOwned};
use sha2::Sha256;
use tracing::{debug, error};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const PRICE_PAGE_SIZE: &str = "100";

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    webhook_tolerance_secs: i64,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
    /// Values of the fields that changed, as they were before the event.
    #[serde(default)]
    pub previous_attributes: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
    decline_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub customer: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub billing_cycle_anchor: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub price: Option<StripeItemPrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeItemPrice {
    pub id: String,
}

impl StripeSubscription {
    /// Returns the subscription period start timestamp, falling back to the first item
    /// or the billing cycle anchor when the top-level field is absent.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| {
                self.items
                    .data
                    .first()
                    .and_then(|item| item.current_period_start)
            })
            .or(self.billing_cycle_anchor)
    }

    /// Returns the subscription period end timestamp, falling back to the first item when needed.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }

    pub fn first_price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub status: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub amount_due: Option<i64>,
    pub currency: Option<String>,
    pub created: Option<i64>,
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSessionCreated {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    pub currency: String,
    pub unit_amount: Option<i64>,
    pub nickname: Option<String>,
    pub recurring: Option<StripeRecurring>,
    pub product: Option<StripeExpandable<StripeProduct>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRecurring {
    pub interval: String,
    pub interval_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A Stripe field that is either an id or, when expanded, the full object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeExpandable<T> {
    Object(T),
    Id(String),
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentIntentParams {
    pub amount_minor: i64,
    pub currency: String,
    pub customer: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutSessionParams {
    pub mode: String,
    /// Price ids, one line item of quantity 1 each.
    pub line_items: Vec<String>,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceParams {
    pub customer: String,
    pub days_until_due: u32,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceItemParams {
    pub customer: String,
    pub invoice: String,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        webhook_secret: String,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: STRIPE_API_BASE.to_string(),
            secret_key,
            webhook_secret,
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            success_url,
            cancel_url,
        }
    }

    pub fn with_webhook_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.webhook_tolerance_secs = tolerance_secs;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.secret_key.trim().is_empty()
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .or_else(|| resp.headers().get("stripe-request-id"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (stripe_error_type, stripe_error_code, stripe_error_param, stripe_error_message, stripe_decline_code) =
            match serde_json::from_str::<StripeErrorEnvelope>(&body) {
                Ok(envelope) => {
                    let details = envelope.error;
                    (
                        details.type_,
                        details.code,
                        details.param,
                        details.message,
                        details.decline_code,
                    )
                }
                Err(_) => (None, None, None, None, None),
            };

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?stripe_error_type,
            stripe_error_code = ?stripe_error_code,
            stripe_error_param = ?stripe_error_param,
            stripe_error_message = ?stripe_error_message,
            stripe_decline_code = ?stripe_decline_code,
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}, message={:?}, request_id={:?})",
            context,
            status,
            stripe_error_message,
            request_id
        );
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &[(String, String)],
        idempotency_key: Option<&str>,
        context: &str,
    ) -> Result<T> {
        let mut request = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let resp = request.send().await.with_context(|| format!("stripe {context}"))?;
        let resp = Self::ensure_success(resp, context).await?;
        let parsed = resp
            .json::<T>()
            .await
            .with_context(|| format!("decoding stripe {context} response"))?;
        Ok(parsed)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .query(query)
            .send()
            .await
            .with_context(|| format!("stripe {context}"))?;
        let resp = Self::ensure_success(resp, context).await?;
        let parsed = resp
            .json::<T>()
            .await
            .with_context(|| format!("decoding stripe {context} response"))?;
        Ok(parsed)
    }

    /// https://stripe.com/docs/api/customers/create
    pub async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<String> {
        let mut body = vec![("email".to_string(), email.to_string())];
        if let Some(name) = name {
            body.push(("name".to_string(), name.to_string()));
        }
        if let Some(user_id) = user_id {
            body.push(("metadata[user_id]".to_string(), user_id.to_string()));
        }

        let customer: StripeCustomer = self
            .post_form("/customers", &body, None, "create customer")
            .await?;
        Ok(customer.id)
    }

    /// Returns the first live customer registered under `email`.
    pub async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>> {
        let customers: StripeList<StripeCustomer> = self
            .get_json(
                "/customers",
                &[("email", email), ("limit", "1")],
                "list customers by email",
            )
            .await?;

        Ok(customers
            .data
            .into_iter()
            .find(|customer| !customer.deleted)
            .map(|customer| customer.id))
    }

    pub async fn retrieve_customer(&self, customer_id: &str) -> Result<StripeCustomer> {
        self.get_json(
            &format!("/customers/{customer_id}"),
            &[],
            "retrieve customer",
        )
        .await
    }

    /// https://stripe.com/docs/api/payment_intents/create
    pub async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<StripePaymentIntent> {
        let mut body = vec![
            ("amount".to_string(), params.amount_minor.to_string()),
            ("currency".to_string(), params.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(customer) = &params.customer {
            body.push(("customer".to_string(), customer.clone()));
        }
        if let Some(description) = &params.description {
            body.push(("description".to_string(), description.clone()));
        }
        push_metadata(&mut body, "metadata", &params.metadata);

        self.post_form(
            "/payment_intents",
            &body,
            params.idempotency_key.as_deref(),
            "create payment intent",
        )
        .await
    }

    /// Lists every active recurring price with its product expanded.
    pub async fn list_recurring_prices(&self) -> Result<Vec<StripePrice>> {
        let mut prices = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut query = vec![
                ("active", "true"),
                ("type", "recurring"),
                ("limit", PRICE_PAGE_SIZE),
                ("expand[]", "data.product"),
            ];
            if let Some(cursor) = starting_after.as_deref() {
                query.push(("starting_after", cursor));
            }

            let page: StripeList<StripePrice> =
                self.get_json("/prices", &query, "list prices").await?;
            let has_more = page.has_more;
            let last_id = page.data.last().map(|price| price.id.clone());
            prices.extend(page.data);

            match (has_more, last_id) {
                (true, Some(id)) => starting_after = Some(id),
                _ => break,
            }
        }

        debug!(price_count = prices.len(), "stripe recurring prices listed");
        Ok(prices)
    }

    /// Creates a Checkout Session. https://stripe.com/docs/payments/checkout
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<StripeCheckoutSessionCreated> {
        let body = checkout_session_form(params, &self.success_url, &self.cancel_url);
        let session: StripeCheckoutSessionCreated = self
            .post_form("/checkout/sessions", &body, None, "create checkout session")
            .await?;

        if session.url.is_none() {
            anyhow::bail!("Stripe Checkout session URL is missing");
        }
        Ok(session)
    }

    /// https://stripe.com/docs/api/invoices/create
    pub async fn create_invoice(&self, params: &InvoiceParams) -> Result<StripeInvoice> {
        let mut body = vec![
            ("customer".to_string(), params.customer.clone()),
            ("collection_method".to_string(), "send_invoice".to_string()),
            (
                "days_until_due".to_string(),
                params.days_until_due.to_string(),
            ),
            ("auto_advance".to_string(), "false".to_string()),
        ];
        if let Some(description) = &params.description {
            body.push(("description".to_string(), description.clone()));
        }
        push_metadata(&mut body, "metadata", &params.metadata);

        self.post_form("/invoices", &body, None, "create invoice")
            .await
    }

    pub async fn create_invoice_item(&self, params: &InvoiceItemParams) -> Result<()> {
        let mut body = vec![
            ("customer".to_string(), params.customer.clone()),
            ("invoice".to_string(), params.invoice.clone()),
            ("amount".to_string(), params.amount_minor.to_string()),
            ("currency".to_string(), params.currency.clone()),
        ];
        if let Some(description) = &params.description {
            body.push(("description".to_string(), description.clone()));
        }

        let _: serde_json::Value = self
            .post_form("/invoiceitems", &body, None, "create invoice item")
            .await?;
        Ok(())
    }

    pub async fn finalize_invoice(&self, invoice_id: &str) -> Result<StripeInvoice> {
        self.post_form(
            &format!("/invoices/{invoice_id}/finalize"),
            &[],
            None,
            "finalize invoice",
        )
        .await
    }

    pub async fn send_invoice(&self, invoice_id: &str) -> Result<StripeInvoice> {
        self.post_form(
            &format!("/invoices/{invoice_id}/send"),
            &[],
            None,
            "send invoice",
        )
        .await
    }

    /// https://stripe.com/docs/api/subscriptions/retrieve
    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        self.get_json(
            &format!("/subscriptions/{subscription_id}"),
            &[],
            "retrieve subscription",
        )
        .await
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        self.verify_webhook_signature_at(payload, signature_header, Utc::now().timestamp())
    }

    pub fn verify_webhook_signature_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<StripeEvent> {
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',').map(str::trim) {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest);
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signatures.push(rest);
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
        if signatures.is_empty() {
            anyhow::bail!("missing v1 in stripe-signature");
        }

        let signed_at: i64 = timestamp
            .parse()
            .context("invalid timestamp in stripe-signature")?;
        if (now - signed_at).abs() > self.webhook_tolerance_secs {
            anyhow::bail!("stripe-signature timestamp outside tolerance");
        }

        let mac = signed_payload_mac(&self.webhook_secret, timestamp, payload)?;
        let matched = signatures.iter().any(|signature| {
            hex::decode(signature)
                .map(|provided| mac.clone().verify_slice(&provided).is_ok())
                .unwrap_or(false)
        });

        if !matched {
            anyhow::bail!("invalid webhook signature");
        }

        let event: StripeEvent =
            serde_json::from_slice(payload).context("webhook payload is not a stripe event")?;
        Ok(event)
    }

    pub fn extract_checkout_session(event: &StripeEvent) -> Option<StripeCheckoutSession> {
        serde_json::from_value(event.data.object.clone()).ok()
    }

    pub fn extract_subscription(event: &StripeEvent) -> Option<StripeSubscription> {
        serde_json::from_value(event.data.object.clone()).ok()
    }

    pub fn extract_invoice(event: &StripeEvent) -> Option<StripeInvoice> {
        serde_json::from_value(event.data.object.clone()).ok()
    }
}

fn push_metadata(
    body: &mut Vec<(String, String)>,
    prefix: &str,
    metadata: &BTreeMap<String, String>,
) {
    for (key, value) in metadata {
        body.push((format!("{prefix}[{key}]"), value.clone()));
    }
}

fn signed_payload_mac(secret: &str, timestamp: &str, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a `Stripe-Signature` header value for `payload`, as Stripe would send it.
/// Used to replay captured events against a local receiver.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
    let mac = signed_payload_mac(secret, &timestamp.to_string(), payload)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}

pub(crate) fn checkout_session_form(
    params: &CheckoutSessionParams,
    default_success_url: &str,
    default_cancel_url: &str,
) -> Vec<(String, String)> {
    let mut body: Vec<(String, String)> = vec![
        ("mode".to_string(), params.mode.clone()),
        (
            "success_url".to_string(),
            params
                .success_url
                .clone()
                .unwrap_or_else(|| default_success_url.to_string()),
        ),
        (
            "cancel_url".to_string(),
            params
                .cancel_url
                .clone()
                .unwrap_or_else(|| default_cancel_url.to_string()),
        ),
    ];

    for (idx, price_id) in params.line_items.iter().enumerate() {
        body.push((format!("line_items[{idx}][price]"), price_id.clone()));
        body.push((format!("line_items[{idx}][quantity]"), "1".to_string()));
    }

    // Stripe rejects `customer` and `customer_email` together.
    match (&params.customer, &params.customer_email) {
        (Some(customer), _) => body.push(("customer".to_string(), customer.clone())),
        (None, Some(email)) => body.push(("customer_email".to_string(), email.clone())),
        (None, None) => {}
    }

    push_metadata(&mut body, "metadata", &params.metadata);
    if params.mode == "subscription" {
        push_metadata(&mut body, "subscription_data[metadata]", &params.metadata);
    }

    body
}
