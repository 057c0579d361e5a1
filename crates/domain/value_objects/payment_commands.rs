use std::collections::HashMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::{checkout_modes::CheckoutMode, payment_statuses::PaymentStatus},
    money::{MinorUnits, normalize_currency},
};

pub const TEST_CONNECTION: &str = "test-connection";
pub const CREATE_PAYMENT_INTENT: &str = "create-payment-intent";
pub const CREATE_PAYMENT_INTENT_CAMEL: &str = "createPaymentIntent";
pub const GET_SUBSCRIPTION_PLANS: &str = "get-subscription-plans";
pub const UPDATE_PAYMENT_STATUS: &str = "updatePaymentStatus";
pub const UPDATE_ACCOUNT_BALANCE: &str = "updateAccountBalance";
pub const CREATE_CHECKOUT_SESSION: &str = "create-checkout-session";
pub const CREATE_INVOICE: &str = "create-invoice";

const DEFAULT_DAYS_UNTIL_DUE: u32 = 30;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("{0}")]
    Validation(String),
}

/// Wire envelope accepted by the payment orchestrator. `params` wins over `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PaymentRequest {
    pub fn into_command(self) -> Result<PaymentCommand, CommandError> {
        let payload = self
            .params
            .filter(|value| !value.is_null())
            .or(self.data.filter(|value| !value.is_null()))
            .unwrap_or_else(|| Value::Object(Default::default()));

        PaymentCommand::parse(&self.action, payload)
    }
}

/// A validated orchestrator action. Variants only hold validated inputs, so a
/// command cannot reach a handler without passing its own checks.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentCommand {
    TestConnection,
    CreatePaymentIntent(CreatePaymentIntent),
    GetSubscriptionPlans,
    UpdatePaymentStatus(UpdatePaymentStatus),
    UpdateAccountBalance(UpdateAccountBalance),
    CreateCheckoutSession(CreateCheckoutSession),
    CreateInvoice(CreateInvoice),
}

impl PaymentCommand {
    pub fn parse(action: &str, payload: Value) -> Result<Self, CommandError> {
        match action {
            TEST_CONNECTION => Ok(PaymentCommand::TestConnection),
            CREATE_PAYMENT_INTENT | CREATE_PAYMENT_INTENT_CAMEL => {
                decode::<CreatePaymentIntentInput>(action, payload)?
                    .try_into()
                    .map(PaymentCommand::CreatePaymentIntent)
            }
            GET_SUBSCRIPTION_PLANS => Ok(PaymentCommand::GetSubscriptionPlans),
            UPDATE_PAYMENT_STATUS => decode::<UpdatePaymentStatusInput>(action, payload)?
                .try_into()
                .map(PaymentCommand::UpdatePaymentStatus),
            UPDATE_ACCOUNT_BALANCE => decode::<UpdateAccountBalanceInput>(action, payload)?
                .try_into()
                .map(PaymentCommand::UpdateAccountBalance),
            CREATE_CHECKOUT_SESSION => decode::<CreateCheckoutSessionInput>(action, payload)?
                .try_into()
                .map(PaymentCommand::CreateCheckoutSession),
            CREATE_INVOICE => decode::<CreateInvoiceInput>(action, payload)?
                .try_into()
                .map(PaymentCommand::CreateInvoice),
            other => Err(CommandError::UnknownAction(other.to_string())),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            PaymentCommand::TestConnection => TEST_CONNECTION,
            PaymentCommand::CreatePaymentIntent(_) => CREATE_PAYMENT_INTENT,
            PaymentCommand::GetSubscriptionPlans => GET_SUBSCRIPTION_PLANS,
            PaymentCommand::UpdatePaymentStatus(_) => UPDATE_PAYMENT_STATUS,
            PaymentCommand::UpdateAccountBalance(_) => UPDATE_ACCOUNT_BALANCE,
            PaymentCommand::CreateCheckoutSession(_) => CREATE_CHECKOUT_SESSION,
            PaymentCommand::CreateInvoice(_) => CREATE_INVOICE,
        }
    }
}

fn decode<T: DeserializeOwned>(action: &str, payload: Value) -> Result<T, CommandError> {
    serde_json::from_value(payload)
        .map_err(|err| CommandError::Validation(format!("invalid {action} payload: {err}")))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, CommandError> {
    value.ok_or_else(|| CommandError::Validation(format!("{field} is required")))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, CommandError> {
    let value = non_empty(value);
    required(value, field)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn email(value: String, field: &str) -> Result<String, CommandError> {
    if value.contains('@') {
        Ok(value)
    } else {
        Err(CommandError::Validation(format!(
            "{field} must be an email address"
        )))
    }
}

fn positive(amount: MinorUnits, field: &str) -> Result<MinorUnits, CommandError> {
    if amount.is_positive() {
        Ok(amount)
    } else {
        Err(CommandError::Validation(format!(
            "{field} must be a positive amount in minor units"
        )))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentInput {
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(alias = "idempotency_key")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentIntent {
    pub amount: MinorUnits,
    pub currency: String,
    pub user_id: Option<Uuid>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

impl TryFrom<CreatePaymentIntentInput> for CreatePaymentIntent {
    type Error = CommandError;

    fn try_from(input: CreatePaymentIntentInput) -> Result<Self, Self::Error> {
        let amount = positive(required(input.amount, "amount")?, "amount")?;

        Ok(Self {
            amount,
            currency: normalize_currency(input.currency.as_deref()),
            user_id: input.user_id,
            description: non_empty(input.description),
            metadata: input.metadata,
            idempotency_key: non_empty(input.idempotency_key),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentStatusInput {
    #[serde(alias = "payment_id")]
    pub payment_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(alias = "payment_method")]
    pub method: Option<String>,
    pub amount: Option<MinorUnits>,
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePaymentStatus {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub amount: Option<MinorUnits>,
    pub user_id: Option<Uuid>,
}

impl TryFrom<UpdatePaymentStatusInput> for UpdatePaymentStatus {
    type Error = CommandError;

    fn try_from(input: UpdatePaymentStatusInput) -> Result<Self, Self::Error> {
        let payment_id = required(input.payment_id, "payment_id")?;
        let raw_status = required_text(input.status, "status")?;
        let status = PaymentStatus::from_str(&raw_status).ok_or_else(|| {
            CommandError::Validation(format!(
                "status must be one of pending, completed, failed (got {raw_status})"
            ))
        })?;

        if input.amount.is_some_and(|amount| amount.get() < 0) {
            return Err(CommandError::Validation(
                "amount must not be negative".to_string(),
            ));
        }

        Ok(Self {
            payment_id,
            status,
            method: non_empty(input.method),
            amount: input.amount,
            user_id: input.user_id,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountBalanceInput {
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAccountBalance {
    pub user_id: Uuid,
    pub amount: MinorUnits,
    pub currency: String,
    pub description: Option<String>,
}

impl TryFrom<UpdateAccountBalanceInput> for UpdateAccountBalance {
    type Error = CommandError;

    fn try_from(input: UpdateAccountBalanceInput) -> Result<Self, Self::Error> {
        let user_id = required(input.user_id, "userId")?;
        let amount = required(input.amount, "amount")?;
        if amount == MinorUnits::ZERO {
            return Err(CommandError::Validation(
                "amount must not be zero".to_string(),
            ));
        }

        Ok(Self {
            user_id,
            amount,
            currency: normalize_currency(input.currency.as_deref()),
            description: non_empty(input.description),
        })
    }
}

/// An add-on bought alongside a plan. Add-ons with a `priceId` become extra
/// checkout line items; all of them are recorded as purchases once paid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonSelection {
    #[serde(alias = "addon_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "price_id", skip_serializing_if = "Option::is_none")]
    pub price_id: Option<String>,
    #[serde(default)]
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionInput {
    #[serde(alias = "price_id", skip_serializing_if = "Option::is_none")]
    pub price_id: Option<String>,
    #[serde(alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(alias = "user_email", skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(alias = "plan_id", skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CheckoutMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<AddonSelection>,
    #[serde(alias = "quiz_result_id", skip_serializing_if = "Option::is_none")]
    pub quiz_result_id: Option<Uuid>,
    #[serde(alias = "success_url", skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(alias = "cancel_url", skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCheckoutSession {
    pub price_id: String,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub plan_id: Option<String>,
    pub mode: CheckoutMode,
    pub addons: Vec<AddonSelection>,
    pub quiz_result_id: Option<Uuid>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

impl TryFrom<CreateCheckoutSessionInput> for CreateCheckoutSession {
    type Error = CommandError;

    fn try_from(input: CreateCheckoutSessionInput) -> Result<Self, Self::Error> {
        let price_id = required_text(input.price_id, "priceId")?;
        let user_email = non_empty(input.user_email)
            .map(|value| email(value, "userEmail"))
            .transpose()?;

        if let Some(addon) = input.addons.iter().find(|addon| addon.id.trim().is_empty()) {
            return Err(CommandError::Validation(format!(
                "addon id is required (addon name: {})",
                addon.name
            )));
        }

        Ok(Self {
            price_id,
            user_id: input.user_id,
            user_email,
            plan_id: non_empty(input.plan_id),
            mode: input.mode.unwrap_or_default(),
            addons: input.addons,
            quiz_result_id: input.quiz_result_id,
            success_url: non_empty(input.success_url),
            cancel_url: non_empty(input.cancel_url),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceInput {
    #[serde(alias = "customer", alias = "customer_email", alias = "email")]
    pub customer_email: Option<String>,
    #[serde(alias = "customer_name")]
    pub customer_name: Option<String>,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "days_until_due")]
    pub days_until_due: Option<u32>,
    #[serde(alias = "invoice_id")]
    pub invoice_id: Option<Uuid>,
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateInvoice {
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub description: Option<String>,
    pub days_until_due: u32,
    pub invoice_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl TryFrom<CreateInvoiceInput> for CreateInvoice {
    type Error = CommandError;

    fn try_from(input: CreateInvoiceInput) -> Result<Self, Self::Error> {
        let customer_email = email(
            required_text(input.customer_email, "customer email")?.to_ascii_lowercase(),
            "customer email",
        )?;
        let amount = positive(required(input.amount, "amount")?, "amount")?;
        let days_until_due = match input.days_until_due {
            Some(0) => {
                return Err(CommandError::Validation(
                    "daysUntilDue must be at least 1".to_string(),
                ));
            }
            Some(days) => days,
            None => DEFAULT_DAYS_UNTIL_DUE,
        };

        Ok(Self {
            customer_email,
            customer_name: non_empty(input.customer_name),
            amount,
            currency: normalize_currency(input.currency.as_deref()),
            description: non_empty(input.description),
            days_until_due,
            invoice_id: input.invoice_id,
            user_id: input.user_id,
        })
    }
}
