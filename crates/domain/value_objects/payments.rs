use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::{account_balances::AccountBalanceEntity, payments::PaymentEntity},
    value_objects::money::MinorUnits,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDto {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentEntity> for PaymentDto {
    fn from(entity: PaymentEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            amount: MinorUnits::new(entity.amount_minor),
            currency: entity.currency,
            status: entity.status,
            method: entity.method,
            description: entity.description,
            metadata: entity.metadata,
            updated_at: entity.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalanceDto {
    pub user_id: Uuid,
    pub balance_minor: MinorUnits,
    /// Major-unit rendering of `balance_minor`.
    pub balance: String,
    pub currency: String,
}

impl From<AccountBalanceEntity> for AccountBalanceDto {
    fn from(entity: AccountBalanceEntity) -> Self {
        let balance_minor = MinorUnits::new(entity.balance_minor);
        Self {
            user_id: entity.user_id,
            balance: balance_minor.to_major_string(),
            balance_minor,
            currency: entity.currency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusUpdatedDto {
    pub payment: PaymentDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<AccountBalanceDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentCreatedDto {
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionCreatedDto {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCreatedDto {
    pub stripe_invoice_id: String,
    pub hosted_invoice_url: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusDto {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub stripe_configured: bool,
}
