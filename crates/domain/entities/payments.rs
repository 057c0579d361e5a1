use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::entities::account_balances::{AccountBalanceEntity, BalanceCredit};
use crate::infra::db::postgres::schema::payments;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub user_id: Option<Uuid>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
}

/// A compare-and-swap status change: applied only while the row still holds `expected_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransition {
    pub payment_id: Uuid,
    pub expected_status: String,
    pub status: String,
    pub method: Option<String>,
    pub credit: Option<BalanceCredit>,
}

#[derive(Debug, Clone)]
pub struct PaymentTransitionOutcome {
    pub payment: PaymentEntity,
    pub balance: Option<AccountBalanceEntity>,
}
