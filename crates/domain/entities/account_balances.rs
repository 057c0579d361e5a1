use chrono::{DateTime, Utc};
use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::infra::db::postgres::schema::account_balances;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = account_balances, primary_key(user_id))]
pub struct AccountBalanceEntity {
    pub user_id: Uuid,
    pub balance_minor: i64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = account_balances)]
pub struct InsertAccountBalanceEntity {
    pub user_id: Uuid,
    pub balance_minor: i64,
    pub currency: String,
}

/// A signed change to a user's balance, recorded in payment history alongside the change.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceCredit {
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
}

/// A balance keeps the currency of its first credit.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("balance of user {user_id} is held in {held}, cannot credit {requested}")]
pub struct CurrencyMismatch {
    pub user_id: Uuid,
    pub held: String,
    pub requested: String,
}
