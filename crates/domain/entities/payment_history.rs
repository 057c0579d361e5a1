use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::payment_history;

/// Key under which checkout rows embed the processor's checkout session id.
pub const CHECKOUT_SESSION_ID_KEY: &str = "checkout_session_id";

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payment_history)]
pub struct PaymentHistoryEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payment_history)]
pub struct InsertPaymentHistoryEntity {
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
}
