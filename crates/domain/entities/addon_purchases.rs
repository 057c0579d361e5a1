use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::addon_purchases;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = addon_purchases)]
pub struct AddonPurchaseEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub addon_id: String,
    pub name: String,
    pub amount_minor: i64,
    pub currency: String,
    pub stripe_subscription_id: Option<String>,
    pub checkout_session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = addon_purchases)]
pub struct InsertAddonPurchaseEntity {
    pub user_id: Uuid,
    pub addon_id: String,
    pub name: String,
    pub amount_minor: i64,
    pub currency: String,
    pub stripe_subscription_id: Option<String>,
    pub checkout_session_id: String,
}
