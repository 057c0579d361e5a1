use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::stripe_customers;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = stripe_customers)]
pub struct StripeCustomerEntity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub stripe_customer_id: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = stripe_customers)]
pub struct InsertStripeCustomerEntity {
    pub user_id: Option<Uuid>,
    pub stripe_customer_id: String,
    pub email: Option<String>,
}
