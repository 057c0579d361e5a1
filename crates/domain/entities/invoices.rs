use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::invoices;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = invoices)]
pub struct InvoiceEntity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub customer_email: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub hosted_invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of finalizing and sending an invoice through the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderInvoiceUpdate {
    pub stripe_invoice_id: String,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}
