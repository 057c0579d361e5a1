use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::invoices},
};
use domain::{
    entities::invoices::ProviderInvoiceUpdate, repositories::invoices::InvoiceRepository,
};

pub struct InvoicePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl InvoicePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl InvoiceRepository for InvoicePostgres {
    async fn attach_provider_invoice(
        &self,
        invoice_id: Uuid,
        provider_invoice: ProviderInvoiceUpdate,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(invoices::table.find(invoice_id))
            .set((
                invoices::stripe_invoice_id.eq(Some(provider_invoice.stripe_invoice_id)),
                invoices::status.eq(provider_invoice.status),
                invoices::hosted_invoice_url.eq(provider_invoice.hosted_invoice_url),
                invoices::issued_at.eq(provider_invoice.issued_at),
                invoices::due_at.eq(provider_invoice.due_at),
                invoices::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }
}
