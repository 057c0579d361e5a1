use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::invoices::ProviderInvoiceUpdate;

#[automock]
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Returns `false` when no invoice with `invoice_id` exists.
    async fn attach_provider_invoice(
        &self,
        invoice_id: Uuid,
        update: ProviderInvoiceUpdate,
    ) -> Result<bool>;
}
