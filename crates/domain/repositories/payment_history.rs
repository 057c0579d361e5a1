use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payment_history::InsertPaymentHistoryEntity;

#[automock]
#[async_trait]
pub trait PaymentHistoryRepository: Send + Sync {
    async fn record_entry(&self, entry: InsertPaymentHistoryEntity) -> Result<Uuid>;

    async fn attach_checkout_session(&self, entry_id: Uuid, checkout_session_id: &str)
    -> Result<()>;

    async fn mark_failed(&self, entry_id: Uuid, reason: &str) -> Result<()>;

    /// Marks every entry embedding this checkout session id as completed, recording the
    /// charged amount when the processor reports one.
    async fn complete_checkout_session(
        &self,
        checkout_session_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<usize>;
}
