use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payments::{
    InsertPaymentEntity, PaymentEntity, PaymentTransition, PaymentTransitionOutcome,
};

#[automock]
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, payment: InsertPaymentEntity) -> Result<Uuid>;

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>>;

    /// Shallow-merges `patch` into the payment's metadata object.
    async fn merge_metadata(&self, payment_id: Uuid, patch: serde_json::Value) -> Result<()>;

    /// Moves a still-pending payment to `failed`, recording the reason in metadata.
    async fn mark_failed(&self, payment_id: Uuid, reason: &str) -> Result<()>;

    /// Applies the status change and its optional balance credit in one transaction.
    /// Returns `None` when the row no longer holds `expected_status`.
    async fn transition_status(
        &self,
        transition: PaymentTransition,
    ) -> Result<Option<PaymentTransitionOutcome>>;
}
