use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::addon_purchases::InsertAddonPurchaseEntity;

#[automock]
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Skips add-ons already recorded for the same checkout session.
    async fn record_addon_purchases(&self, purchases: Vec<InsertAddonPurchaseEntity>)
    -> Result<usize>;

    /// Returns `false` when the quiz result does not exist.
    async fn mark_quiz_result_purchased(&self, quiz_result_id: Uuid) -> Result<bool>;
}
