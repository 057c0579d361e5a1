use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::subscriptions::{
    InsertSubscriptionEntity, SubscriptionEntity, SubscriptionLifecycleUpdate,
};

#[automock]
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts unless a row with the same `stripe_subscription_id` exists.
    /// Returns whether a row was written.
    async fn insert_if_absent(&self, subscription: InsertSubscriptionEntity) -> Result<bool>;

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>>;

    async fn update_lifecycle(
        &self,
        stripe_subscription_id: &str,
        update: SubscriptionLifecycleUpdate,
    ) -> Result<()>;
}
