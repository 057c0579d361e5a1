use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::stripe_customers::InsertStripeCustomerEntity;

#[automock]
#[async_trait]
pub trait StripeCustomerRepository: Send + Sync {
    async fn find_customer_id_by_user(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn find_customer_id_by_email(&self, email: &str) -> Result<Option<String>>;

    async fn find_user_by_customer_id(&self, stripe_customer_id: &str) -> Result<Option<Uuid>>;

    /// Idempotent on `stripe_customer_id`; fills in a missing user or email on an existing row.
    async fn link_customer(&self, customer: InsertStripeCustomerEntity) -> Result<()>;
}
