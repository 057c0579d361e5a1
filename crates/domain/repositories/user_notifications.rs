use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::user_notifications::InsertUserNotificationEntity;

#[automock]
#[async_trait]
pub trait UserNotificationRepository: Send + Sync {
    /// Returns `false` when a notification with the same dedupe key already exists.
    async fn create_notification(&self, notification: InsertUserNotificationEntity)
    -> Result<bool>;
}
