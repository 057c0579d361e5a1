use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::user_notifications;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = user_notifications)]
pub struct UserNotificationEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub action_link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub dedupe_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = user_notifications)]
pub struct InsertUserNotificationEntity {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub action_link: Option<String>,
    /// At most one notification is stored per key.
    pub dedupe_key: Option<String>,
}

impl InsertUserNotificationEntity {
    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }
}
