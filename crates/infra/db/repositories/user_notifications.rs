use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::user_notifications},
};
use domain::{
    entities::user_notifications::InsertUserNotificationEntity,
    repositories::user_notifications::UserNotificationRepository,
};

pub struct UserNotificationPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserNotificationPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserNotificationRepository for UserNotificationPostgres {
    async fn create_notification(
        &self,
        notification: InsertUserNotificationEntity,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let inserted = insert_into(user_notifications::table)
            .values(&notification)
            .on_conflict(user_notifications::dedupe_key)
            .do_nothing()
            .execute(&mut conn)?;

        Ok(inserted == 1)
    }
}
