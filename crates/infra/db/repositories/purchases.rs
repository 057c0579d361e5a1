use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{addon_purchases, quiz_results},
    },
};
use domain::{
    entities::addon_purchases::InsertAddonPurchaseEntity,
    repositories::purchases::PurchaseRepository,
};

pub struct PurchasePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PurchasePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PurchaseRepository for PurchasePostgres {
    async fn record_addon_purchases(
        &self,
        purchases: Vec<InsertAddonPurchaseEntity>,
    ) -> Result<usize> {
        if purchases.is_empty() {
            return Ok(0);
        }

        let mut conn = Arc::clone(&self.db_pool).get()?;

        let inserted = insert_into(addon_purchases::table)
            .values(&purchases)
            .on_conflict((
                addon_purchases::checkout_session_id,
                addon_purchases::addon_id,
            ))
            .do_nothing()
            .execute(&mut conn)?;

        Ok(inserted)
    }

    async fn mark_quiz_result_purchased(&self, quiz_result_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(quiz_results::table.find(quiz_result_id))
            .set((
                quiz_results::purchased.eq(true),
                quiz_results::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }
}
