use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{
    RunQueryDsl, insert_into,
    prelude::*,
    sql_types::{Bool, Text},
    update,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::payment_history},
};
use domain::{
    entities::payment_history::{CHECKOUT_SESSION_ID_KEY, InsertPaymentHistoryEntity},
    repositories::payment_history::PaymentHistoryRepository,
    value_objects::enums::payment_statuses::PaymentStatus,
};

pub struct PaymentHistoryPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentHistoryPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = payment_history)]
struct CompletionChangeset<'a> {
    status: &'a str,
    amount_minor: Option<i64>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl PaymentHistoryRepository for PaymentHistoryPostgres {
    async fn record_entry(&self, entry: InsertPaymentHistoryEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entry_id = insert_into(payment_history::table)
            .values(&entry)
            .returning(payment_history::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(entry_id)
    }

    async fn attach_checkout_session(
        &self,
        entry_id: Uuid,
        checkout_session_id: &str,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(payment_history::table.find(entry_id))
            .set((
                payment_history::metadata.eq(payment_history::metadata
                    .concat(json!({ CHECKOUT_SESSION_ID_KEY: checkout_session_id }))),
                payment_history::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_failed(&self, entry_id: Uuid, reason: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(payment_history::table.find(entry_id))
            .set((
                payment_history::status.eq(PaymentStatus::Failed.as_str()),
                payment_history::metadata
                    .eq(payment_history::metadata.concat(json!({ "failure_reason": reason }))),
                payment_history::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn complete_checkout_session(
        &self,
        checkout_session_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(
            payment_history::table
                .filter(
                    diesel::dsl::sql::<Bool>(&format!(
                        "payment_history.metadata ->> '{CHECKOUT_SESSION_ID_KEY}' = "
                    ))
                    .bind::<Text, _>(checkout_session_id),
                )
                .filter(payment_history::status.ne(PaymentStatus::Completed.as_str())),
        )
        .set(CompletionChangeset {
            status: PaymentStatus::Completed.as_str(),
            amount_minor,
            updated_at: Utc::now(),
        })
        .execute(&mut conn)?;

        Ok(updated)
    }
}
