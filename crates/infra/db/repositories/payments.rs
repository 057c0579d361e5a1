use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::{
        postgres::{postgres_connection::PgPoolSquad, schema::payments},
        repositories::account_balances::credit_balance,
    },
};
use domain::{
    entities::payments::{
        InsertPaymentEntity, PaymentEntity, PaymentTransition, PaymentTransitionOutcome,
    },
    repositories::payments::PaymentRepository,
    value_objects::enums::payment_statuses::PaymentStatus,
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// `method: None` leaves the stored method untouched.
#[derive(AsChangeset)]
#[diesel(table_name = payments)]
struct PaymentStatusChangeset<'a> {
    status: &'a str,
    method: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn create_payment(&self, payment: InsertPaymentEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment_id = insert_into(payments::table)
            .values(&payment)
            .returning(payments::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(payment_id)
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = payments::table
            .find(payment_id)
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn merge_metadata(&self, payment_id: Uuid, patch: serde_json::Value) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(payments::table.find(payment_id))
            .set((
                payments::metadata.eq(payments::metadata.concat(patch)),
                payments::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_failed(&self, payment_id: Uuid, reason: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(
            payments::table
                .find(payment_id)
                .filter(payments::status.eq(PaymentStatus::Pending.as_str())),
        )
        .set((
            payments::status.eq(PaymentStatus::Failed.as_str()),
            payments::metadata.eq(payments::metadata.concat(json!({ "failure_reason": reason }))),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(())
    }

    async fn transition_status(
        &self,
        transition: PaymentTransition,
    ) -> Result<Option<PaymentTransitionOutcome>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let outcome = conn.transaction::<Option<PaymentTransitionOutcome>, anyhow::Error, _>(
            |conn| {
                // Compare-and-swap on the status that was read before the call.
                let payment = update(
                    payments::table
                        .find(transition.payment_id)
                        .filter(payments::status.eq(&transition.expected_status)),
                )
                .set(PaymentStatusChangeset {
                    status: &transition.status,
                    method: transition.method.as_deref(),
                    updated_at: Utc::now(),
                })
                .returning(PaymentEntity::as_select())
                .get_result::<PaymentEntity>(conn)
                .optional()?;

                let Some(payment) = payment else {
                    return Ok(None);
                };

                let balance = match &transition.credit {
                    Some(credit) => Some(credit_balance(conn, credit)?),
                    None => None,
                };

                Ok(Some(PaymentTransitionOutcome { payment, balance }))
            },
        )?;

        Ok(outcome)
    }
}
