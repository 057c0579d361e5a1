use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::stripe_customers},
};
use domain::{
    entities::stripe_customers::InsertStripeCustomerEntity,
    repositories::stripe_customers::StripeCustomerRepository,
};

pub struct StripeCustomerPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl StripeCustomerPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl StripeCustomerRepository for StripeCustomerPostgres {
    async fn find_customer_id_by_user(&self, user_id: Uuid) -> Result<Option<String>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = stripe_customers::table
            .filter(stripe_customers::user_id.eq(user_id))
            .order(stripe_customers::created_at.desc())
            .select(stripe_customers::stripe_customer_id)
            .first::<String>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_customer_id_by_email(&self, email: &str) -> Result<Option<String>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = stripe_customers::table
            .filter(stripe_customers::email.eq(email.to_ascii_lowercase()))
            .order(stripe_customers::created_at.desc())
            .select(stripe_customers::stripe_customer_id)
            .first::<String>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_user_by_customer_id(&self, stripe_customer_id: &str) -> Result<Option<Uuid>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = stripe_customers::table
            .filter(stripe_customers::stripe_customer_id.eq(stripe_customer_id))
            .select(stripe_customers::user_id)
            .first::<Option<Uuid>>(&mut conn)
            .optional()?;

        Ok(result.flatten())
    }

    async fn link_customer(&self, customer: InsertStripeCustomerEntity) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<(), diesel::result::Error, _>(|conn| {
            let inserted = insert_into(stripe_customers::table)
                .values(&customer)
                .on_conflict(stripe_customers::stripe_customer_id)
                .do_nothing()
                .execute(conn)?;

            if inserted == 1 {
                return Ok(());
            }

            // Existing mapping: only fill gaps, never reassign an owner.
            if let Some(user_id) = customer.user_id {
                update(
                    stripe_customers::table
                        .filter(stripe_customers::stripe_customer_id.eq(&customer.stripe_customer_id))
                        .filter(stripe_customers::user_id.is_null()),
                )
                .set(stripe_customers::user_id.eq(Some(user_id)))
                .execute(conn)?;
            }
            if let Some(email) = &customer.email {
                update(
                    stripe_customers::table
                        .filter(stripe_customers::stripe_customer_id.eq(&customer.stripe_customer_id))
                        .filter(stripe_customers::email.is_null()),
                )
                .set(stripe_customers::email.eq(Some(email)))
                .execute(conn)?;
            }

            Ok(())
        })?;

        Ok(())
    }
}
