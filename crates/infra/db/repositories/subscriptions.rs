use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};
use domain::{
    entities::subscriptions::{
        InsertSubscriptionEntity, SubscriptionEntity, SubscriptionLifecycleUpdate,
    },
    repositories::subscriptions::SubscriptionRepository,
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Period bounds the processor omitted are left as stored.
#[derive(AsChangeset)]
#[diesel(table_name = subscriptions)]
struct LifecycleChangeset<'a> {
    status: &'a str,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn insert_if_absent(&self, subscription: InsertSubscriptionEntity) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let inserted = insert_into(subscriptions::table)
            .values(&subscription)
            .on_conflict(subscriptions::stripe_subscription_id)
            .do_nothing()
            .execute(&mut conn)?;

        Ok(inserted == 1)
    }

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .filter(subscriptions::stripe_subscription_id.eq(stripe_subscription_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn update_lifecycle(
        &self,
        stripe_subscription_id: &str,
        update_entity: SubscriptionLifecycleUpdate,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(
            subscriptions::table
                .filter(subscriptions::stripe_subscription_id.eq(stripe_subscription_id)),
        )
        .set(LifecycleChangeset {
            status: &update_entity.status,
            current_period_start: update_entity.current_period_start,
            current_period_end: update_entity.current_period_end,
            cancel_at_period_end: update_entity.cancel_at_period_end,
            updated_at: Utc::now(),
        })
        .execute(&mut conn)?;

        Ok(())
    }
}
