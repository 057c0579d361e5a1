use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{PgConnection, RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{account_balances, payment_history},
    },
};
use domain::{
    entities::{
        account_balances::{
            AccountBalanceEntity, BalanceCredit, CurrencyMismatch, InsertAccountBalanceEntity,
        },
        payment_history::InsertPaymentHistoryEntity,
    },
    repositories::account_balances::AccountBalanceRepository,
    value_objects::enums::payment_statuses::PaymentStatus,
};

pub struct AccountBalancePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl AccountBalancePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Single-statement increment plus its history row. Callers run it inside a transaction
/// so a [`CurrencyMismatch`] rolls the increment back.
pub(crate) fn credit_balance(
    conn: &mut PgConnection,
    credit: &BalanceCredit,
) -> Result<AccountBalanceEntity> {
    let balance = insert_into(account_balances::table)
        .values(&InsertAccountBalanceEntity {
            user_id: credit.user_id,
            balance_minor: credit.amount_minor,
            currency: credit.currency.clone(),
        })
        .on_conflict(account_balances::user_id)
        .do_update()
        .set((
            account_balances::balance_minor
                .eq(account_balances::balance_minor + credit.amount_minor),
            account_balances::updated_at.eq(Utc::now()),
        ))
        .returning(AccountBalanceEntity::as_select())
        .get_result::<AccountBalanceEntity>(conn)?;

    if !balance.currency.eq_ignore_ascii_case(&credit.currency) {
        return Err(CurrencyMismatch {
            user_id: credit.user_id,
            held: balance.currency,
            requested: credit.currency.clone(),
        }
        .into());
    }

    insert_into(payment_history::table)
        .values(&InsertPaymentHistoryEntity {
            user_id: credit.user_id,
            amount_minor: credit.amount_minor,
            currency: credit.currency.clone(),
            status: PaymentStatus::Completed.to_string(),
            description: credit.description.clone(),
            metadata: credit.metadata.clone(),
        })
        .execute(conn)?;

    Ok(balance)
}

#[async_trait]
impl AccountBalanceRepository for AccountBalancePostgres {
    async fn apply_credit(&self, credit: BalanceCredit) -> Result<AccountBalanceEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let balance = conn.transaction::<AccountBalanceEntity, anyhow::Error, _>(|conn| {
            credit_balance(conn, &credit)
        })?;

        Ok(balance)
    }
}
