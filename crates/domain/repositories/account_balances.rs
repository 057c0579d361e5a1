use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::account_balances::{AccountBalanceEntity, BalanceCredit};

#[automock]
#[async_trait]
pub trait AccountBalanceRepository: Send + Sync {
    /// Atomically adds `credit.amount_minor` to the balance (creating the row if needed)
    /// and appends the matching payment history entry.
    ///
    /// Fails with [`CurrencyMismatch`](crate::domain::entities::account_balances::CurrencyMismatch)
    /// and leaves nothing written when the balance is held in another currency.
    async fn apply_credit(&self, credit: BalanceCredit) -> Result<AccountBalanceEntity>;
}
