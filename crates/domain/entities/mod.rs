pub mod account_balances;
pub mod addon_purchases;
pub mod invoices;
pub mod payment_history;
pub mod payments;
pub mod stripe_customers;
pub mod subscriptions;
pub mod user_notifications;
