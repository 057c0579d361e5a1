pub mod checkout_modes;
pub mod notification_types;
pub mod payment_statuses;
pub mod subscription_statuses;
