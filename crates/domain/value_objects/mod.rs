pub mod enums;
pub mod money;
pub mod notifications;
pub mod payment_commands;
pub mod payments;
pub mod plans;
