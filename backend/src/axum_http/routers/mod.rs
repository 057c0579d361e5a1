pub mod payment_orchestrator;
pub mod stripe_webhook;
