pub mod payment_orchestrator;
pub mod stripe_gateway;
pub mod stripe_webhook;

#[cfg(test)]
pub(crate) mod test_support;
