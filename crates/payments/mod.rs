pub mod checkout_initiator;
pub mod stripe_client;
