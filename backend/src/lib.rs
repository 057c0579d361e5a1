pub mod axum_http;
pub mod config;
pub mod usecases;

use std::sync::Arc;

use anyhow::Result;
use fitcoach_shared::{
    infra::db::postgres::postgres_connection, payments::stripe_client::StripeClient,
};
use tracing::{info, warn};

use crate::config::config_model::DotEnvyConfig;

pub async fn run() -> Result<()> {
    let dotenvy_env = config::config_loader::load()?;
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?;
    info!("Postgres connection has been established");

    let stripe_client = stripe_client(&dotenvy_env);
    if !stripe_client.is_configured() {
        warn!("STRIPE_SECRET_KEY is not set; processor actions will fail");
    }

    axum_http::http_serve::start(
        Arc::new(dotenvy_env),
        Arc::new(postgres_pool),
        Arc::new(stripe_client),
    )
    .await
}

fn stripe_client(config: &DotEnvyConfig) -> StripeClient {
    StripeClient::new(
        config.stripe.secret_key.clone().unwrap_or_default(),
        config.stripe.webhook_secret.clone(),
        config.stripe.success_url.to_string(),
        config.stripe.cancel_url.to_string(),
    )
    .with_webhook_tolerance(config.stripe.webhook_tolerance_secs)
}
