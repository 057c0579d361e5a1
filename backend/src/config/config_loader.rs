use anyhow::{Context, Result};
use url::Url;

use super::config_model::{BackendServer, Cors, Database, DotEnvyConfig, Stripe};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: optional("DATABASE_MAX_CONNECTIONS")
            .map(|raw| raw.parse())
            .transpose()
            .context("DATABASE_MAX_CONNECTIONS is invalid")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS),
    };

    let stripe = Stripe {
        secret_key: optional("STRIPE_SECRET_KEY"),
        webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
        webhook_tolerance_secs: optional("STRIPE_WEBHOOK_TOLERANCE_SECS")
            .map(|raw| raw.parse())
            .transpose()
            .context("STRIPE_WEBHOOK_TOLERANCE_SECS is invalid")?
            .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECS),
        success_url: Url::parse(&required("STRIPE_SUCCESS_URL")?)
            .context("STRIPE_SUCCESS_URL is invalid")?,
        cancel_url: Url::parse(&required("STRIPE_CANCEL_URL")?)
            .context("STRIPE_CANCEL_URL is invalid")?,
    };

    let cors = parse_cors(optional("CORS_ALLOW_ORIGIN").as_deref());

    Ok(DotEnvyConfig {
        backend_server,
        database,
        stripe,
        cors,
    })
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{key} is invalid"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

pub fn parse_cors(raw: Option<&str>) -> Cors {
    let origins: Vec<String> = raw
        .unwrap_or("*")
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        Cors::AnyOrigin
    } else {
        Cors::Origins(origins)
    }
}
