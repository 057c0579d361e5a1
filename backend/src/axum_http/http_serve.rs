use crate::{
    axum_http::{default_routers, routers},
    config::config_model::{Cors, DotEnvyConfig},
};
use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        HeaderName, HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use fitcoach_shared::{
    infra::db::postgres::postgres_connection::PgPoolSquad, payments::stripe_client::StripeClient,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub async fn start(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPoolSquad>,
    stripe_client: Arc<StripeClient>,
) -> Result<()> {
    let app = app(
        &config,
        routers::payment_orchestrator::routes(Arc::clone(&db_pool), Arc::clone(&stripe_client)),
        routers::stripe_webhook::routes(Arc::clone(&db_pool), stripe_client),
    )?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn app(config: &DotEnvyConfig, orchestrator: Router, webhook: Router) -> Result<Router> {
    let body_limit = config
        .backend_server
        .body_limit
        .checked_mul(1024 * 1024)
        .context("SERVER_BODY_LIMIT is too large")?
        .try_into()?;

    Ok(Router::new()
        .fallback(default_routers::not_found)
        .nest("/payment-orchestrator", orchestrator)
        .nest("/stripe-webhook", webhook)
        .route("/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.backend_server.timeout),
        ))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer(&config.cors)?)
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(cors: &Cors) -> Result<CorsLayer> {
    let allow_origin = match cors {
        Cors::AnyOrigin => AllowOrigin::from(Any),
        Cors::Origins(origins) => {
            let origins = origins
                .iter()
                .map(|origin| {
                    origin
                        .parse::<HeaderValue>()
                        .with_context(|| format!("CORS_ALLOW_ORIGIN entry {origin} is invalid"))
                })
                .collect::<Result<Vec<_>>>()?;
            AllowOrigin::list(origins)
        }
    };

    Ok(CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
        .allow_origin(allow_origin))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
